pub mod data;
pub mod engine;
pub mod indicators;
pub mod metrics;
pub mod report;
pub mod signals;
pub mod simulator;

pub use data::{generate_synthetic_candles, load_file};
pub use engine::{grid_search, run, walk_forward_test, BacktestEngine, DEFAULT_SPLIT_RATIO};
pub use metrics::{build_equity_curve, MetricsCalculator};
pub use report::{
    compare_with_live, render_grid_table, render_text_report, render_walk_forward_report,
    GridTable, LiveComparison, TextReport, WalkForwardReport,
};
pub use signals::{build_signal, default_signal};
pub use simulator::{Simulation, TradeSimulator};

// Re-export common types
pub use common::{
    AnalysisSettings, BacktestConfig, BacktestError, BacktestResult, Candle, EntrySignal,
    ExitReason, ParameterGrid, Result, RunSettings, SharedSignal, SignalConfig, Trade,
    WalkForwardResult,
};
