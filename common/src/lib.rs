pub mod config;
pub mod error;
pub mod signal;
pub mod types;

pub use config::{
    AnalysisSettings, BacktestConfig, BootstrapSettings, ParameterGrid, RunSettings, SignalConfig,
};
pub use error::{BacktestError, Result};
pub use signal::{EntrySignal, SharedSignal};
pub use types::*;
