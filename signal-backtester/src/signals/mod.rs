pub mod generator;

pub use generator::{
    build_signal, default_signal, EmaCrossover, EveryNthCandle, LiquidityGate, RsiOversold,
    DEFAULT_ENTRY_INTERVAL,
};
