//! Pure numeric indicator and statistics functions

pub mod confidence;
pub mod ema;
pub mod rsi;
pub mod volatility;

pub use confidence::{
    bootstrap_sharpe_ci, clt_mean_ci, mean, sample_std, wilson_score_ci, MeanEstimate,
    BOOTSTRAP_MIN_SAMPLES, CLT_MIN_SAMPLES,
};
pub use ema::{compute_ema, last_ema};
pub use rsi::rsi;
pub use volatility::{ewma_volatility, log_return, log_returns, parkinson_volatility};
