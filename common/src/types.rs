use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::BacktestConfig;

/// OHLCV candle. `timestamp` is milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

impl Candle {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Candle with every price equal to `price`
    pub fn flat(timestamp: i64, price: f64, volume: f64) -> Self {
        Self::new(timestamp, price, price, price, price, volume)
    }

    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }

    /// Quote-currency volume traded in this candle
    pub fn liquidity_usd(&self) -> f64 {
        self.close * self.volume
    }
}

/// Why a simulated trade was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Tp,
    Sl,
    Trail,
    Expired,
    EndOfData,
}

impl ExitReason {
    pub const ALL: [ExitReason; 5] = [
        ExitReason::Tp,
        ExitReason::Sl,
        ExitReason::Trail,
        ExitReason::Expired,
        ExitReason::EndOfData,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::Tp => "tp",
            ExitReason::Sl => "sl",
            ExitReason::Trail => "trail",
            ExitReason::Expired => "expired",
            ExitReason::EndOfData => "end_of_data",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed trade record. Produced once by the simulator and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub entry_time: i64,
    pub exit_time: i64,
    pub entry_index: usize,
    pub exit_index: usize,
    pub entry_price: f64,
    pub exit_price: f64,
    /// Gross price move in percent
    pub pnl_pct: f64,
    /// Percent return after fees and slippage
    pub pnl_net: f64,
    pub log_return: f64,
    pub exit_reason: ExitReason,
    pub hold_candles: usize,
    pub high_water_mark: f64,
    pub low_water_mark: f64,
    pub max_drawdown_pct: f64,
}

impl Trade {
    /// Breakeven trades count as losses
    pub fn is_win(&self) -> bool {
        self.pnl_net > 0.0
    }
}

/// Two-sided confidence interval. Bounds are infinite when the sample is too
/// small to say anything.
///
/// Infinite bounds serialize as `null` and read back as -inf / +inf.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    #[serde(with = "lower_bound")]
    pub lower: f64,
    #[serde(with = "upper_bound")]
    pub upper: f64,
}

fn serialize_bound<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_finite() {
        serializer.serialize_some(value)
    } else {
        serializer.serialize_none()
    }
}

mod lower_bound {
    use super::*;

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_bound(value, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NEG_INFINITY))
    }
}

mod upper_bound {
    use super::*;

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_bound(value, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
    }
}

impl ConfidenceInterval {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn unbounded() -> Self {
        Self::new(f64::NEG_INFINITY, f64::INFINITY)
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn is_bounded(&self) -> bool {
        self.lower.is_finite() && self.upper.is_finite()
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

impl Default for ConfidenceInterval {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Number of trades closed for each exit reason
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitBreakdown {
    pub tp: usize,
    pub sl: usize,
    pub trail: usize,
    pub expired: usize,
    pub end_of_data: usize,
}

impl ExitBreakdown {
    pub fn from_trades(trades: &[Trade]) -> Self {
        let mut breakdown = Self::default();
        for trade in trades {
            breakdown.record(trade.exit_reason);
        }
        breakdown
    }

    pub fn record(&mut self, reason: ExitReason) {
        match reason {
            ExitReason::Tp => self.tp += 1,
            ExitReason::Sl => self.sl += 1,
            ExitReason::Trail => self.trail += 1,
            ExitReason::Expired => self.expired += 1,
            ExitReason::EndOfData => self.end_of_data += 1,
        }
    }

    pub fn count(&self, reason: ExitReason) -> usize {
        match reason {
            ExitReason::Tp => self.tp,
            ExitReason::Sl => self.sl,
            ExitReason::Trail => self.trail,
            ExitReason::Expired => self.expired,
            ExitReason::EndOfData => self.end_of_data,
        }
    }
}

/// Aggregated outcome of one simulation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub label: String,
    pub config: BacktestConfig,
    pub total_candles: usize,

    // Trade statistics
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub avg_return: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
    pub avg_hold_candles: f64,
    pub profit_factor: f64,
    pub expectancy: f64,
    pub exit_breakdown: ExitBreakdown,

    // Risk metrics
    pub std_return: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub total_return_pct: f64,
    pub max_drawdown_pct: f64,
    pub max_drawdown_duration: usize,
    pub recovery_factor: f64,

    // Statistical overlays
    pub avg_return_ci95: ConfidenceInterval,
    pub clt_reliable: bool,
    pub win_rate_ci95: ConfidenceInterval,
    pub sharpe_ci95: ConfidenceInterval,
    pub parkinson_volatility: f64,
    pub ewma_volatility: f64,

    pub trades: Vec<Trade>,
    pub equity_curve: Vec<f64>,
    pub drawdown_curve: Vec<f64>,
}

/// In-sample vs out-of-sample comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardResult {
    pub in_sample: BacktestResult,
    pub out_of_sample: BacktestResult,
    pub config: BacktestConfig,
    pub split_ratio: f64,
    pub split_index: usize,
    /// Absolute difference between in-sample and out-of-sample win rates
    pub win_rate_drift: f64,
    pub robust: bool,
}
