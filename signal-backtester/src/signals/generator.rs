use common::{BacktestError, Candle, EntrySignal, Result, SharedSignal, SignalConfig};

use crate::indicators::{compute_ema, rsi};

/// Interval of the default entry signal
pub const DEFAULT_ENTRY_INTERVAL: usize = 24;

/// Signal used when a config carries none
pub fn default_signal() -> SharedSignal {
    SharedSignal::new(EveryNthCandle {
        interval: DEFAULT_ENTRY_INTERVAL,
    })
}

/// Build the predicate described by `config`
///
/// Liquidity gating is applied by the simulator from
/// `BacktestConfig::min_liquidity_usd`, not here.
pub fn build_signal(config: &SignalConfig) -> Result<SharedSignal> {
    let signal = match *config {
        SignalConfig::EveryNth { interval } => SharedSignal::new(EveryNthCandle::new(interval)?),
        SignalConfig::RsiOversold { period, threshold } => {
            SharedSignal::new(RsiOversold::new(period, threshold)?)
        }
        SignalConfig::EmaCrossover { fast, slow } => {
            SharedSignal::new(EmaCrossover::new(fast, slow)?)
        }
    };

    Ok(signal)
}

/// Fires on every `interval`-th index, independent of price
///
/// Isolates exit behaviour from entry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EveryNthCandle {
    interval: usize,
}

impl EveryNthCandle {
    pub fn new(interval: usize) -> Result<Self> {
        if interval == 0 {
            return Err(BacktestError::invalid("signal interval must be at least 1"));
        }
        Ok(Self { interval })
    }

    pub fn interval(&self) -> usize {
        self.interval
    }
}

impl EntrySignal for EveryNthCandle {
    fn evaluate(&self, _candles: &[Candle], index: usize) -> bool {
        index % self.interval == 0
    }

    fn name(&self) -> String {
        format!("every_nth({})", self.interval)
    }
}

/// Mean-reversion entry: RSI at or below `threshold`
///
/// Looks only at the trailing `period + 1` closes, so the first `period`
/// candles of a sequence never fire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RsiOversold {
    period: usize,
    threshold: f64,
}

impl RsiOversold {
    pub fn new(period: usize, threshold: f64) -> Result<Self> {
        if period == 0 {
            return Err(BacktestError::invalid("RSI period must be at least 1"));
        }
        if !(0.0..=100.0).contains(&threshold) {
            return Err(BacktestError::invalid(format!(
                "RSI threshold must be in [0, 100], got {threshold}"
            )));
        }
        Ok(Self { period, threshold })
    }
}

impl EntrySignal for RsiOversold {
    fn evaluate(&self, candles: &[Candle], index: usize) -> bool {
        if index >= candles.len() {
            return false;
        }
        let start = index.saturating_sub(self.period);
        let closes: Vec<f64> = candles[start..=index].iter().map(|c| c.close).collect();

        rsi(&closes, self.period).is_some_and(|value| value <= self.threshold)
    }

    fn name(&self) -> String {
        format!("rsi_oversold({}<={})", self.period, self.threshold)
    }
}

/// Trend entry: fast EMA crosses above slow EMA on this candle
///
/// Both EMAs are seeded `2 * slow` candles back, so signals need that much
/// history within the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmaCrossover {
    fast: usize,
    slow: usize,
}

impl EmaCrossover {
    pub fn new(fast: usize, slow: usize) -> Result<Self> {
        if fast == 0 || fast >= slow {
            return Err(BacktestError::invalid(format!(
                "EMA crossover needs 0 < fast < slow, got {fast}/{slow}"
            )));
        }
        Ok(Self { fast, slow })
    }

    fn lookback(&self) -> usize {
        self.slow * 2
    }
}

impl EntrySignal for EmaCrossover {
    fn evaluate(&self, candles: &[Candle], index: usize) -> bool {
        if index >= candles.len() || index < self.lookback() {
            return false;
        }
        let closes: Vec<f64> = candles[index - self.lookback()..=index]
            .iter()
            .map(|c| c.close)
            .collect();

        let (Ok(fast), Ok(slow)) = (compute_ema(&closes, self.fast), compute_ema(&closes, self.slow))
        else {
            return false;
        };

        let n = closes.len();
        fast[n - 2] <= slow[n - 2] && fast[n - 1] > slow[n - 1]
    }

    fn name(&self) -> String {
        format!("ema_crossover({}/{})", self.fast, self.slow)
    }
}

/// Suppresses `inner` on candles whose `close * volume` is below the floor
#[derive(Debug, Clone)]
pub struct LiquidityGate<S> {
    inner: S,
    min_liquidity_usd: f64,
}

impl<S: EntrySignal> LiquidityGate<S> {
    pub fn new(inner: S, min_liquidity_usd: f64) -> Self {
        Self {
            inner,
            min_liquidity_usd,
        }
    }
}

impl<S: EntrySignal> EntrySignal for LiquidityGate<S> {
    fn evaluate(&self, candles: &[Candle], index: usize) -> bool {
        candles
            .get(index)
            .is_some_and(|c| c.liquidity_usd() >= self.min_liquidity_usd)
            && self.inner.evaluate(candles, index)
    }

    fn name(&self) -> String {
        format!("{}+liquidity({})", self.inner.name(), self.min_liquidity_usd)
    }
}
