use common::{
    AnalysisSettings, BacktestConfig, BacktestError, BacktestResult, Candle, ParameterGrid,
    Result, SharedSignal, WalkForwardResult,
};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::metrics::MetricsCalculator;
use crate::simulator::TradeSimulator;

pub const DEFAULT_SPLIT_RATIO: f64 = 0.7;

/// Backtest engine: simulation, aggregation, walk-forward and grid search
#[derive(Debug, Clone, Default)]
pub struct BacktestEngine {
    settings: AnalysisSettings,
}

impl BacktestEngine {
    pub fn new(settings: AnalysisSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    /// Run one backtest over the full candle sequence
    ///
    /// An empty sequence gives a zeroed result rather than an error.
    pub fn run(
        &self,
        candles: &[Candle],
        config: &BacktestConfig,
        label: &str,
    ) -> Result<BacktestResult> {
        config.validate()?;
        self.settings.validate()?;
        self.run_validated(candles, config, label)
    }

    fn run_validated(
        &self,
        candles: &[Candle],
        config: &BacktestConfig,
        label: &str,
    ) -> Result<BacktestResult> {
        let simulation = TradeSimulator::new(config).simulate(candles);
        let result =
            MetricsCalculator::calculate(label, config, candles, simulation, &self.settings)?;

        debug!(
            label,
            stop_loss = config.stop_loss_pct,
            take_profit = config.take_profit_pct,
            trailing_stop = config.trailing_stop_pct,
            max_hold = config.max_hold_candles,
            trades = result.total_trades,
            expectancy = result.expectancy,
            "backtest complete"
        );

        Ok(result)
    }

    /// Chronological train/test split at `floor(len * split_ratio)`
    ///
    /// Each partition is simulated on its own, so indices restart at 0 in the
    /// out-of-sample half and lookback signals see no history from the
    /// in-sample half.
    pub fn walk_forward(
        &self,
        candles: &[Candle],
        config: &BacktestConfig,
        label: &str,
        split_ratio: f64,
    ) -> Result<WalkForwardResult> {
        if !split_ratio.is_finite() || split_ratio <= 0.0 || split_ratio >= 1.0 {
            return Err(BacktestError::invalid(format!(
                "split ratio must be in (0, 1), got {split_ratio}"
            )));
        }
        config.validate()?;
        self.settings.validate()?;

        let split_index = (candles.len() as f64 * split_ratio).floor() as usize;
        let (train, test) = candles.split_at(split_index.min(candles.len()));

        if train.is_empty() || test.is_empty() {
            warn!(
                label,
                candles = candles.len(),
                split_index,
                "walk-forward partition is empty"
            );
        }

        let in_sample = self.run_validated(train, config, &format!("{label} (in-sample)"))?;
        let out_of_sample =
            self.run_validated(test, config, &format!("{label} (out-of-sample)"))?;

        let win_rate_drift = (in_sample.win_rate - out_of_sample.win_rate).abs();
        let robust = win_rate_drift <= self.settings.robust_max_win_rate_drift
            && out_of_sample.total_trades >= self.settings.robust_min_oos_trades;

        info!(
            label,
            split_index,
            is_trades = in_sample.total_trades,
            oos_trades = out_of_sample.total_trades,
            is_win_rate = in_sample.win_rate,
            oos_win_rate = out_of_sample.win_rate,
            robust,
            "walk-forward verdict"
        );

        Ok(WalkForwardResult {
            in_sample,
            out_of_sample,
            config: config.clone(),
            split_ratio,
            split_index,
            win_rate_drift,
            robust,
        })
    }

    /// Run every grid combination and rank the ones with enough trades
    ///
    /// Combinations run in parallel; the result order depends only on the
    /// grid order and expectancy. `entry_signal` overrides the base config's
    /// signal for every combination.
    pub fn grid_search(
        &self,
        candles: &[Candle],
        base: &BacktestConfig,
        grid: &ParameterGrid,
        label: &str,
        entry_signal: Option<SharedSignal>,
    ) -> Result<Vec<BacktestResult>> {
        self.settings.validate()?;

        let base = match entry_signal {
            Some(signal) => base.clone().with_shared_signal(signal),
            None => base.clone(),
        };
        grid.validate(&base)?;

        let configs = grid.configs(&base);
        let attempted = configs.len();

        let results = configs
            .par_iter()
            .map(|config| self.run_validated(candles, config, label))
            .collect::<Result<Vec<_>>>()?;

        let mut ranked: Vec<BacktestResult> = results
            .into_iter()
            .filter(|r| r.total_trades >= self.settings.min_ranked_trades)
            .collect();
        ranked.sort_by(|a, b| b.expectancy.total_cmp(&a.expectancy));

        if ranked.is_empty() {
            warn!(
                label,
                attempted,
                min_trades = self.settings.min_ranked_trades,
                "grid search kept no results"
            );
        } else {
            info!(
                label,
                attempted,
                kept = ranked.len(),
                best_expectancy = ranked[0].expectancy,
                "grid search complete"
            );
        }

        Ok(ranked)
    }
}

/// Backtest with default analysis settings
pub fn run(candles: &[Candle], config: &BacktestConfig, label: &str) -> Result<BacktestResult> {
    BacktestEngine::default().run(candles, config, label)
}

/// Walk-forward test with default analysis settings
pub fn walk_forward_test(
    candles: &[Candle],
    config: &BacktestConfig,
    label: &str,
    split_ratio: f64,
) -> Result<WalkForwardResult> {
    BacktestEngine::default().walk_forward(candles, config, label, split_ratio)
}

/// Grid search with default analysis settings
pub fn grid_search(
    candles: &[Candle],
    base: &BacktestConfig,
    grid: &ParameterGrid,
    label: &str,
    entry_signal: Option<SharedSignal>,
) -> Result<Vec<BacktestResult>> {
    BacktestEngine::default().grid_search(candles, base, grid, label, entry_signal)
}
