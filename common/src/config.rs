use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BacktestError, Result};
use crate::signal::{EntrySignal, SharedSignal};

/// Risk model for a single simulation run. All percentages are in percent
/// units (10.0 = 10%).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    /// 0 disables the trailing stop
    pub trailing_stop_pct: f64,
    /// Carried for upstream scorers; the simulator does not consult it
    pub min_score: f64,
    /// Minimum `close * volume` required by the liquidity gate (0 = off)
    pub min_liquidity_usd: f64,
    pub slippage_pct: f64,
    /// Fee per side
    pub fee_pct: f64,
    pub max_hold_candles: usize,
    /// Defaults to every 24th candle when unset
    #[serde(skip)]
    pub entry_signal: Option<SharedSignal>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            stop_loss_pct: 10.0,
            take_profit_pct: 20.0,
            trailing_stop_pct: 0.0,
            min_score: 0.0,
            min_liquidity_usd: 0.0,
            slippage_pct: 0.5,
            fee_pct: 0.1,
            max_hold_candles: 24,
            entry_signal: None,
        }
    }
}

impl BacktestConfig {
    pub fn with_stop_loss(mut self, stop_loss_pct: f64) -> Self {
        self.stop_loss_pct = stop_loss_pct;
        self
    }

    pub fn with_take_profit(mut self, take_profit_pct: f64) -> Self {
        self.take_profit_pct = take_profit_pct;
        self
    }

    pub fn with_trailing_stop(mut self, trailing_stop_pct: f64) -> Self {
        self.trailing_stop_pct = trailing_stop_pct;
        self
    }

    pub fn with_max_hold(mut self, max_hold_candles: usize) -> Self {
        self.max_hold_candles = max_hold_candles;
        self
    }

    pub fn with_costs(mut self, slippage_pct: f64, fee_pct: f64) -> Self {
        self.slippage_pct = slippage_pct;
        self.fee_pct = fee_pct;
        self
    }

    pub fn with_min_liquidity(mut self, min_liquidity_usd: f64) -> Self {
        self.min_liquidity_usd = min_liquidity_usd;
        self
    }

    pub fn with_entry_signal(self, signal: impl EntrySignal + 'static) -> Self {
        self.with_shared_signal(SharedSignal::new(signal))
    }

    pub fn with_shared_signal(mut self, signal: SharedSignal) -> Self {
        self.entry_signal = Some(signal);
        self
    }

    /// Reject configurations that would produce meaningless numbers
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("stop_loss_pct", self.stop_loss_pct),
            ("take_profit_pct", self.take_profit_pct),
            ("trailing_stop_pct", self.trailing_stop_pct),
            ("min_score", self.min_score),
            ("min_liquidity_usd", self.min_liquidity_usd),
            ("slippage_pct", self.slippage_pct),
            ("fee_pct", self.fee_pct),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(BacktestError::invalid(format!("{name} must be finite, got {value}")));
            }
        }

        if self.stop_loss_pct <= 0.0 || self.stop_loss_pct >= 100.0 {
            return Err(BacktestError::invalid(format!(
                "stop_loss_pct must be in (0, 100), got {}",
                self.stop_loss_pct
            )));
        }
        if self.take_profit_pct <= 0.0 {
            return Err(BacktestError::invalid(format!(
                "take_profit_pct must be positive, got {}",
                self.take_profit_pct
            )));
        }
        if self.trailing_stop_pct < 0.0 || self.trailing_stop_pct >= 100.0 {
            return Err(BacktestError::invalid(format!(
                "trailing_stop_pct must be in [0, 100), got {}",
                self.trailing_stop_pct
            )));
        }
        if self.slippage_pct < 0.0 || self.slippage_pct >= 100.0 {
            return Err(BacktestError::invalid(format!(
                "slippage_pct must be in [0, 100), got {}",
                self.slippage_pct
            )));
        }
        if self.fee_pct < 0.0 {
            return Err(BacktestError::invalid(format!(
                "fee_pct must not be negative, got {}",
                self.fee_pct
            )));
        }
        if self.min_score < 0.0 || self.min_liquidity_usd < 0.0 {
            return Err(BacktestError::invalid(
                "min_score and min_liquidity_usd must not be negative",
            ));
        }
        if self.max_hold_candles == 0 {
            return Err(BacktestError::invalid("max_hold_candles must be at least 1"));
        }

        Ok(())
    }
}

/// Bootstrap resampling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapSettings {
    pub iterations: usize,
    pub confidence: f64,
    pub seed: u64,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            iterations: 2000,
            confidence: 0.95,
            seed: 42,
        }
    }
}

impl BootstrapSettings {
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(BacktestError::invalid("bootstrap iterations must be at least 1"));
        }
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(BacktestError::invalid(format!(
                "bootstrap confidence must be in (0, 1), got {}",
                self.confidence
            )));
        }
        Ok(())
    }
}

/// Statistical constants used when aggregating and ranking results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Annualization base; 8760 assumes hourly candles
    pub periods_per_year: f64,
    /// Normal quantile for the CLT and Wilson intervals
    pub z: f64,
    pub ewma_lambda: f64,
    pub bootstrap: BootstrapSettings,
    /// Grid-search results with fewer trades are dropped
    pub min_ranked_trades: usize,
    pub robust_max_win_rate_drift: f64,
    pub robust_min_oos_trades: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            periods_per_year: 8760.0,
            z: 1.96,
            ewma_lambda: 0.90,
            bootstrap: BootstrapSettings::default(),
            min_ranked_trades: 10,
            robust_max_win_rate_drift: 0.15,
            robust_min_oos_trades: 5,
        }
    }
}

impl AnalysisSettings {
    pub fn with_periods_per_year(mut self, periods_per_year: f64) -> Self {
        self.periods_per_year = periods_per_year;
        self
    }

    pub fn with_bootstrap_seed(mut self, seed: u64) -> Self {
        self.bootstrap.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.periods_per_year.is_finite() && self.periods_per_year > 0.0) {
            return Err(BacktestError::invalid(format!(
                "periods_per_year must be positive, got {}",
                self.periods_per_year
            )));
        }
        if !(self.z.is_finite() && self.z > 0.0) {
            return Err(BacktestError::invalid(format!("z must be positive, got {}", self.z)));
        }
        if !(0.0..=1.0).contains(&self.ewma_lambda) {
            return Err(BacktestError::invalid(format!(
                "ewma_lambda must be in [0, 1], got {}",
                self.ewma_lambda
            )));
        }
        if !(0.0..=1.0).contains(&self.robust_max_win_rate_drift) {
            return Err(BacktestError::invalid(
                "robust_max_win_rate_drift must be in [0, 1]",
            ));
        }
        self.bootstrap.validate()
    }
}

/// Value ranges swept by the grid-search optimizer. An empty dimension keeps
/// the base config's value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterGrid {
    pub stop_loss_pcts: Vec<f64>,
    pub take_profit_pcts: Vec<f64>,
    pub trailing_stop_pcts: Vec<f64>,
    pub max_hold_candles: Vec<usize>,
}

impl Default for ParameterGrid {
    fn default() -> Self {
        Self {
            stop_loss_pcts: vec![5.0, 10.0, 15.0, 25.0],
            take_profit_pcts: vec![10.0, 20.0, 50.0, 100.0],
            trailing_stop_pcts: vec![0.0, 5.0, 10.0],
            max_hold_candles: vec![12, 24, 48],
        }
    }
}

impl ParameterGrid {
    /// Number of combinations the grid expands to
    pub fn size(&self) -> usize {
        [
            self.stop_loss_pcts.len(),
            self.take_profit_pcts.len(),
            self.trailing_stop_pcts.len(),
            self.max_hold_candles.len(),
        ]
        .iter()
        .map(|&len| len.max(1))
        .product()
    }

    /// Expand the cartesian product over `base`. No stop-loss/take-profit
    /// ordering is enforced here.
    pub fn configs(&self, base: &BacktestConfig) -> Vec<BacktestConfig> {
        let stop_losses = or_base(&self.stop_loss_pcts, base.stop_loss_pct);
        let take_profits = or_base(&self.take_profit_pcts, base.take_profit_pct);
        let trailing_stops = or_base(&self.trailing_stop_pcts, base.trailing_stop_pct);
        let max_holds = or_base(&self.max_hold_candles, base.max_hold_candles);

        let mut configs = Vec::with_capacity(self.size());
        for &stop_loss in &stop_losses {
            for &take_profit in &take_profits {
                for &trailing_stop in &trailing_stops {
                    for &max_hold in &max_holds {
                        configs.push(
                            base.clone()
                                .with_stop_loss(stop_loss)
                                .with_take_profit(take_profit)
                                .with_trailing_stop(trailing_stop)
                                .with_max_hold(max_hold),
                        );
                    }
                }
            }
        }
        configs
    }

    /// Every expanded combination must be a valid config
    pub fn validate(&self, base: &BacktestConfig) -> Result<()> {
        self.configs(base).iter().try_for_each(BacktestConfig::validate)
    }
}

fn or_base<T: Copy>(values: &[T], base: T) -> Vec<T> {
    if values.is_empty() {
        vec![base]
    } else {
        values.to_vec()
    }
}

/// Built-in entry signals, selectable from config files and the CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalConfig {
    /// Enter at every `interval`-th candle index
    EveryNth { interval: usize },
    /// Enter when RSI(period) is at or below `threshold`
    RsiOversold { period: usize, threshold: f64 },
    /// Enter when EMA(fast) crosses above EMA(slow)
    EmaCrossover { fast: usize, slow: usize },
}

impl Default for SignalConfig {
    fn default() -> Self {
        SignalConfig::EveryNth { interval: 24 }
    }
}

/// Everything a CLI invocation needs, loadable from a TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub backtest: BacktestConfig,
    pub analysis: AnalysisSettings,
    pub signal: SignalConfig,
    pub grid: ParameterGrid,
}

impl RunSettings {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        assert!(BacktestConfig::default().validate().is_ok());
        assert!(AnalysisSettings::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_max_hold() {
        let config = BacktestConfig::default().with_max_hold(0);
        assert!(matches!(
            config.validate(),
            Err(BacktestError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_rejects_out_of_range_percentages() {
        assert!(BacktestConfig::default().with_stop_loss(0.0).validate().is_err());
        assert!(BacktestConfig::default().with_stop_loss(100.0).validate().is_err());
        assert!(BacktestConfig::default().with_take_profit(-5.0).validate().is_err());
        assert!(BacktestConfig::default().with_trailing_stop(-1.0).validate().is_err());
        assert!(BacktestConfig::default().with_costs(f64::NAN, 0.1).validate().is_err());
        assert!(BacktestConfig::default().with_costs(0.1, -0.1).validate().is_err());
    }

    #[test]
    fn test_stop_loss_above_take_profit_is_allowed() {
        let config = BacktestConfig::default().with_stop_loss(30.0).with_take_profit(5.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_analysis_settings() {
        let mut settings = AnalysisSettings::default();
        settings.bootstrap.iterations = 0;
        assert!(settings.validate().is_err());

        let mut settings = AnalysisSettings::default();
        settings.bootstrap.confidence = 1.0;
        assert!(settings.validate().is_err());

        let settings = AnalysisSettings::default().with_periods_per_year(0.0);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_grid_expands_cartesian_product() {
        let grid = ParameterGrid {
            stop_loss_pcts: vec![5.0, 20.0],
            take_profit_pcts: vec![10.0, 15.0, 30.0],
            trailing_stop_pcts: vec![],
            max_hold_candles: vec![6, 12],
        };
        let base = BacktestConfig::default().with_trailing_stop(3.0);
        let configs = grid.configs(&base);

        assert_eq!(grid.size(), 12);
        assert_eq!(configs.len(), 12);
        assert!(configs.iter().all(|c| c.trailing_stop_pct == 3.0));
        // stop loss above take profit stays in the grid
        assert!(configs
            .iter()
            .any(|c| c.stop_loss_pct == 20.0 && c.take_profit_pct == 10.0));
        assert_eq!(configs[0].max_hold_candles, 6);
        assert_eq!(configs[1].max_hold_candles, 12);
    }

    #[test]
    fn test_grid_validation_catches_bad_values() {
        let grid = ParameterGrid {
            max_hold_candles: vec![0, 12],
            ..Default::default()
        };
        assert!(grid.validate(&BacktestConfig::default()).is_err());
    }

    #[test]
    fn test_run_settings_from_toml() {
        let settings = RunSettings::from_toml_str(
            r#"
            [backtest]
            stop_loss_pct = 8.0
            max_hold_candles = 12

            [analysis]
            periods_per_year = 365.0

            [analysis.bootstrap]
            seed = 7

            [signal]
            type = "rsi_oversold"
            period = 14
            threshold = 30.0
            "#,
        )
        .unwrap();

        assert_eq!(settings.backtest.stop_loss_pct, 8.0);
        assert_eq!(settings.backtest.take_profit_pct, 20.0);
        assert_eq!(settings.backtest.max_hold_candles, 12);
        assert_eq!(settings.analysis.periods_per_year, 365.0);
        assert_eq!(settings.analysis.bootstrap.seed, 7);
        assert_eq!(settings.analysis.bootstrap.iterations, 2000);
        assert_eq!(
            settings.signal,
            SignalConfig::RsiOversold {
                period: 14,
                threshold: 30.0
            }
        );
        assert_eq!(settings.grid, ParameterGrid::default());
    }

    #[test]
    fn test_run_settings_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[signal]\ntype = \"every_nth\"\ninterval = 12").unwrap();

        let settings = RunSettings::from_toml_file(file.path()).unwrap();
        assert_eq!(settings.signal, SignalConfig::EveryNth { interval: 12 });
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        let err = RunSettings::from_toml_str("[backtest]\nstop_loss_pct = \"ten\"").unwrap_err();
        assert!(matches!(err, BacktestError::TomlError(_)));
    }
}
