use common::{
    AnalysisSettings, BacktestConfig, BacktestResult, Candle, ExitBreakdown, Result, Trade,
};

use crate::indicators::{
    bootstrap_sharpe_ci, clt_mean_ci, ewma_volatility, mean, parkinson_volatility, sample_std,
    wilson_score_ci,
};
use crate::simulator::Simulation;

/// Starting value of every equity curve
pub const EQUITY_BASE: f64 = 100.0;
pub const PROFIT_FACTOR_CAP: f64 = 999.0;
pub const SHARPE_CLAMP: f64 = 10.0;
const SHARPE_STD_FLOOR: f64 = 0.001;

/// Turns a simulation into a full `BacktestResult`
pub struct MetricsCalculator;

impl MetricsCalculator {
    /// Aggregate trade statistics, risk ratios and confidence overlays
    ///
    /// # Errors
    /// Propagates invalid analysis settings.
    pub fn calculate(
        label: &str,
        config: &BacktestConfig,
        candles: &[Candle],
        simulation: Simulation,
        settings: &AnalysisSettings,
    ) -> Result<BacktestResult> {
        let Simulation {
            trades,
            equity_curve,
        } = simulation;

        let net_returns: Vec<f64> = trades.iter().map(|t| t.pnl_net).collect();
        let log_returns: Vec<f64> = trades.iter().map(|t| t.log_return).collect();

        let stats = Self::calculate_trade_stats(&trades);

        let std_return = sample_std(&net_returns);
        let trades_per_year = if candles.is_empty() {
            0.0
        } else {
            trades.len() as f64 / candles.len() as f64 * settings.periods_per_year
        };
        let mean_return = mean(&net_returns);
        let sharpe = Self::annualized_ratio(mean_return, std_return, trades_per_year);
        let sortino = Self::calculate_sortino(&net_returns, trades_per_year);

        let total_return_pct = equity_curve.last().copied().unwrap_or(EQUITY_BASE) - EQUITY_BASE;
        let (max_drawdown_pct, max_drawdown_duration) = Self::calculate_max_drawdown(&equity_curve);
        let drawdown_curve = Self::calculate_drawdown_curve(&equity_curve);
        let recovery_factor = if max_drawdown_pct > 0.0 {
            (total_return_pct / max_drawdown_pct).abs()
        } else {
            0.0
        };

        let mean_estimate = clt_mean_ci(&net_returns, settings.z);
        let win_rate_ci95 = wilson_score_ci(stats.wins, trades.len(), settings.z);
        let sharpe_ci95 = bootstrap_sharpe_ci(&net_returns, &settings.bootstrap)?;

        Ok(BacktestResult {
            label: label.to_string(),
            config: config.clone(),
            total_candles: candles.len(),
            total_trades: trades.len(),
            wins: stats.wins,
            losses: stats.losses,
            win_rate: stats.win_rate,
            avg_return: stats.avg_return,
            avg_win: stats.avg_win,
            avg_loss: stats.avg_loss,
            best_trade: stats.best,
            worst_trade: stats.worst,
            avg_hold_candles: stats.avg_hold,
            profit_factor: stats.profit_factor,
            expectancy: stats.expectancy,
            exit_breakdown: ExitBreakdown::from_trades(&trades),
            std_return,
            sharpe,
            sortino,
            total_return_pct,
            max_drawdown_pct,
            max_drawdown_duration,
            recovery_factor,
            avg_return_ci95: mean_estimate.interval,
            clt_reliable: mean_estimate.reliable,
            win_rate_ci95,
            sharpe_ci95,
            parkinson_volatility: parkinson_volatility(candles),
            ewma_volatility: ewma_volatility(&log_returns, settings.ewma_lambda)?,
            trades,
            equity_curve,
            drawdown_curve,
        })
    }

    /// `mean / max(std, 0.001) * sqrt(max(periods, 1))`, clamped to ±10
    fn annualized_ratio(mean_return: f64, deviation: f64, trades_per_year: f64) -> f64 {
        let ratio = mean_return / deviation.max(SHARPE_STD_FLOOR) * trades_per_year.max(1.0).sqrt();
        ratio.clamp(-SHARPE_CLAMP, SHARPE_CLAMP)
    }

    /// Sortino ratio (uses only downside deviation)
    fn calculate_sortino(net_returns: &[f64], trades_per_year: f64) -> f64 {
        let n = net_returns.len();
        if n < 2 {
            return 0.0;
        }

        let downside_variance = net_returns
            .iter()
            .map(|r| r.min(0.0).powi(2))
            .sum::<f64>()
            / (n - 1) as f64;

        Self::annualized_ratio(mean(net_returns), downside_variance.sqrt(), trades_per_year)
    }

    /// Calculate maximum drawdown (percent) and its length in trades
    fn calculate_max_drawdown(equity_curve: &[f64]) -> (f64, usize) {
        let Some(&first) = equity_curve.first() else {
            return (0.0, 0);
        };

        let mut peak = first;
        let mut peak_index = 0;
        let mut max_drawdown = 0.0;
        let mut max_duration = 0;

        for (i, &equity) in equity_curve.iter().enumerate() {
            if equity > peak {
                peak = equity;
                peak_index = i;
            }

            if peak > 0.0 {
                let drawdown = (peak - equity) / peak * 100.0;
                if drawdown > max_drawdown {
                    max_drawdown = drawdown;
                }
            }
            if equity < peak {
                max_duration = max_duration.max(i - peak_index);
            }
        }

        (max_drawdown, max_duration)
    }

    /// Calculate drawdown curve
    pub fn calculate_drawdown_curve(equity_curve: &[f64]) -> Vec<f64> {
        let mut peak = f64::NEG_INFINITY;
        equity_curve
            .iter()
            .map(|&equity| {
                peak = peak.max(equity);
                if peak > 0.0 {
                    (peak - equity) / peak * 100.0
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Calculate trade statistics
    fn calculate_trade_stats(trades: &[Trade]) -> TradeStats {
        if trades.is_empty() {
            return TradeStats::default();
        }

        let n = trades.len() as f64;
        let mut wins = 0usize;
        let mut gross_win = 0.0;
        let mut gross_loss = 0.0;
        let mut best = f64::MIN;
        let mut worst = f64::MAX;

        for trade in trades {
            if trade.is_win() {
                wins += 1;
                gross_win += trade.pnl_net;
            } else {
                gross_loss += trade.pnl_net;
            }
            best = best.max(trade.pnl_pct);
            worst = worst.min(trade.pnl_pct);
        }

        let losses = trades.len() - wins;
        let win_rate = wins as f64 / n;
        let avg_win = if wins > 0 { gross_win / wins as f64 } else { 0.0 };
        let avg_loss = if losses > 0 {
            gross_loss.abs() / losses as f64
        } else {
            0.0
        };

        let profit_factor = if gross_loss < 0.0 {
            (gross_win / gross_loss.abs()).min(PROFIT_FACTOR_CAP)
        } else if gross_win > 0.0 {
            PROFIT_FACTOR_CAP
        } else {
            0.0
        };

        TradeStats {
            wins,
            losses,
            win_rate,
            avg_return: trades.iter().map(|t| t.pnl_pct).sum::<f64>() / n,
            avg_win,
            avg_loss,
            best,
            worst,
            avg_hold: trades.iter().map(|t| t.hold_candles as f64).sum::<f64>() / n,
            profit_factor,
            expectancy: win_rate * avg_win - (1.0 - win_rate) * avg_loss,
        }
    }
}

/// Compound per-trade net returns from a base of 100, floored at zero
pub fn build_equity_curve(trades: &[Trade]) -> Vec<f64> {
    let mut equity = EQUITY_BASE;
    let mut curve = Vec::with_capacity(trades.len() + 1);
    curve.push(equity);

    for trade in trades {
        equity = (equity * (1.0 + trade.pnl_net / 100.0)).max(0.0);
        curve.push(equity);
    }

    curve
}

#[derive(Debug, Default)]
struct TradeStats {
    wins: usize,
    losses: usize,
    win_rate: f64,
    avg_return: f64,
    avg_win: f64,
    avg_loss: f64,
    best: f64,
    worst: f64,
    avg_hold: f64,
    profit_factor: f64,
    expectancy: f64,
}
