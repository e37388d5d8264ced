//! Human-readable reports and backtest-vs-live comparison

use std::fmt;

use common::{BacktestResult, ConfidenceInterval, ExitReason, WalkForwardResult};
use serde::{Deserialize, Serialize};

use crate::indicators::mean;
use crate::metrics::EQUITY_BASE;

const RULE: &str = "================================================================";
const THIN_RULE: &str = "----------------------------------------------------------------";

/// Backtest performance next to realized live trades
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveComparison {
    /// Compounded return of the backtest, percent
    pub backtest_return: f64,
    /// Compounded return of the live trades, percent
    pub live_return: f64,
    /// `backtest_return - live_return`
    pub deviation: f64,
    /// Deviation relative to |backtest_return|, percent (0 when the backtest is flat)
    pub deviation_pct: f64,
    pub backtest_avg_return: f64,
    pub live_avg_return: f64,
    pub backtest_trades: usize,
    pub live_trades: usize,
    pub backtest_win_rate: f64,
    pub live_win_rate: f64,
    /// Live average return falls inside the backtest's CLT interval
    pub live_within_ci: bool,
}

/// Compare a backtest with live per-trade net returns (percent)
pub fn compare_with_live(result: &BacktestResult, live_pnl_pcts: &[f64]) -> LiveComparison {
    let live_equity = live_pnl_pcts
        .iter()
        .fold(EQUITY_BASE, |equity, pnl| (equity * (1.0 + pnl / 100.0)).max(0.0));
    let live_return = live_equity - EQUITY_BASE;

    let backtest_return = result.total_return_pct;
    let deviation = backtest_return - live_return;
    let deviation_pct = if backtest_return != 0.0 {
        deviation / backtest_return.abs() * 100.0
    } else {
        0.0
    };

    let live_wins = live_pnl_pcts.iter().filter(|&&p| p > 0.0).count();
    let live_win_rate = if live_pnl_pcts.is_empty() {
        0.0
    } else {
        live_wins as f64 / live_pnl_pcts.len() as f64
    };

    let backtest_returns: Vec<f64> = result.trades.iter().map(|t| t.pnl_net).collect();
    let live_avg_return = mean(live_pnl_pcts);

    LiveComparison {
        backtest_return,
        live_return,
        deviation,
        deviation_pct,
        backtest_avg_return: mean(&backtest_returns),
        live_avg_return,
        backtest_trades: result.total_trades,
        live_trades: live_pnl_pcts.len(),
        backtest_win_rate: result.win_rate,
        live_win_rate,
        live_within_ci: !live_pnl_pcts.is_empty()
            && result.avg_return_ci95.contains(live_avg_return),
    }
}

fn fmt_ci(ci: &ConfidenceInterval, precision: usize) -> String {
    if ci.is_bounded() {
        format!("[{:.*}, {:.*}]", precision, ci.lower, precision, ci.upper)
    } else {
        "n/a".to_string()
    }
}

/// Summary of a single backtest
pub struct TextReport<'a>(pub &'a BacktestResult);

impl fmt::Display for TextReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = self.0;
        let cfg = &result.config;

        writeln!(f)?;
        writeln!(f, "{RULE}")?;
        writeln!(f, "  BACKTEST REPORT - {}", result.label)?;
        writeln!(f, "{RULE}")?;
        writeln!(f)?;
        writeln!(f, "  Candles:          {:>12}", result.total_candles)?;
        writeln!(
            f,
            "  Risk:             SL {:.1}% | TP {:.1}% | trail {:.1}% | hold {}",
            cfg.stop_loss_pct, cfg.take_profit_pct, cfg.trailing_stop_pct, cfg.max_hold_candles
        )?;
        writeln!(
            f,
            "  Costs:            slippage {:.2}% | fee {:.2}% per side",
            cfg.slippage_pct, cfg.fee_pct
        )?;
        writeln!(f)?;
        writeln!(f, "{THIN_RULE}")?;
        writeln!(f, "  TRADE STATISTICS")?;
        writeln!(f, "{THIN_RULE}")?;
        writeln!(f, "  Total Trades:     {:>12}", result.total_trades)?;
        writeln!(f, "  Wins / Losses:    {:>5} / {:<5}", result.wins, result.losses)?;
        writeln!(
            f,
            "  Win Rate:         {:>12.1}%  CI95 {}",
            result.win_rate * 100.0,
            fmt_ci(&result.win_rate_ci95, 3)
        )?;
        writeln!(f, "  Avg Return:       {:>12.2}%", result.avg_return)?;
        writeln!(f, "  Avg Win:          {:>12.2}%", result.avg_win)?;
        writeln!(f, "  Avg Loss:         {:>12.2}%", result.avg_loss)?;
        writeln!(f, "  Best Trade:       {:>12.2}%", result.best_trade)?;
        writeln!(f, "  Worst Trade:      {:>12.2}%", result.worst_trade)?;
        writeln!(f, "  Avg Hold:         {:>12.1} candles", result.avg_hold_candles)?;
        writeln!(f, "  Profit Factor:    {:>12.3}", result.profit_factor)?;
        writeln!(
            f,
            "  Expectancy:       {:>12.3}%  CI95 {}{}",
            result.expectancy,
            fmt_ci(&result.avg_return_ci95, 3),
            if result.clt_reliable { "" } else { " (unreliable)" }
        )?;
        writeln!(f)?;
        writeln!(f, "{THIN_RULE}")?;
        writeln!(f, "  RISK METRICS")?;
        writeln!(f, "{THIN_RULE}")?;
        writeln!(f, "  Total Return:     {:>+12.2}%", result.total_return_pct)?;
        writeln!(f, "  Std Return:       {:>12.3}", result.std_return)?;
        writeln!(
            f,
            "  Sharpe Ratio:     {:>12.3}  CI95 {}",
            result.sharpe,
            fmt_ci(&result.sharpe_ci95, 3)
        )?;
        writeln!(f, "  Sortino Ratio:    {:>12.3}", result.sortino)?;
        writeln!(f, "  Max Drawdown:     {:>12.2}%", result.max_drawdown_pct)?;
        writeln!(f, "  Max DD Duration:  {:>12} trades", result.max_drawdown_duration)?;
        writeln!(f, "  Recovery Factor:  {:>12.3}", result.recovery_factor)?;
        writeln!(f, "  Parkinson Vol:    {:>12.5}", result.parkinson_volatility)?;
        writeln!(f, "  EWMA Vol:         {:>12.5}", result.ewma_volatility)?;
        writeln!(f)?;
        writeln!(f, "{THIN_RULE}")?;
        writeln!(f, "  EXITS")?;
        writeln!(f, "{THIN_RULE}")?;
        for reason in ExitReason::ALL {
            writeln!(
                f,
                "  {:<18}{:>12}",
                reason.as_str(),
                result.exit_breakdown.count(reason)
            )?;
        }
        writeln!(f)?;
        writeln!(f, "{RULE}")?;

        if !result.trades.is_empty() {
            writeln!(f)?;
            writeln!(f, "  RECENT TRADES (last 5)")?;
            writeln!(f, "{THIN_RULE}")?;
            for trade in result.trades.iter().rev().take(5) {
                writeln!(
                    f,
                    "  #{:<6} -> #{:<6} | net {:+.2}% | {:<11} | {} candles",
                    trade.entry_index,
                    trade.exit_index,
                    trade.pnl_net,
                    trade.exit_reason.as_str(),
                    trade.hold_candles
                )?;
            }
            writeln!(f)?;
        }

        Ok(())
    }
}

/// Ranked grid-search summary, best `top` rows
pub struct GridTable<'a> {
    pub results: &'a [BacktestResult],
    pub top: usize,
}

impl fmt::Display for GridTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>4} {:>6} {:>6} {:>6} {:>5} {:>7} {:>7} {:>10} {:>8} {:>8}",
            "rank", "sl%", "tp%", "trail%", "hold", "trades", "win%", "expect%", "pf", "sharpe"
        )?;
        writeln!(f, "{THIN_RULE}-------------")?;

        if self.results.is_empty() {
            return writeln!(f, "  no combination reached the minimum trade count");
        }

        for (rank, r) in self.results.iter().take(self.top).enumerate() {
            writeln!(
                f,
                "{:>4} {:>6.1} {:>6.1} {:>6.1} {:>5} {:>7} {:>7.1} {:>10.3} {:>8.3} {:>8.3}",
                rank + 1,
                r.config.stop_loss_pct,
                r.config.take_profit_pct,
                r.config.trailing_stop_pct,
                r.config.max_hold_candles,
                r.total_trades,
                r.win_rate * 100.0,
                r.expectancy,
                r.profit_factor,
                r.sharpe
            )?;
        }

        Ok(())
    }
}

/// In-sample vs out-of-sample comparison
pub struct WalkForwardReport<'a>(pub &'a WalkForwardResult);

impl fmt::Display for WalkForwardReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let wf = self.0;

        writeln!(f)?;
        writeln!(f, "{RULE}")?;
        writeln!(
            f,
            "  WALK-FORWARD - split {:.2} at candle {}",
            wf.split_ratio, wf.split_index
        )?;
        writeln!(f, "{RULE}")?;
        writeln!(f, "  {:<18}{:>14}{:>14}", "", "in-sample", "out-of-sample")?;
        let rows = [
            ("Candles", wf.in_sample.total_candles as f64, wf.out_of_sample.total_candles as f64),
            ("Trades", wf.in_sample.total_trades as f64, wf.out_of_sample.total_trades as f64),
            ("Win Rate %", wf.in_sample.win_rate * 100.0, wf.out_of_sample.win_rate * 100.0),
            ("Expectancy %", wf.in_sample.expectancy, wf.out_of_sample.expectancy),
            ("Sharpe", wf.in_sample.sharpe, wf.out_of_sample.sharpe),
            ("Total Return %", wf.in_sample.total_return_pct, wf.out_of_sample.total_return_pct),
        ];
        for (name, is, oos) in rows {
            writeln!(f, "  {:<18}{:>14.2}{:>14.2}", name, is, oos)?;
        }
        writeln!(f, "{THIN_RULE}")?;
        writeln!(
            f,
            "  Win-rate drift:   {:>12.3}   Robust: {}",
            wf.win_rate_drift,
            if wf.robust { "yes" } else { "no" }
        )?;
        writeln!(f, "{RULE}")
    }
}

pub fn render_text_report(result: &BacktestResult) -> String {
    TextReport(result).to_string()
}

pub fn render_grid_table(results: &[BacktestResult], top: usize) -> String {
    GridTable { results, top }.to_string()
}

pub fn render_walk_forward_report(wf: &WalkForwardResult) -> String {
    WalkForwardReport(wf).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{grid_search, run, walk_forward_test};
    use approx::assert_relative_eq;
    use common::{BacktestConfig, Candle, ParameterGrid, SharedSignal};

    fn rising_candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle::flat(i as i64 * 3_600_000, 100.0 * 1.01f64.powi(i as i32), 1000.0))
            .collect()
    }

    fn config() -> BacktestConfig {
        BacktestConfig::default()
            .with_max_hold(2)
            .with_costs(0.0, 0.0)
            .with_entry_signal(|_: &[Candle], _: usize| true)
    }

    #[test]
    fn test_text_report_sections() {
        let result = run(&rising_candles(60), &config(), "rising").unwrap();
        let report = render_text_report(&result);

        assert!(report.contains("BACKTEST REPORT - rising"));
        assert!(report.contains("TRADE STATISTICS"));
        assert!(report.contains("RISK METRICS"));
        assert!(report.contains("expired"));
        assert!(report.contains("RECENT TRADES"));
    }

    #[test]
    fn test_text_report_without_trades() {
        let result = run(&[], &BacktestConfig::default(), "empty").unwrap();
        let report = render_text_report(&result);

        assert!(report.contains("n/a"));
        assert!(!report.contains("RECENT TRADES"));
    }

    #[test]
    fn test_report_embeds_in_format() {
        let result = run(&rising_candles(30), &config(), "inline").unwrap();
        let text = format!("{}", TextReport(&result));

        assert_eq!(text, render_text_report(&result));
        assert!(text.starts_with('\n'));
        assert!(text.contains("Total Trades:"));
    }

    #[test]
    fn test_grid_table_limits_rows() {
        let grid = ParameterGrid {
            stop_loss_pcts: vec![5.0, 10.0, 15.0],
            take_profit_pcts: vec![20.0],
            trailing_stop_pcts: vec![0.0],
            max_hold_candles: vec![2],
        };
        let results = grid_search(
            &rising_candles(100),
            &config(),
            &grid,
            "grid",
            Some(SharedSignal::new(|_: &[Candle], _: usize| true)),
        )
        .unwrap();
        let table = render_grid_table(&results, 2);

        // header + rule + two rows
        assert_eq!(table.lines().count(), 4);
        assert!(render_grid_table(&[], 5).contains("no combination"));
    }

    #[test]
    fn test_walk_forward_report() {
        let wf = walk_forward_test(&rising_candles(100), &config(), "wf", 0.7).unwrap();
        let report = render_walk_forward_report(&wf);

        assert!(report.contains("split 0.70 at candle 70"));
        assert!(report.contains("Robust: yes"));
    }

    #[test]
    fn test_compare_with_live() {
        let result = run(&rising_candles(60), &config(), "live").unwrap();
        let live = [1.0, -1.0, 2.0, 0.0];
        let cmp = compare_with_live(&result, &live);

        let live_equity = 100.0 * 1.01 * 0.99 * 1.02;
        assert_relative_eq!(cmp.live_return, live_equity - 100.0, epsilon = 1e-9);
        assert_relative_eq!(cmp.deviation, result.total_return_pct - cmp.live_return);
        assert_relative_eq!(cmp.live_win_rate, 0.5);
        assert_relative_eq!(cmp.live_avg_return, 0.5);
        assert_eq!(cmp.live_trades, 4);
        assert_eq!(cmp.backtest_trades, result.total_trades);
        assert!(cmp.deviation > 0.0);
    }

    #[test]
    fn test_compare_with_no_live_trades() {
        let result = run(&[], &BacktestConfig::default(), "none").unwrap();
        let cmp = compare_with_live(&result, &[]);

        assert_eq!(cmp.live_return, 0.0);
        assert_eq!(cmp.live_win_rate, 0.0);
        assert_eq!(cmp.deviation_pct, 0.0);
        assert!(!cmp.live_within_ci);
    }
}
