//! Trade simulator
//!
//! Scans a candle sequence for entry signals and walks each entry forward
//! candle by candle until an exit rule fires. Only one trade is open at a
//! time; scanning resumes on the candle after the exit.
//!
//! Exit rules are checked in a fixed order per candle, first match wins:
//! stop-loss, take-profit, trailing stop, max hold. Intracandle order is
//! unknown from OHLC data, so a candle that touches both the stop and the
//! target is treated as a stop-out.

use common::{BacktestConfig, Candle, ExitReason, SharedSignal, Trade};
use tracing::debug;

use crate::indicators::log_return;
use crate::metrics::build_equity_curve;
use crate::signals::{default_signal, LiquidityGate};

/// Trades and the resulting equity curve of one pass over a sequence
#[derive(Debug, Clone)]
pub struct Simulation {
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<f64>,
}

/// Runs the entry/exit state machine for a single config
pub struct TradeSimulator<'a> {
    config: &'a BacktestConfig,
    signal: SharedSignal,
}

impl<'a> TradeSimulator<'a> {
    /// `config` is assumed to be validated
    ///
    /// A positive `min_liquidity_usd` gates whichever signal is in use.
    pub fn new(config: &'a BacktestConfig) -> Self {
        let mut signal = config.entry_signal.clone().unwrap_or_else(default_signal);
        if config.min_liquidity_usd > 0.0 {
            signal = SharedSignal::new(LiquidityGate::new(signal, config.min_liquidity_usd));
        }
        Self { config, signal }
    }

    /// Run over the full sequence
    pub fn simulate(&self, candles: &[Candle]) -> Simulation {
        let trades = self.run(candles);
        let equity_curve = build_equity_curve(&trades);
        Simulation {
            trades,
            equity_curve,
        }
    }

    /// Scan for entries and collect closed trades in chronological order
    pub fn run(&self, candles: &[Candle]) -> Vec<Trade> {
        let mut trades = Vec::new();
        let mut i = 0;

        while i < candles.len() {
            if !self.signal.evaluate(candles, i) {
                i += 1;
                continue;
            }

            match self.simulate_trade(candles, i) {
                Some(trade) => {
                    i += trade.hold_candles + 1;
                    trades.push(trade);
                }
                None => i += 1,
            }
        }

        debug!(
            signal = %self.signal.name(),
            candles = candles.len(),
            trades = trades.len(),
            "simulation finished"
        );

        trades
    }

    /// Open a trade at `entry_index` and walk it to its exit
    ///
    /// Returns `None` when there is no later candle to exit on or the entry
    /// close is not a positive price.
    pub fn simulate_trade(&self, candles: &[Candle], entry_index: usize) -> Option<Trade> {
        let entry = candles.get(entry_index)?;
        if entry.close <= 0.0 || entry_index + 1 >= candles.len() {
            return None;
        }

        let mut open = OpenTrade::enter(self.config, entry_index, entry);

        for (j, candle) in candles.iter().enumerate().skip(entry_index + 1) {
            open.observe(candle);
            if let Some((reason, price)) = open.check_exit(candle, j - entry_index) {
                return Some(open.close(j, candle, reason, price));
            }
        }

        let last_index = candles.len() - 1;
        let last = &candles[last_index];
        let exit_price = open.market_exit_price(last);
        Some(open.close(last_index, last, ExitReason::EndOfData, exit_price))
    }
}

/// A position between entry and exit
#[derive(Debug, Clone)]
struct OpenTrade<'a> {
    config: &'a BacktestConfig,
    entry_index: usize,
    entry_time: i64,
    entry_price: f64,
    tp_price: f64,
    sl_price: f64,
    trail_stop_price: f64,
    high_water_mark: f64,
    low_water_mark: f64,
    max_drawdown_pct: f64,
}

impl<'a> OpenTrade<'a> {
    /// Fill at the entry close plus slippage (always adverse to the buyer)
    fn enter(config: &'a BacktestConfig, entry_index: usize, candle: &Candle) -> Self {
        let entry_price = candle.close * (1.0 + config.slippage_pct / 100.0);
        Self {
            config,
            entry_index,
            entry_time: candle.timestamp,
            entry_price,
            tp_price: entry_price * (1.0 + config.take_profit_pct / 100.0),
            sl_price: entry_price * (1.0 - config.stop_loss_pct / 100.0),
            trail_stop_price: 0.0,
            high_water_mark: entry_price,
            low_water_mark: entry_price,
            max_drawdown_pct: 0.0,
        }
    }

    /// Update watermarks and ratchet the trailing stop
    fn observe(&mut self, candle: &Candle) {
        self.high_water_mark = self.high_water_mark.max(candle.high);
        self.low_water_mark = self.low_water_mark.min(candle.low);
        self.max_drawdown_pct = self
            .max_drawdown_pct
            .max((self.entry_price - self.low_water_mark) / self.entry_price * 100.0);

        if self.config.trailing_stop_pct > 0.0 {
            let candidate = self.high_water_mark * (1.0 - self.config.trailing_stop_pct / 100.0);
            self.trail_stop_price = self.trail_stop_price.max(candidate);
        }
    }

    fn check_exit(&self, candle: &Candle, hold_candles: usize) -> Option<(ExitReason, f64)> {
        if candle.low <= self.sl_price {
            return Some((ExitReason::Sl, self.sl_price));
        }
        if candle.high >= self.tp_price {
            return Some((ExitReason::Tp, self.tp_price));
        }
        if self.config.trailing_stop_pct > 0.0
            && self.trail_stop_price > self.sl_price
            && candle.low <= self.trail_stop_price
        {
            return Some((ExitReason::Trail, self.trail_stop_price));
        }
        if hold_candles >= self.config.max_hold_candles {
            return Some((ExitReason::Expired, self.market_exit_price(candle)));
        }
        None
    }

    /// Sell at the close less slippage
    fn market_exit_price(&self, candle: &Candle) -> f64 {
        candle.close * (1.0 - self.config.slippage_pct / 100.0)
    }

    fn close(self, exit_index: usize, candle: &Candle, reason: ExitReason, exit_price: f64) -> Trade {
        let pnl_pct = (exit_price - self.entry_price) / self.entry_price * 100.0;
        let fees = self.config.fee_pct * 2.0;

        Trade {
            entry_time: self.entry_time,
            exit_time: candle.timestamp,
            entry_index: self.entry_index,
            exit_index,
            entry_price: self.entry_price,
            exit_price,
            pnl_pct,
            pnl_net: pnl_pct - fees - self.config.slippage_pct,
            log_return: log_return(self.entry_price, exit_price),
            exit_reason: reason,
            hold_candles: exit_index - self.entry_index,
            high_water_mark: self.high_water_mark,
            low_water_mark: self.low_water_mark,
            max_drawdown_pct: self.max_drawdown_pct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const HOUR_MS: i64 = 3_600_000;

    fn flat_candles(n: usize, price: f64) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle::flat(i as i64 * HOUR_MS, price, 1000.0))
            .collect()
    }

    fn frictionless(stop_loss: f64, take_profit: f64, max_hold: usize) -> BacktestConfig {
        BacktestConfig::default()
            .with_stop_loss(stop_loss)
            .with_take_profit(take_profit)
            .with_trailing_stop(0.0)
            .with_max_hold(max_hold)
            .with_costs(0.0, 0.0)
    }

    fn entry_at_zero() -> impl Fn(&[Candle], usize) -> bool + Send + Sync {
        |_: &[Candle], index: usize| index == 0
    }

    #[test]
    fn test_flat_series_expires_twice() {
        let candles = flat_candles(30, 100.0);
        let config = frictionless(10.0, 20.0, 5);
        let trades = TradeSimulator::new(&config).run(&candles);

        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].entry_index, 0);
        assert_eq!(trades[1].entry_index, 24);
        for trade in &trades {
            assert_eq!(trade.exit_reason, ExitReason::Expired);
            assert_eq!(trade.hold_candles, 5);
            assert_eq!(trade.pnl_net, 0.0);
        }
        assert_eq!(trades[1].exit_time, 29 * HOUR_MS);
    }

    #[test]
    fn test_stop_loss_wins_when_candle_hits_both() {
        let mut candles = flat_candles(10, 100.0);
        // breaches both the 90 stop and the 120 target
        candles[3] = Candle::new(3 * HOUR_MS, 100.0, 125.0, 85.0, 110.0, 1000.0);

        let config = frictionless(10.0, 20.0, 50).with_entry_signal(entry_at_zero());
        let trades = TradeSimulator::new(&config).run(&candles);

        assert_eq!(trades.len(), 1);
        let trade = &trades[0];
        assert_eq!(trade.exit_reason, ExitReason::Sl);
        assert_relative_eq!(trade.exit_price, 90.0);
        assert_relative_eq!(trade.pnl_pct, -10.0);
        assert_eq!(trade.hold_candles, 3);
        assert_relative_eq!(trade.max_drawdown_pct, 15.0);
    }

    #[test]
    fn test_take_profit_exit() {
        let mut candles = flat_candles(10, 100.0);
        candles[2] = Candle::new(2 * HOUR_MS, 100.0, 121.0, 99.0, 118.0, 1000.0);

        let config = frictionless(10.0, 20.0, 50).with_entry_signal(entry_at_zero());
        let trade = TradeSimulator::new(&config)
            .simulate_trade(&candles, 0)
            .unwrap();

        assert_eq!(trade.exit_reason, ExitReason::Tp);
        assert_relative_eq!(trade.exit_price, 120.0);
        assert_relative_eq!(trade.pnl_pct, 20.0);
        assert_relative_eq!(trade.high_water_mark, 121.0);
        assert_relative_eq!(trade.log_return, (1.2f64).ln());
    }

    #[test]
    fn test_trailing_stop_ratchets() {
        let closes = [100.0, 105.0, 110.0, 115.0, 109.0, 100.0];
        let candles: Vec<Candle> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle::new(i as i64 * HOUR_MS, c, c, c, c, 1000.0))
            .collect();

        let config = frictionless(10.0, 50.0, 50)
            .with_trailing_stop(5.0)
            .with_entry_signal(entry_at_zero());
        let trade = TradeSimulator::new(&config)
            .simulate_trade(&candles, 0)
            .unwrap();

        // peak 115 -> trail at 109.25, breached by the 109 low
        assert_eq!(trade.exit_reason, ExitReason::Trail);
        assert_relative_eq!(trade.exit_price, 115.0 * 0.95);
        assert_eq!(trade.hold_candles, 4);
    }

    #[test]
    fn test_trailing_stop_below_stop_loss_is_ignored() {
        // trail of 20% sits below the 10% stop until price runs up
        let closes = [100.0, 101.0, 95.0, 92.0];
        let candles: Vec<Candle> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle::new(i as i64 * HOUR_MS, c, c, c, c, 1000.0))
            .collect();

        let config = frictionless(10.0, 50.0, 50)
            .with_trailing_stop(20.0)
            .with_entry_signal(entry_at_zero());
        let trade = TradeSimulator::new(&config)
            .simulate_trade(&candles, 0)
            .unwrap();

        assert_eq!(trade.exit_reason, ExitReason::EndOfData);
        assert_eq!(trade.exit_index, 3);
    }

    #[test]
    fn test_end_of_data_applies_slippage() {
        let candles = flat_candles(5, 100.0);
        let config = frictionless(10.0, 20.0, 50)
            .with_costs(1.0, 0.25)
            .with_entry_signal(entry_at_zero());
        let trade = TradeSimulator::new(&config)
            .simulate_trade(&candles, 0)
            .unwrap();

        assert_eq!(trade.exit_reason, ExitReason::EndOfData);
        assert_relative_eq!(trade.entry_price, 101.0);
        assert_relative_eq!(trade.exit_price, 99.0);
        let pnl_pct = (99.0 - 101.0) / 101.0 * 100.0;
        assert_relative_eq!(trade.pnl_pct, pnl_pct);
        assert_relative_eq!(trade.pnl_net, pnl_pct - 0.5 - 1.0);
        assert_eq!(trade.hold_candles, 4);
    }

    #[test]
    fn test_no_trade_on_final_candle() {
        let candles = flat_candles(25, 100.0);
        let config = frictionless(10.0, 20.0, 5);
        let simulator = TradeSimulator::new(&config);

        assert!(simulator.simulate_trade(&candles, 24).is_none());
        // index 24 fires but cannot be entered
        assert_eq!(simulator.run(&candles).len(), 1);
    }

    #[test]
    fn test_skips_non_positive_entry_price() {
        let mut candles = flat_candles(10, 100.0);
        candles[0] = Candle::flat(0, 0.0, 1000.0);
        let config = frictionless(10.0, 20.0, 5).with_entry_signal(entry_at_zero());

        assert!(TradeSimulator::new(&config).run(&candles).is_empty());
    }

    #[test]
    fn test_empty_sequence() {
        let config = BacktestConfig::default();
        let simulation = TradeSimulator::new(&config).simulate(&[]);

        assert!(simulation.trades.is_empty());
        assert_eq!(simulation.equity_curve, vec![100.0]);
    }

    #[test]
    fn test_scanning_resumes_after_exit() {
        let candles = flat_candles(19, 100.0);
        let config = frictionless(10.0, 20.0, 3)
            .with_entry_signal(|_: &[Candle], _: usize| true);
        let trades = TradeSimulator::new(&config).run(&candles);

        let entries: Vec<usize> = trades.iter().map(|t| t.entry_index).collect();
        assert_eq!(entries, vec![0, 4, 8, 12, 16]);
        assert!(trades[..4].iter().all(|t| t.exit_reason == ExitReason::Expired));
        // last trade runs out of data after 2 candles
        assert_eq!(trades[4].exit_reason, ExitReason::EndOfData);
        assert_eq!(trades[4].hold_candles, 2);
    }

    #[test]
    fn test_min_liquidity_gates_default_signal() {
        // close * volume = 100k USD per candle
        let candles = flat_candles(30, 100.0);
        let base = frictionless(10.0, 20.0, 5);

        let open = TradeSimulator::new(&base).run(&candles);
        assert_eq!(open.len(), 2);

        let gated = base.clone().with_min_liquidity(1_000_000.0);
        assert!(TradeSimulator::new(&gated).run(&candles).is_empty());

        let loose = base.with_min_liquidity(50_000.0);
        assert_eq!(TradeSimulator::new(&loose).run(&candles).len(), 2);
    }

    #[test]
    fn test_min_liquidity_gates_custom_signal() {
        let mut candles = flat_candles(10, 100.0);
        candles[0].volume = 1.0;
        let config = frictionless(10.0, 20.0, 2)
            .with_min_liquidity(10_000.0)
            .with_entry_signal(|_: &[Candle], index: usize| index < 2);
        let trades = TradeSimulator::new(&config).run(&candles);

        // index 0 is too thin, index 1 passes the gate
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].entry_index, 1);
    }
}
