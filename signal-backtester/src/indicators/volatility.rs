use common::{BacktestError, Candle, Result};

/// Natural log return between two prices, 0 when `entry` is not positive
pub fn log_return(entry: f64, exit: f64) -> f64 {
    if entry <= 0.0 || exit <= 0.0 {
        return 0.0;
    }
    (exit / entry).ln()
}

/// Consecutive log returns of a price series
pub fn log_returns(prices: &[f64]) -> Vec<f64> {
    prices.windows(2).map(|w| log_return(w[0], w[1])).collect()
}

/// Exponentially weighted volatility (RiskMetrics style)
///
/// Variance is seeded at `returns[0]^2` and updated with
/// `var = lambda * var + (1 - lambda) * r^2`. Returns 0 for an empty series.
///
/// # Errors
/// `InvalidParameter` when `lambda` is outside [0, 1].
pub fn ewma_volatility(returns: &[f64], lambda: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&lambda) {
        return Err(BacktestError::invalid(format!(
            "EWMA lambda must be in [0, 1], got {lambda}"
        )));
    }

    let Some((&first, rest)) = returns.split_first() else {
        return Ok(0.0);
    };

    let variance = rest
        .iter()
        .fold(first * first, |var, &r| lambda * var + (1.0 - lambda) * r * r);

    Ok(variance.sqrt())
}

/// Parkinson high-low range volatility
///
/// `sqrt(sum(ln(H/L)^2) / (4 N ln 2))` over candles with positive high and
/// low; other candles are skipped and not counted in `N`.
pub fn parkinson_volatility(candles: &[Candle]) -> f64 {
    let (sum, count) = candles
        .iter()
        .filter(|c| c.high > 0.0 && c.low > 0.0)
        .fold((0.0, 0usize), |(sum, count), c| {
            let range = (c.high / c.low).ln();
            (sum + range * range, count + 1)
        });

    if count == 0 {
        return 0.0;
    }

    (sum / (4.0 * count as f64 * std::f64::consts::LN_2)).sqrt()
}
