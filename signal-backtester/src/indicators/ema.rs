use common::{BacktestError, Result};

/// Calculate Exponential Moving Average
///
/// Seeded with the first value (`ema[0] = values[0]`) and smoothed with
/// `alpha = 2 / (period + 1)`. The output has the same length as the input.
///
/// # Errors
/// `InvalidParameter` when `period` is zero.
pub fn compute_ema(values: &[f64], period: usize) -> Result<Vec<f64>> {
    if period == 0 {
        return Err(BacktestError::invalid("EMA period must be at least 1"));
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut ema = Vec::with_capacity(values.len());

    for &value in values {
        let next = match ema.last() {
            Some(&prev) => alpha * value + (1.0 - alpha) * prev,
            None => value,
        };
        ema.push(next);
    }

    Ok(ema)
}

/// Last EMA value of the series, if any
pub fn last_ema(values: &[f64], period: usize) -> Result<Option<f64>> {
    Ok(compute_ema(values, period)?.last().copied())
}
