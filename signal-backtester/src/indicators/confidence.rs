//! Confidence intervals for trade statistics
//!
//! - CLT normal-approximation interval for a mean
//! - Wilson score interval for a win rate
//! - Percentile bootstrap interval for a per-trade Sharpe ratio
//!
//! The bootstrap draws from a `ChaCha8Rng` seeded per call, so identical
//! inputs and seed always give bit-identical intervals, also when many calls
//! run on different threads. ChaCha8 is a fixed algorithm, so the stream does
//! not change across rand releases or platforms.

use common::{BootstrapSettings, ConfidenceInterval, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Minimum sample size for the CLT interval to be trusted
pub const CLT_MIN_SAMPLES: usize = 50;

/// Below this many returns the bootstrap interval is unbounded
pub const BOOTSTRAP_MIN_SAMPLES: usize = 10;

const SHARPE_STD_FLOOR: f64 = 1e-10;

/// CLT interval around a sample mean
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeanEstimate {
    pub mean: f64,
    pub std_error: f64,
    pub interval: ConfidenceInterval,
    /// `n >= 50`; callers should not trust the interval otherwise
    pub reliable: bool,
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator), 0 for fewer than 2 values
pub fn sample_std(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1) as f64;
    variance.sqrt()
}

/// `mean ± z * s / sqrt(n)`; unbounded for fewer than two values
pub fn clt_mean_ci(values: &[f64], z: f64) -> MeanEstimate {
    let n = values.len();
    let m = mean(values);

    if n < 2 {
        return MeanEstimate {
            mean: m,
            std_error: f64::INFINITY,
            interval: ConfidenceInterval::unbounded(),
            reliable: false,
        };
    }

    let std_error = sample_std(values) / (n as f64).sqrt();
    MeanEstimate {
        mean: m,
        std_error,
        interval: ConfidenceInterval::new(m - z * std_error, m + z * std_error),
        reliable: n >= CLT_MIN_SAMPLES,
    }
}

/// Wilson score interval for `wins / total`, `[0, 0]` when `total` is 0
pub fn wilson_score_ci(wins: usize, total: usize, z: f64) -> ConfidenceInterval {
    if total == 0 {
        return ConfidenceInterval::zero();
    }

    let n = total as f64;
    let p = wins.min(total) as f64 / n;
    let z2 = z * z;

    let denominator = 1.0 + z2 / n;
    let center = (p + z2 / (2.0 * n)) / denominator;
    let margin = z * (p * (1.0 - p) / n + z2 / (4.0 * n * n)).sqrt() / denominator;

    ConfidenceInterval::new((center - margin).max(0.0), (center + margin).min(1.0))
}

/// Percentile bootstrap interval for `mean / std` of a return series
///
/// Each iteration resamples `n` returns with replacement. Fewer than 10
/// returns yield an unbounded interval.
///
/// # Errors
/// `InvalidParameter` for zero iterations or a confidence outside (0, 1).
pub fn bootstrap_sharpe_ci(
    returns: &[f64],
    settings: &BootstrapSettings,
) -> Result<ConfidenceInterval> {
    settings.validate()?;

    let n = returns.len();
    if n < BOOTSTRAP_MIN_SAMPLES {
        return Ok(ConfidenceInterval::unbounded());
    }

    let mut rng = ChaCha8Rng::seed_from_u64(settings.seed);
    let mut sample = vec![0.0; n];
    let mut sharpes: Vec<f64> = Vec::with_capacity(settings.iterations);

    for _ in 0..settings.iterations {
        for slot in sample.iter_mut() {
            *slot = returns[rng.gen_range(0..n)];
        }
        sharpes.push(mean(&sample) / sample_std(&sample).max(SHARPE_STD_FLOOR));
    }

    sharpes.sort_by(|a, b| a.total_cmp(b));

    let (lower_idx, upper_idx) = percentile_indices(sharpes.len(), settings.confidence);
    Ok(ConfidenceInterval::new(sharpes[lower_idx], sharpes[upper_idx]))
}

/// Indices of the two-sided percentile bounds in a sorted sample of `len`
///
/// The lower index is `floor(tail * len)`; the upper one mirrors it from the
/// top, so both tails hold the same number of values. `len` must be positive.
fn percentile_indices(len: usize, confidence: f64) -> (usize, usize) {
    let last = len - 1;
    let tail = (1.0 - confidence) / 2.0;
    let lower = ((tail * len as f64).floor() as usize).min(last / 2);
    (lower, last - lower)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn wavy_returns(n: usize) -> Vec<f64> {
        (0..n).map(|i| (i as f64 * 0.7).sin() * 3.0 + 0.4).collect()
    }

    #[test]
    fn test_sample_std() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        // population std is 2; sample variance = 32 / 7
        assert_relative_eq!(sample_std(&values), (32.0f64 / 7.0).sqrt());
        assert_eq!(sample_std(&[1.0]), 0.0);
        assert_eq!(mean(&[]), 0.0);
    }

    #[test]
    fn test_clt_small_sample_is_unbounded() {
        let estimate = clt_mean_ci(&[1.5], 1.96);
        assert!(!estimate.interval.is_bounded());
        assert!(!estimate.reliable);

        let estimate = clt_mean_ci(&[], 1.96);
        assert_eq!(estimate.interval.lower, f64::NEG_INFINITY);
        assert_eq!(estimate.interval.upper, f64::INFINITY);
    }

    #[test]
    fn test_clt_reliability_boundary() {
        let at_49 = clt_mean_ci(&wavy_returns(49), 1.96);
        let at_50 = clt_mean_ci(&wavy_returns(50), 1.96);

        assert!(!at_49.reliable);
        assert!(at_50.reliable);
        assert!(at_49.interval.is_bounded());
    }

    #[test]
    fn test_clt_interval_is_symmetric() {
        let values = [1.0, 2.0, 3.0, 4.0];
        let estimate = clt_mean_ci(&values, 2.0);
        let se = sample_std(&values) / 2.0;

        assert_relative_eq!(estimate.mean, 2.5);
        assert_relative_eq!(estimate.interval.lower, 2.5 - 2.0 * se);
        assert_relative_eq!(estimate.interval.upper, 2.5 + 2.0 * se);
    }

    #[test]
    fn test_wilson_empty() {
        assert_eq!(wilson_score_ci(0, 0, 1.96), ConfidenceInterval::zero());
    }

    #[test]
    fn test_wilson_all_wins() {
        let ci = wilson_score_ci(12, 12, 1.96);
        assert!(ci.lower > 0.0);
        assert!(ci.upper <= 1.0);
        assert_relative_eq!(ci.upper, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_wilson_known_value() {
        // 5/10 at z=1.96 -> roughly [0.2366, 0.7634]
        let ci = wilson_score_ci(5, 10, 1.96);
        assert_relative_eq!(ci.lower, 0.2366, epsilon = 1e-4);
        assert_relative_eq!(ci.upper, 0.7634, epsilon = 1e-4);
    }

    #[test]
    fn test_percentile_tails_are_symmetric() {
        assert_eq!(percentile_indices(2000, 0.95), (50, 1949));
        assert_eq!(percentile_indices(10, 0.5), (2, 7));
        assert_eq!(percentile_indices(1, 0.95), (0, 0));

        let (lower, upper) = percentile_indices(2000, 0.95);
        assert_eq!(lower, 2000 - 1 - upper);
    }

    #[test]
    fn test_bootstrap_small_sample_is_unbounded() {
        let ci = bootstrap_sharpe_ci(&wavy_returns(9), &BootstrapSettings::default()).unwrap();
        assert!(!ci.is_bounded());
    }

    #[test]
    fn test_bootstrap_is_deterministic() {
        let returns = wavy_returns(40);
        let settings = BootstrapSettings::default();

        let first = bootstrap_sharpe_ci(&returns, &settings).unwrap();
        let second = bootstrap_sharpe_ci(&returns, &settings).unwrap();

        assert_eq!(first.lower.to_bits(), second.lower.to_bits());
        assert_eq!(first.upper.to_bits(), second.upper.to_bits());
        assert!(first.lower <= first.upper);
    }

    #[test]
    fn test_bootstrap_brackets_point_estimate() {
        let returns = wavy_returns(200);
        let point = mean(&returns) / sample_std(&returns);
        let ci = bootstrap_sharpe_ci(&returns, &BootstrapSettings::default()).unwrap();

        assert!(ci.contains(point));
    }

    #[test]
    fn test_bootstrap_seed_changes_stream() {
        let returns = wavy_returns(40);
        let a = bootstrap_sharpe_ci(&returns, &BootstrapSettings::default()).unwrap();
        let b = bootstrap_sharpe_ci(
            &returns,
            &BootstrapSettings {
                seed: 7,
                ..Default::default()
            },
        )
        .unwrap();

        assert_ne!((a.lower, a.upper), (b.lower, b.upper));
    }

    #[test]
    fn test_bootstrap_rejects_bad_settings() {
        let settings = BootstrapSettings {
            iterations: 0,
            ..Default::default()
        };
        assert!(bootstrap_sharpe_ci(&wavy_returns(20), &settings).is_err());
    }
}
