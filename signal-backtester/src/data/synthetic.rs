use common::Candle;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// 2024-01-01T00:00:00Z
const SYNTHETIC_START_MS: i64 = 1_704_067_200_000;
const HOUR_MS: i64 = 3_600_000;

/// Generate a reproducible hourly random walk
///
/// The same `seed` always yields the same series. OHLC values are consistent
/// (`low <= open, close <= high`) and prices stay positive.
pub fn generate_synthetic_candles(n: usize, initial_price: f64, seed: u64) -> Vec<Candle> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut candles = Vec::with_capacity(n);

    let mut price = initial_price.max(f64::MIN_POSITIVE);
    let hourly_volatility = 0.01;
    let drift = 0.0001;

    for i in 0..n {
        let random_return: f64 = rng.gen_range(-1.0..1.0);
        let hourly_return = drift + hourly_volatility * random_return;

        let open = price;
        let close = price * (1.0 + hourly_return);

        let wick = price * rng.gen_range(0.0..0.005);
        let high = open.max(close) + wick;
        let low = (open.min(close) - wick).max(open.min(close) * 0.5);

        // Volume rises with the size of the move
        let base_volume = 1_000_000.0;
        let volume = base_volume * (1.0 + hourly_return.abs() * 10.0) * rng.gen_range(0.8..1.2);

        candles.push(Candle::new(
            SYNTHETIC_START_MS + i as i64 * HOUR_MS,
            open,
            high,
            low,
            close,
            volume,
        ));

        price = close;
    }

    candles
}
