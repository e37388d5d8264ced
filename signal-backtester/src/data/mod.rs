pub mod loader;
pub mod synthetic;

pub use loader::{load_csv, load_json, parse_timestamp};
pub use synthetic::generate_synthetic_candles;

use std::path::Path;

use common::{BacktestError, Candle, Result};

/// Load candles from file, detecting format from extension
///
/// The returned sequence is ascending and free of duplicate timestamps.
pub fn load_file(path: &Path) -> Result<Vec<Candle>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let candles = match ext.as_str() {
        "csv" => load_csv(path)?,
        "json" => load_json(path)?,
        _ => {
            return Err(BacktestError::DataLoadError(format!(
                "Unsupported file format: {}",
                ext
            )))
        }
    };

    if candles.is_empty() {
        return Err(BacktestError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }

    Ok(candles)
}
