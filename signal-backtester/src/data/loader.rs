use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use common::{BacktestError, Candle, Result};
use tracing::debug;

/// Integers at or above this are taken as epoch milliseconds, below as seconds
const EPOCH_MS_THRESHOLD: i64 = 100_000_000_000;

/// Load candles from CSV file
///
/// Expected columns: timestamp, open, high, low, close, [volume]. Rows with
/// fewer than five fields are skipped.
pub fn load_csv(path: &Path) -> Result<Vec<Candle>> {
    let file = File::open(path).map_err(|e| BacktestError::DataLoadError(e.to_string()))?;
    let reader = BufReader::new(file);
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut candles = Vec::new();

    for (row, result) in csv_reader.records().enumerate() {
        let record = result.map_err(|e| BacktestError::CsvError(e.to_string()))?;
        if record.len() < 5 {
            continue;
        }

        let field = |idx: usize, name: &str| -> Result<f64> {
            record[idx].parse::<f64>().map_err(|_| {
                BacktestError::CsvError(format!("row {}: invalid {name} '{}'", row + 1, &record[idx]))
            })
        };

        let timestamp = parse_timestamp(&record[0])?;
        let volume = match record.get(5) {
            Some(v) if !v.is_empty() => field(5, "volume")?,
            _ => 0.0,
        };

        candles.push(Candle::new(
            timestamp,
            field(1, "open")?,
            field(2, "high")?,
            field(3, "low")?,
            field(4, "close")?,
            volume,
        ));
    }

    Ok(normalize(candles))
}

/// Load candles from a JSON array of `Candle` objects (timestamps in ms)
pub fn load_json(path: &Path) -> Result<Vec<Candle>> {
    let file = File::open(path).map_err(|e| BacktestError::DataLoadError(e.to_string()))?;
    let reader = BufReader::new(file);
    let candles: Vec<Candle> = serde_json::from_reader(reader)?;
    Ok(normalize(candles))
}

/// Sort ascending and drop repeated timestamps, keeping the first occurrence
fn normalize(mut candles: Vec<Candle>) -> Vec<Candle> {
    let loaded = candles.len();
    candles.sort_by_key(|c| c.timestamp);
    candles.dedup_by_key(|c| c.timestamp);

    debug!(
        loaded,
        kept = candles.len(),
        duplicates = loaded - candles.len(),
        "candles normalized"
    );

    candles
}

/// Parse timestamp from various formats into epoch milliseconds
pub fn parse_timestamp(s: &str) -> Result<i64> {
    let s = s.trim();

    if let Ok(ts) = s.parse::<i64>() {
        return Ok(if ts.abs() >= EPOCH_MS_THRESHOLD {
            ts
        } else {
            ts * 1000
        });
    }

    // Try ISO 8601 format first
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.timestamp_millis());
    }

    // Try common formats
    let formats = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M:%S",
    ];
    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.and_utc().timestamp_millis());
        }
    }

    for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Some(dt) = NaiveDate::parse_from_str(s, fmt)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
        {
            return Ok(dt.and_utc().timestamp_millis());
        }
    }

    Err(BacktestError::CsvError(format!(
        "Unable to parse timestamp: {}",
        s
    )))
}
