//! Feature Extraction
//!
//! Rolling technical features over the raw history CSV: per symbol and day,
//! the close-to-close daily return, the 14-day rolling volatility of those
//! returns, and the 14-day momentum. Rows inside the warm-up window are
//! dropped, and only timestamps present for every symbol are kept so the
//! columns stay aligned.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::history::RawRow;

/// Rolling window length, in rows, for volatility and momentum.
pub const ROLLING_WINDOW: usize = 14;

/// Errors from the feature step.
#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    /// The raw input had no rows.
    #[error("raw history is empty")]
    EmptyInput,

    /// Not enough aligned rows to fill one rolling window.
    #[error("only {rows} aligned rows, need at least {needed}")]
    InsufficientHistory {
        /// Aligned rows available.
        rows: usize,
        /// Rows required for one feature row.
        needed: usize,
    },

    /// A feature CSV cell failed to parse.
    #[error("malformed feature CSV: {0}")]
    Malformed(String),

    /// CSV failure.
    #[error("feature CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Filesystem failure.
    #[error("feature CSV I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Column-oriented feature matrix keyed by timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    /// Row timestamps, oldest first.
    pub timestamps: Vec<DateTime<Utc>>,
    /// Column names, e.g. `F.US.ES_daily_return`.
    pub columns: Vec<String>,
    /// One row per timestamp, one value per column.
    pub rows: Vec<Vec<f64>>,
}

impl FeatureTable {
    /// Index of a named column.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of a named column.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[index]).collect())
    }
}

/// Compute the feature table from raw history rows.
///
/// Timestamps are aligned across symbols (a row is kept only when every
/// symbol has a close for it) and the first [`ROLLING_WINDOW`] aligned rows
/// are dropped as warm-up.
pub fn build_features(raw: &[RawRow]) -> Result<FeatureTable, FeatureError> {
    if raw.is_empty() {
        return Err(FeatureError::EmptyInput);
    }

    // symbol -> timestamp -> close
    let mut closes: BTreeMap<&str, BTreeMap<DateTime<Utc>, f64>> = BTreeMap::new();
    for row in raw {
        closes
            .entry(row.symbol.as_str())
            .or_default()
            .insert(row.timestamp, row.close);
    }

    // Keep timestamps present for every symbol.
    let timestamps: Vec<DateTime<Utc>> = closes
        .values()
        .next()
        .map(|series| {
            series
                .keys()
                .filter(|ts| closes.values().all(|other| other.contains_key(ts)))
                .copied()
                .collect()
        })
        .unwrap_or_default();

    let needed = ROLLING_WINDOW + 1;
    if timestamps.len() < needed {
        return Err(FeatureError::InsufficientHistory {
            rows: timestamps.len(),
            needed,
        });
    }

    let mut columns = Vec::with_capacity(closes.len() * 3);
    let mut series_features: Vec<Vec<Vec<f64>>> = Vec::with_capacity(closes.len());

    for (symbol, series) in &closes {
        let aligned: Vec<f64> = timestamps.iter().map(|ts| series[ts]).collect();
        columns.push(format!("{symbol}_daily_return"));
        columns.push(format!("{symbol}_volatility_14d"));
        columns.push(format!("{symbol}_momentum_14d"));
        series_features.push(symbol_features(&aligned));
    }

    // Drop warm-up rows with incomplete rolling windows.
    let mut rows = Vec::with_capacity(timestamps.len() - ROLLING_WINDOW);
    for i in ROLLING_WINDOW..timestamps.len() {
        let mut row = Vec::with_capacity(columns.len());
        for features in &series_features {
            row.push(features[0][i]);
            row.push(features[1][i]);
            row.push(features[2][i]);
        }
        rows.push(row);
    }

    Ok(FeatureTable {
        timestamps: timestamps[ROLLING_WINDOW..].to_vec(),
        columns,
        rows,
    })
}

/// Per-symbol feature series over the aligned closes:
/// `[daily_return, volatility_14d, momentum_14d]`, index-aligned with the
/// input. Warm-up positions hold NaN and are dropped by the caller.
fn symbol_features(closes: &[f64]) -> Vec<Vec<f64>> {
    let n = closes.len();
    let mut returns = vec![f64::NAN; n];
    for i in 1..n {
        returns[i] = closes[i] / closes[i - 1] - 1.0;
    }

    let mut volatility = vec![f64::NAN; n];
    for i in ROLLING_WINDOW..n {
        let window = &returns[i + 1 - ROLLING_WINDOW..=i];
        volatility[i] = sample_std(window);
    }

    let mut momentum = vec![f64::NAN; n];
    for i in ROLLING_WINDOW..n {
        momentum[i] = closes[i] - closes[i - ROLLING_WINDOW];
    }

    vec![returns, volatility, momentum]
}

/// Sample standard deviation (n-1 denominator).
fn sample_std(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return f64::NAN;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n as f64 - 1.0);
    variance.sqrt()
}

// =============================================================================
// Feature CSV
// =============================================================================

/// Write the feature table, creating parent directories as needed.
pub fn write_features_csv(
    path: impl AsRef<Path>,
    table: &FeatureTable,
) -> Result<(), FeatureError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = Vec::with_capacity(table.columns.len() + 1);
    header.push("timestamp".to_owned());
    header.extend(table.columns.iter().cloned());
    writer.write_record(&header)?;

    for (ts, row) in table.timestamps.iter().zip(&table.rows) {
        let mut record = Vec::with_capacity(row.len() + 1);
        record.push(ts.to_rfc3339());
        record.extend(row.iter().map(|v| v.to_string()));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a feature table written by [`write_features_csv`].
pub fn read_features_csv(path: impl AsRef<Path>) -> Result<FeatureTable, FeatureError> {
    let mut reader = csv::Reader::from_path(path)?;
    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .skip(1)
        .map(str::to_owned)
        .collect();

    let mut timestamps = Vec::new();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let Some(ts_cell) = record.get(0) else {
            return Err(FeatureError::Malformed("empty record".to_owned()));
        };
        let ts = DateTime::parse_from_rfc3339(ts_cell)
            .map_err(|e| FeatureError::Malformed(format!("bad timestamp {ts_cell}: {e}")))?
            .with_timezone(&Utc);
        let row: Vec<f64> = record
            .iter()
            .skip(1)
            .map(|cell| {
                cell.parse::<f64>()
                    .map_err(|e| FeatureError::Malformed(format!("bad value {cell}: {e}")))
            })
            .collect::<Result<_, _>>()?;
        timestamps.push(ts);
        rows.push(row);
    }

    Ok(FeatureTable {
        timestamps,
        columns,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn raw(day: u32, symbol: &str, close: f64) -> RawRow {
        RawRow {
            timestamp: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            symbol: symbol.to_owned(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        }
    }

    /// 16 days of linearly rising closes for one symbol.
    fn rising_series(symbol: &str) -> Vec<RawRow> {
        (1..=16)
            .map(|day| raw(day, symbol, 100.0 + f64::from(day)))
            .collect()
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(matches!(build_features(&[]), Err(FeatureError::EmptyInput)));
    }

    #[test]
    fn short_history_is_an_error() {
        let raw_rows: Vec<RawRow> = (1..=10).map(|d| raw(d, "F.US.ES", 100.0)).collect();
        assert!(matches!(
            build_features(&raw_rows),
            Err(FeatureError::InsufficientHistory { rows: 10, .. })
        ));
    }

    #[test]
    fn warmup_rows_are_dropped() {
        let table = build_features(&rising_series("F.US.ES")).unwrap();
        // 16 aligned rows minus a 14-row warm-up.
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.timestamps.len(), 2);
        assert_eq!(
            table.columns,
            [
                "F.US.ES_daily_return",
                "F.US.ES_volatility_14d",
                "F.US.ES_momentum_14d"
            ]
        );
    }

    #[test]
    fn feature_arithmetic_matches_hand_computation() {
        let table = build_features(&rising_series("F.US.ES")).unwrap();
        let returns = table.column("F.US.ES_daily_return").unwrap();
        let momentum = table.column("F.US.ES_momentum_14d").unwrap();

        // Day 15 close 115, day 14 close 114: return 115/114 - 1.
        assert!((returns[0] - (115.0 / 114.0 - 1.0)).abs() < 1e-12);
        // Day 15 close 115, day 1 close 101: momentum 14.
        assert!((momentum[0] - 14.0).abs() < 1e-12);
    }

    #[test]
    fn constant_prices_have_zero_volatility() {
        let raw_rows: Vec<RawRow> = (1..=20).map(|d| raw(d, "F.US.GC", 2000.0)).collect();
        let table = build_features(&raw_rows).unwrap();
        let volatility = table.column("F.US.GC_volatility_14d").unwrap();
        assert!(volatility.iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn unaligned_timestamps_are_excluded() {
        let mut raw_rows = rising_series("F.US.ES");
        let mut second = rising_series("F.US.NQ");
        // Symbol two is missing day 16: that timestamp is dropped for both,
        // leaving 15 aligned rows and exactly one feature row.
        second.pop();
        raw_rows.extend(second);

        let table = build_features(&raw_rows).unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.columns.len(), 6);
        assert_eq!(
            table.timestamps[0],
            Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn sample_std_uses_n_minus_one() {
        let std = sample_std(&[1.0, 2.0, 3.0, 4.0]);
        // Sample variance of 1..4 is 5/3.
        assert!((std - (5.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn feature_csv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed").join("market_features.csv");

        let table = build_features(&rising_series("F.US.ES")).unwrap();
        write_features_csv(&path, &table).unwrap();
        let read_back = read_features_csv(&path).unwrap();

        assert_eq!(read_back.columns, table.columns);
        assert_eq!(read_back.timestamps, table.timestamps);
        assert_eq!(read_back.rows.len(), table.rows.len());
        for (a, b) in read_back.rows[0].iter().zip(&table.rows[0]) {
            assert!((a - b).abs() < 1e-12);
        }
    }
}
