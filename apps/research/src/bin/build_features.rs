//! Build Features Binary
//!
//! Reads the raw history CSV and writes the processed feature CSV: per
//! symbol, the daily return, 14-day rolling volatility, and 14-day
//! momentum, with warm-up rows dropped.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p research --bin build-features
//! ```
//!
//! # Environment Variables
//!
//! - `RESEARCH_RAW_CSV`: input path (default: data/raw/market_history.csv)
//! - `RESEARCH_FEATURES_CSV`: output path
//!   (default: data/processed/market_features.csv)

use anyhow::Context;

use market_stream::infrastructure::telemetry;
use research::features::{build_features, write_features_csv};
use research::history::read_raw_csv;
use research::settings::ResearchSettings;

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    telemetry::init();

    let settings = ResearchSettings::from_env();

    let raw = read_raw_csv(&settings.raw_csv)
        .with_context(|| format!("reading {}", settings.raw_csv.display()))?;
    tracing::info!(rows = raw.len(), path = %settings.raw_csv.display(), "raw history loaded");

    let table = build_features(&raw).context("computing features")?;
    write_features_csv(&settings.features_csv, &table)
        .with_context(|| format!("writing {}", settings.features_csv.display()))?;

    tracing::info!(
        rows = table.rows.len(),
        columns = table.columns.len(),
        path = %settings.features_csv.display(),
        "features saved"
    );
    Ok(())
}
