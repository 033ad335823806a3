//! Train Model Binary
//!
//! Fits the baseline next-day direction classifier on the feature CSV with
//! a time-ordered train/test split and saves the model artifact as JSON.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p research --bin train-model
//! ```
//!
//! # Environment Variables
//!
//! - `RESEARCH_FEATURES_CSV`: input path
//!   (default: data/processed/market_features.csv)
//! - `RESEARCH_TARGET_SYMBOL`: label symbol (default: F.US.ES)
//! - `RESEARCH_MODEL_PATH`: output path (default: models/direction_model.json)

use anyhow::Context;

use market_stream::infrastructure::telemetry;
use research::features::read_features_csv;
use research::model::{Dataset, TrainConfig, save_artifact, train};
use research::settings::ResearchSettings;

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    telemetry::init();

    let settings = ResearchSettings::from_env();

    let table = read_features_csv(&settings.features_csv)
        .with_context(|| format!("reading {}", settings.features_csv.display()))?;
    tracing::info!(
        rows = table.rows.len(),
        columns = table.columns.len(),
        "features loaded"
    );

    let dataset = Dataset::from_table(&table, &settings.target_symbol)
        .context("building labeled dataset")?;
    let artifact = train(&dataset, &settings.target_symbol, &TrainConfig::default())
        .context("training model")?;

    let report = &artifact.report;
    tracing::info!(
        target = %report.target_symbol,
        train_rows = report.train_rows,
        test_rows = report.test_rows,
        train_accuracy = format!("{:.4}", report.train_accuracy),
        test_accuracy = format!("{:.4}", report.test_accuracy),
        up_fraction = format!("{:.4}", report.up_fraction),
        "training complete"
    );

    save_artifact(&settings.model_path, &artifact)
        .with_context(|| format!("writing {}", settings.model_path.display()))?;
    tracing::info!(path = %settings.model_path.display(), "model saved");
    Ok(())
}
