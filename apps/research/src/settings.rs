//! Pipeline Settings
//!
//! File locations and knobs for the offline pipeline, loaded from
//! environment variables with project-folder defaults.

use std::path::PathBuf;

/// Default raw history CSV location.
const DEFAULT_RAW_CSV: &str = "data/raw/market_history.csv";

/// Default processed feature CSV location.
const DEFAULT_FEATURES_CSV: &str = "data/processed/market_features.csv";

/// Default model artifact location.
const DEFAULT_MODEL_PATH: &str = "models/direction_model.json";

/// Default lookback for history download, in days.
const DEFAULT_LOOKBACK_DAYS: i64 = 3650;

/// Default target symbol for the direction label.
const DEFAULT_TARGET_SYMBOL: &str = "F.US.ES";

/// Settings shared by the pipeline binaries.
#[derive(Debug, Clone)]
pub struct ResearchSettings {
    /// Raw history CSV path.
    pub raw_csv: PathBuf,
    /// Processed feature CSV path.
    pub features_csv: PathBuf,
    /// Model artifact path.
    pub model_path: PathBuf,
    /// History lookback window, in days.
    pub lookback_days: i64,
    /// Symbol whose next-day direction is the training target.
    pub target_symbol: String,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            raw_csv: PathBuf::from(DEFAULT_RAW_CSV),
            features_csv: PathBuf::from(DEFAULT_FEATURES_CSV),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            target_symbol: DEFAULT_TARGET_SYMBOL.to_owned(),
        }
    }
}

impl ResearchSettings {
    /// Load settings from environment variables, with defaults for anything
    /// unset.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            raw_csv: std::env::var("RESEARCH_RAW_CSV").map_or(defaults.raw_csv, PathBuf::from),
            features_csv: std::env::var("RESEARCH_FEATURES_CSV")
                .map_or(defaults.features_csv, PathBuf::from),
            model_path: std::env::var("RESEARCH_MODEL_PATH")
                .map_or(defaults.model_path, PathBuf::from),
            lookback_days: std::env::var("RESEARCH_LOOKBACK_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.lookback_days),
            target_symbol: std::env::var("RESEARCH_TARGET_SYMBOL")
                .unwrap_or(defaults.target_symbol),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_stay_inside_the_project_folder() {
        let settings = ResearchSettings::default();
        assert_eq!(settings.raw_csv, PathBuf::from("data/raw/market_history.csv"));
        assert_eq!(
            settings.features_csv,
            PathBuf::from("data/processed/market_features.csv")
        );
        assert_eq!(settings.model_path, PathBuf::from("models/direction_model.json"));
        assert_eq!(settings.lookback_days, 3650);
        assert_eq!(settings.target_symbol, "F.US.ES");
    }
}
