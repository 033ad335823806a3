#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp))]

//! Research - Offline Pipeline
//!
//! Independent steps over files on disk, each invoked standalone:
//!
//! 1. `fetch-history` downloads daily bars per contract into a raw CSV.
//! 2. `build-features` computes rolling technical features from it.
//! 3. `train-model` fits a baseline next-day direction classifier.
//!
//! There is no shared runtime and no scheduler; each step reads what the
//! previous one wrote.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Historical bar retrieval and the raw CSV.
pub mod history;

/// Rolling feature computation and the feature CSV.
pub mod features;

/// Baseline direction classifier.
pub mod model;

/// Environment-driven pipeline settings.
pub mod settings;

pub use features::{FeatureError, FeatureTable, ROLLING_WINDOW, build_features};
pub use history::{Bar, HistoryClient, HistoryError, RawRow};
pub use model::{
    Dataset, LogisticRegression, ModelArtifact, ModelError, Standardizer, TrainConfig,
    TrainingReport, accuracy, train,
};
pub use settings::ResearchSettings;
