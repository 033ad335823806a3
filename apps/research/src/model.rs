//! Baseline Direction Model
//!
//! Logistic regression over the feature table, fit with batch gradient
//! descent on standardized inputs. The target is next-day direction of the
//! configured symbol; the split is time-ordered, never shuffled, so the
//! test set is strictly later than the training set.

use std::path::Path;

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::features::FeatureTable;

/// Errors from dataset preparation and training.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The target return column is missing from the feature table.
    #[error("feature table has no column {0}")]
    MissingTargetColumn(String),

    /// Not enough rows to form both splits.
    #[error("only {rows} rows, need at least {needed} for a train/test split")]
    InsufficientRows {
        /// Labeled rows available.
        rows: usize,
        /// Minimum rows required.
        needed: usize,
    },

    /// Weights file failure.
    #[error("model persistence failed: {0}")]
    Io(#[from] std::io::Error),

    /// Weights serialization failure.
    #[error("model serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Dataset
// =============================================================================

/// A labeled design matrix built from the feature table.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Feature matrix, one row per labeled day.
    pub features: Array2<f64>,
    /// Binary targets: 1.0 when the target symbol's next-day return is
    /// positive.
    pub targets: Array1<f64>,
    /// Column names matching the feature matrix.
    pub feature_names: Vec<String>,
}

impl Dataset {
    /// Build the dataset from a feature table.
    ///
    /// The label for row `i` is derived from row `i + 1` of the target
    /// symbol's daily return; the final row has no label and is dropped.
    pub fn from_table(table: &FeatureTable, target_symbol: &str) -> Result<Self, ModelError> {
        let target_column = format!("{target_symbol}_daily_return");
        let target_index = table
            .column_index(&target_column)
            .ok_or_else(|| ModelError::MissingTargetColumn(target_column.clone()))?;

        let labeled_rows = table.rows.len().saturating_sub(1);
        if labeled_rows < 2 {
            return Err(ModelError::InsufficientRows {
                rows: labeled_rows,
                needed: 2,
            });
        }

        let width = table.columns.len();
        let mut features = Array2::zeros((labeled_rows, width));
        let mut targets = Array1::zeros(labeled_rows);
        for i in 0..labeled_rows {
            for (j, value) in table.rows[i].iter().enumerate() {
                features[[i, j]] = *value;
            }
            targets[i] = if table.rows[i + 1][target_index] > 0.0 {
                1.0
            } else {
                0.0
            };
        }

        Ok(Self {
            features,
            targets,
            feature_names: table.columns.clone(),
        })
    }

    /// Time-ordered split: the first `train_fraction` of rows train, the
    /// rest test. No shuffling.
    #[must_use]
    pub fn split(&self, train_fraction: f64) -> (DatasetView<'_>, DatasetView<'_>) {
        let n = self.features.nrows();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let cut = ((n as f64 * train_fraction) as usize).clamp(1, n - 1);
        (
            DatasetView {
                features: self.features.slice(ndarray::s![..cut, ..]),
                targets: self.targets.slice(ndarray::s![..cut]),
            },
            DatasetView {
                features: self.features.slice(ndarray::s![cut.., ..]),
                targets: self.targets.slice(ndarray::s![cut..]),
            },
        )
    }
}

/// A borrowed slice of the dataset.
#[derive(Debug)]
pub struct DatasetView<'a> {
    /// Feature rows.
    pub features: ndarray::ArrayView2<'a, f64>,
    /// Targets.
    pub targets: ndarray::ArrayView1<'a, f64>,
}

// =============================================================================
// Standardization
// =============================================================================

/// Per-column standardization fitted on the training split only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Standardizer {
    /// Column means.
    pub mean: Vec<f64>,
    /// Column standard deviations (zero replaced by one).
    pub std: Vec<f64>,
}

impl Standardizer {
    /// Fit means and deviations over the given rows.
    #[must_use]
    pub fn fit(features: &ndarray::ArrayView2<'_, f64>) -> Self {
        let n = features.nrows() as f64;
        let mean: Vec<f64> = features
            .mean_axis(Axis(0))
            .map_or_else(Vec::new, |m| m.to_vec());
        let std: Vec<f64> = features
            .axis_iter(Axis(1))
            .zip(&mean)
            .map(|(column, &mu)| {
                let variance = column.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / n;
                let std = variance.sqrt();
                if std > 0.0 { std } else { 1.0 }
            })
            .collect();
        Self { mean, std }
    }

    /// Standardize a feature matrix.
    #[must_use]
    pub fn transform(&self, features: &ndarray::ArrayView2<'_, f64>) -> Array2<f64> {
        let mut out = features.to_owned();
        for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            column.mapv_inplace(|v| (v - self.mean[j]) / self.std[j]);
        }
        out
    }
}

// =============================================================================
// Logistic Regression
// =============================================================================

/// Training configuration.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// Gradient descent step size.
    pub learning_rate: f64,
    /// Full-batch passes over the training split.
    pub epochs: usize,
    /// Fraction of rows used for training.
    pub train_fraction: f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            epochs: 500,
            train_fraction: 0.8,
        }
    }
}

/// Logistic regression classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Learned weights, one per feature column.
    pub weights: Vec<f64>,
    /// Learned intercept.
    pub bias: f64,
}

impl LogisticRegression {
    /// Fit with full-batch gradient descent.
    #[must_use]
    pub fn fit(features: &Array2<f64>, targets: &ndarray::ArrayView1<'_, f64>, config: &TrainConfig) -> Self {
        let n = features.nrows() as f64;
        let mut weights = Array1::<f64>::zeros(features.ncols());
        let mut bias = 0.0_f64;

        for _ in 0..config.epochs {
            let logits = features.dot(&weights) + bias;
            let predictions = logits.mapv(sigmoid);
            let errors = &predictions - targets;

            let weight_gradient = features.t().dot(&errors) / n;
            let bias_gradient = errors.sum() / n;

            let weight_step = weight_gradient.mapv(|g| g * config.learning_rate);
            weights = &weights - &weight_step;
            bias -= config.learning_rate * bias_gradient;
        }

        Self {
            weights: weights.to_vec(),
            bias,
        }
    }

    /// Predicted probability of an up day, per row.
    #[must_use]
    pub fn predict_proba(&self, features: &Array2<f64>) -> Array1<f64> {
        let weights = Array1::from_vec(self.weights.clone());
        (features.dot(&weights) + self.bias).mapv(sigmoid)
    }

    /// Hard class predictions at the 0.5 threshold.
    #[must_use]
    pub fn predict(&self, features: &Array2<f64>) -> Array1<f64> {
        self.predict_proba(features)
            .mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 })
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Fraction of predictions matching the targets.
#[must_use]
pub fn accuracy(predictions: &Array1<f64>, targets: &ndarray::ArrayView1<'_, f64>) -> f64 {
    let n = predictions.len();
    if n == 0 {
        return 0.0;
    }
    let hits = predictions
        .iter()
        .zip(targets.iter())
        .filter(|(p, t)| (*p - *t).abs() < 0.5)
        .count();
    hits as f64 / n as f64
}

// =============================================================================
// Training Report and Persistence
// =============================================================================

/// Outcome of one training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Target symbol the labels came from.
    pub target_symbol: String,
    /// Rows in the training split.
    pub train_rows: usize,
    /// Rows in the test split.
    pub test_rows: usize,
    /// Accuracy on the training split.
    pub train_accuracy: f64,
    /// Accuracy on the held-out, strictly later split.
    pub test_accuracy: f64,
    /// Fraction of up days over the labeled rows.
    pub up_fraction: f64,
}

/// Saved model artifact: weights plus the preprocessing needed to apply
/// them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// The fitted classifier.
    pub model: LogisticRegression,
    /// The standardizer fitted on the training split.
    pub standardizer: Standardizer,
    /// Feature column names, in weight order.
    pub feature_names: Vec<String>,
    /// Training outcome.
    pub report: TrainingReport,
}

/// Train on a dataset and produce the artifact.
pub fn train(
    dataset: &Dataset,
    target_symbol: &str,
    config: &TrainConfig,
) -> Result<ModelArtifact, ModelError> {
    let rows = dataset.features.nrows();
    if rows < 5 {
        return Err(ModelError::InsufficientRows { rows, needed: 5 });
    }

    let (train_split, test_split) = dataset.split(config.train_fraction);

    let standardizer = Standardizer::fit(&train_split.features);
    let train_x = standardizer.transform(&train_split.features);
    let test_x = standardizer.transform(&test_split.features);

    let model = LogisticRegression::fit(&train_x, &train_split.targets, config);

    let train_accuracy = accuracy(&model.predict(&train_x), &train_split.targets);
    let test_accuracy = accuracy(&model.predict(&test_x), &test_split.targets);
    let up_fraction = dataset.targets.sum() / dataset.targets.len() as f64;

    let report = TrainingReport {
        target_symbol: target_symbol.to_owned(),
        train_rows: train_split.features.nrows(),
        test_rows: test_split.features.nrows(),
        train_accuracy,
        test_accuracy,
        up_fraction,
    };

    Ok(ModelArtifact {
        model,
        standardizer,
        feature_names: dataset.feature_names.clone(),
        report,
    })
}

/// Persist the artifact as JSON, creating parent directories as needed.
pub fn save_artifact(path: impl AsRef<Path>, artifact: &ModelArtifact) -> Result<(), ModelError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(artifact)?;
    std::fs::write(path, json)?;
    Ok(())
}
