//! Model capability traits and evaluation metrics

use crate::error::{Result, StudioError};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Metrics for model evaluation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Accuracy (classification)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    /// Support-weighted precision (classification)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<f64>,
    /// Support-weighted recall (classification)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recall: Option<f64>,
    /// Support-weighted F1 score (classification)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub f1_score: Option<f64>,
    /// Mean Squared Error (regression)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mse: Option<f64>,
    /// Root Mean Squared Error (regression)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rmse: Option<f64>,
    /// Mean Absolute Error (regression)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mae: Option<f64>,
    /// R-squared (regression)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r2: Option<f64>,
    /// Number of evaluated samples
    pub n_samples: usize,
}

impl ModelMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute classification metrics over the given class list
    pub fn compute_classification(y_true: &Array1<f64>, y_pred: &Array1<f64>, classes: &[f64]) -> Self {
        let mut metrics = Self::new();
        metrics.n_samples = y_true.len();
        if y_true.is_empty() {
            return metrics;
        }

        let correct = y_true
            .iter()
            .zip(y_pred.iter())
            .filter(|(t, p)| (*t - *p).abs() < 0.5)
            .count();
        metrics.accuracy = Some(correct as f64 / y_true.len() as f64);

        let cm = ConfusionMatrix::compute(y_true, y_pred, classes);
        let (precision, recall, f1) = cm.weighted_scores();
        metrics.precision = Some(precision);
        metrics.recall = Some(recall);
        metrics.f1_score = Some(f1);

        metrics
    }

    /// Compute regression metrics
    pub fn compute_regression(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Self {
        let mut metrics = Self::new();
        metrics.n_samples = y_true.len();
        if y_true.is_empty() {
            return metrics;
        }

        let n = y_true.len() as f64;
        let errors: Vec<f64> = y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(t, p)| t - p)
            .collect();

        let mse: f64 = errors.iter().map(|e| e * e).sum::<f64>() / n;
        metrics.mse = Some(mse);
        metrics.rmse = Some(mse.sqrt());
        metrics.mae = Some(errors.iter().map(|e| e.abs()).sum::<f64>() / n);

        let y_mean: f64 = y_true.iter().sum::<f64>() / n;
        let ss_tot: f64 = y_true.iter().map(|y| (y - y_mean).powi(2)).sum();
        let ss_res: f64 = errors.iter().map(|e| e.powi(2)).sum();
        metrics.r2 = if ss_tot > 0.0 {
            Some(1.0 - ss_res / ss_tot)
        } else {
            Some(0.0)
        };

        metrics
    }
}

/// Confusion matrix; rows are true classes, columns predicted classes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub classes: Vec<f64>,
    pub matrix: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    pub fn compute(y_true: &Array1<f64>, y_pred: &Array1<f64>, classes: &[f64]) -> Self {
        let k = classes.len();
        let mut matrix = vec![vec![0usize; k]; k];
        let position = |v: f64| classes.iter().position(|c| (c - v).abs() < 1e-9);

        for (t, p) in y_true.iter().zip(y_pred.iter()) {
            if let (Some(i), Some(j)) = (position(*t), position(*p)) {
                matrix[i][j] += 1;
            }
        }

        Self {
            classes: classes.to_vec(),
            matrix,
        }
    }

    /// Support-weighted precision, recall and F1
    pub fn weighted_scores(&self) -> (f64, f64, f64) {
        let k = self.classes.len();
        let total: usize = self.matrix.iter().flatten().sum();
        if total == 0 {
            return (0.0, 0.0, 0.0);
        }

        let (mut precision, mut recall, mut f1) = (0.0, 0.0, 0.0);
        for c in 0..k {
            let tp = self.matrix[c][c] as f64;
            let support: usize = self.matrix[c].iter().sum();
            let predicted: usize = (0..k).map(|r| self.matrix[r][c]).sum();

            let p = if predicted > 0 { tp / predicted as f64 } else { 0.0 };
            let r = if support > 0 { tp / support as f64 } else { 0.0 };
            let f = if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 };

            let weight = support as f64 / total as f64;
            precision += weight * p;
            recall += weight * r;
            f1 += weight * f;
        }
        (precision, recall, f1)
    }
}

/// A fitted regression model
pub trait Regressor: Send + Sync + Debug {
    /// Short algorithm name
    fn name(&self) -> &'static str;

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Learned coefficients, for models that have them
    fn coefficients(&self) -> Option<Array1<f64>> {
        None
    }
}

/// A fitted classification model; class identifiers are `f64` codes
pub trait Classifier: Send + Sync + Debug {
    /// Short algorithm name
    fn name(&self) -> &'static str;

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Sorted class identifiers seen during fit
    fn classes(&self) -> &[f64];

    /// Probability capability, when the model has one
    fn as_probabilistic(&self) -> Option<&dyn ProbabilisticClassifier> {
        None
    }
}

/// Optional probability capability of a classifier
pub trait ProbabilisticClassifier {
    /// Probabilities, one column per entry of `Classifier::classes`
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>>;
}

/// Sorted distinct class identifiers of a target vector
pub fn unique_classes(y: &Array1<f64>) -> Vec<f64> {
    let mut classes: Vec<f64> = y.iter().copied().filter(|v| v.is_finite()).collect();
    classes.sort_by(|a, b| a.total_cmp(b));
    classes.dedup();
    classes
}

/// Shared input validation for `fit`
pub(crate) fn check_fit_input(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(StudioError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(StudioError::TrainingError("No training samples".to_string()));
    }
    Ok(())
}

/// Shared input validation for `predict`
pub(crate) fn check_predict_input(x: &Array2<f64>, n_features: usize) -> Result<()> {
    if x.ncols() != n_features {
        return Err(StudioError::ShapeError {
            expected: format!("{} features", n_features),
            actual: format!("{} features", x.ncols()),
        });
    }
    Ok(())
}
