//! Linear and quadratic discriminant analysis

use crate::error::{Result, StudioError};
use super::linear_models::{forward_substitute, regularized_cholesky, solve_spd};
use super::models::{
    check_fit_input, check_predict_input, unique_classes, Classifier, ProbabilisticClassifier,
};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Gaussian classes sharing one covariance matrix.
///
/// Discriminant for class k: x·Σ⁻¹μ_k − ½ μ_k·Σ⁻¹μ_k + ln π_k
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearDiscriminant {
    /// Σ⁻¹μ_k per class, shape (n_features, n_classes)
    coef: Option<Array2<f64>>,
    intercept: Array1<f64>,
    /// Class means, shape (n_classes, n_features)
    means: Array2<f64>,
    classes: Vec<f64>,
    /// Added to the covariance diagonal, relative to its mean
    pub shrinkage: f64,
}

impl Default for LinearDiscriminant {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearDiscriminant {
    pub fn new() -> Self {
        Self {
            coef: None,
            intercept: Array1::zeros(0),
            means: Array2::zeros((0, 0)),
            classes: Vec::new(),
            shrinkage: 1e-6,
        }
    }

    pub fn class_means(&self) -> &Array2<f64> {
        &self.means
    }

    /// Project samples onto the discriminant directions
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let coef = self.coef.as_ref().ok_or(StudioError::ModelNotFitted)?;
        check_predict_input(x, coef.nrows())?;
        Ok(x.dot(coef) + &self.intercept)
    }
}

impl Classifier for LinearDiscriminant {
    fn name(&self) -> &'static str {
        "lda"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let (n, p) = x.dim();
        self.classes = unique_classes(y);
        let k = self.classes.len();
        if n <= k {
            return Err(StudioError::TrainingError(format!(
                "Discriminant analysis needs more samples ({}) than classes ({})",
                n, k
            )));
        }

        let mut means = Array2::<f64>::zeros((k, p));
        let mut priors = Array1::<f64>::zeros(k);
        let mut scatter = Array2::<f64>::zeros((p, p));

        for (c, idx) in class_rows(y, &self.classes).into_iter().enumerate() {
            let xc = x.select(Axis(0), &idx);
            let mean = xc
                .mean_axis(Axis(0))
                .ok_or_else(|| StudioError::TrainingError("Empty class".to_string()))?;
            let centered = &xc - &mean.view().insert_axis(Axis(0));
            scatter += &centered.t().dot(&centered);
            means.row_mut(c).assign(&mean);
            priors[c] = idx.len() as f64 / n as f64;
        }

        let mut cov = scatter / (n - k) as f64;
        let mean_diag = (cov.diag().sum() / p.max(1) as f64).max(1e-12);
        for i in 0..p {
            cov[[i, i]] += self.shrinkage * mean_diag;
        }

        let mut coef = Array2::<f64>::zeros((p, k));
        let mut intercept = Array1::<f64>::zeros(k);
        for c in 0..k {
            let mu = means.row(c).to_owned();
            let w = solve_spd(&cov, &mu)?;
            intercept[c] = -0.5 * mu.dot(&w) + priors[c].ln();
            coef.column_mut(c).assign(&w);
        }

        self.coef = Some(coef);
        self.intercept = intercept;
        self.means = means;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let scores = self.decision_function(x)?;
        Ok(scores
            .rows()
            .into_iter()
            .map(|row| {
                let best = row
                    .iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc })
                    .0;
                self.classes[best]
            })
            .collect())
    }

    fn classes(&self) -> &[f64] {
        &self.classes
    }

    fn as_probabilistic(&self) -> Option<&dyn ProbabilisticClassifier> {
        Some(self)
    }
}

impl ProbabilisticClassifier for LinearDiscriminant {
    /// Softmax of the discriminant scores (Gaussian posterior)
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let mut scores = self.decision_function(x)?;
        softmax_rows(&mut scores);
        Ok(scores)
    }
}

/// Row indices of each class, in class order
fn class_rows(y: &Array1<f64>, classes: &[f64]) -> Vec<Vec<usize>> {
    classes
        .iter()
        .map(|&class| {
            y.iter()
                .enumerate()
                .filter(|(_, &v)| v == class)
                .map(|(i, _)| i)
                .collect()
        })
        .collect()
}

/// Softmax over each row, in place
fn softmax_rows(scores: &mut Array2<f64>) {
    for mut row in scores.rows_mut() {
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
}

/// Gaussian classes, each with its own covariance matrix.
///
/// Discriminant for class k: −½ ln|Σ_k| − ½ (x−μ_k)·Σ_k⁻¹(x−μ_k) + ln π_k
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuadraticDiscriminant {
    /// Lower Cholesky factor of each class covariance
    factors: Vec<Array2<f64>>,
    /// −½ ln|Σ_k| + ln π_k
    offsets: Array1<f64>,
    means: Array2<f64>,
    classes: Vec<f64>,
    /// Added to each covariance diagonal, relative to its mean
    pub regularization: f64,
}

impl Default for QuadraticDiscriminant {
    fn default() -> Self {
        Self::new()
    }
}

impl QuadraticDiscriminant {
    pub fn new() -> Self {
        Self {
            factors: Vec::new(),
            offsets: Array1::zeros(0),
            means: Array2::zeros((0, 0)),
            classes: Vec::new(),
            regularization: 1e-4,
        }
    }

    pub fn with_regularization(mut self, regularization: f64) -> Self {
        self.regularization = regularization.max(0.0);
        self
    }

    pub fn class_means(&self) -> &Array2<f64> {
        &self.means
    }

    /// Log-posterior up to a shared constant, shape (n_samples, n_classes)
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.factors.is_empty() {
            return Err(StudioError::ModelNotFitted);
        }
        check_predict_input(x, self.means.ncols())?;

        let mut scores = Array2::<f64>::zeros((x.nrows(), self.classes.len()));
        for (c, l) in self.factors.iter().enumerate() {
            let mean = self.means.row(c);
            for (i, row) in x.rows().into_iter().enumerate() {
                let z = forward_substitute(l, &(&row - &mean));
                scores[[i, c]] = self.offsets[c] - 0.5 * z.dot(&z);
            }
        }
        Ok(scores)
    }
}

impl Classifier for QuadraticDiscriminant {
    fn name(&self) -> &'static str {
        "qda"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let (n, p) = x.dim();
        self.classes = unique_classes(y);
        let k = self.classes.len();

        let mut means = Array2::<f64>::zeros((k, p));
        let mut offsets = Array1::<f64>::zeros(k);
        let mut factors = Vec::with_capacity(k);

        for (c, idx) in class_rows(y, &self.classes).into_iter().enumerate() {
            if idx.len() < 2 {
                return Err(StudioError::TrainingError(format!(
                    "Quadratic discriminant analysis needs at least 2 samples in class {}",
                    self.classes[c]
                )));
            }
            let xc = x.select(Axis(0), &idx);
            let mean = xc
                .mean_axis(Axis(0))
                .ok_or_else(|| StudioError::TrainingError("Empty class".to_string()))?;
            let centered = &xc - &mean.view().insert_axis(Axis(0));
            let mut cov = centered.t().dot(&centered) / (idx.len() - 1) as f64;
            let mean_diag = (cov.diag().sum() / p.max(1) as f64).max(1e-12);
            for i in 0..p {
                cov[[i, i]] += self.regularization * mean_diag;
            }

            let l = regularized_cholesky(&cov)?;
            let log_det = 2.0 * l.diag().iter().map(|v| v.ln()).sum::<f64>();
            offsets[c] = -0.5 * log_det + (idx.len() as f64 / n as f64).ln();
            means.row_mut(c).assign(&mean);
            factors.push(l);
        }

        self.factors = factors;
        self.offsets = offsets;
        self.means = means;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let scores = self.decision_function(x)?;
        Ok(scores
            .rows()
            .into_iter()
            .map(|row| {
                let best = row
                    .iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc })
                    .0;
                self.classes[best]
            })
            .collect())
    }

    fn classes(&self) -> &[f64] {
        &self.classes
    }

    fn as_probabilistic(&self) -> Option<&dyn ProbabilisticClassifier> {
        Some(self)
    }
}

impl ProbabilisticClassifier for QuadraticDiscriminant {
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let mut scores = self.decision_function(x)?;
        softmax_rows(&mut scores);
        Ok(scores)
    }
}
