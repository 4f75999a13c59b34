//! Naive Bayes classifiers
//!
//! Gaussian for continuous features, Bernoulli for binary presence features
//! (symptom matching), Multinomial for counts.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::models::{
    check_fit_input, check_predict_input, unique_classes, Classifier, ProbabilisticClassifier,
};
use crate::error::{Result, StudioError};

/// Normalize joint log-likelihoods row-wise into probabilities (log-sum-exp)
fn normalize_log_rows(mut log_probs: Array2<f64>) -> Array2<f64> {
    for mut row in log_probs.rows_mut() {
        let max_val = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let log_sum: f64 = row.iter().map(|&v| (v - max_val).exp()).sum::<f64>().ln();
        row.mapv_inplace(|v| (v - max_val - log_sum).exp());
    }
    log_probs
}

fn argmax_classes(probs: &Array2<f64>, classes: &[f64]) -> Array1<f64> {
    probs
        .rows()
        .into_iter()
        .map(|row| {
            let best = row
                .iter()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc })
                .0;
            classes[best]
        })
        .collect()
}

/// Per-class row indices, aligned with `classes`
fn class_indices(y: &Array1<f64>, classes: &[f64]) -> Vec<Vec<usize>> {
    let mut groups = vec![Vec::new(); classes.len()];
    for (i, label) in y.iter().enumerate() {
        if let Some(c) = classes.iter().position(|c| c == label) {
            groups[c].push(i);
        }
    }
    groups
}

/// Gaussian Naive Bayes Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianNaiveBayes {
    /// Per-class feature means, shape (n_classes, n_features)
    means: Array2<f64>,
    /// Per-class feature variances, shape (n_classes, n_features)
    variances: Array2<f64>,
    log_priors: Array1<f64>,
    classes: Vec<f64>,
    /// Fraction of the largest feature variance added to every variance
    var_smoothing: f64,
}

impl Default for GaussianNaiveBayes {
    fn default() -> Self {
        Self::new()
    }
}

impl GaussianNaiveBayes {
    pub fn new() -> Self {
        Self {
            means: Array2::zeros((0, 0)),
            variances: Array2::zeros((0, 0)),
            log_priors: Array1::zeros(0),
            classes: Vec::new(),
            var_smoothing: 1e-9,
        }
    }

    /// Set variance smoothing parameter
    pub fn with_var_smoothing(mut self, smoothing: f64) -> Self {
        self.var_smoothing = smoothing;
        self
    }
}

impl Classifier for GaussianNaiveBayes {
    fn name(&self) -> &'static str {
        "gaussian_nb"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let (n, p) = x.dim();
        self.classes = unique_classes(y);
        let k = self.classes.len();

        let max_var = x.var_axis(Axis(0), 0.0).iter().cloned().fold(0.0f64, f64::max);
        let epsilon = (self.var_smoothing * max_var).max(1e-12);

        let mut means = Array2::<f64>::zeros((k, p));
        let mut variances = Array2::<f64>::zeros((k, p));
        let mut log_priors = Array1::<f64>::zeros(k);

        for (c, idx) in class_indices(y, &self.classes).iter().enumerate() {
            // Welford's single-pass mean and variance
            let mut mean = vec![0.0; p];
            let mut m2 = vec![0.0; p];
            for (count, &i) in idx.iter().enumerate() {
                for (j, &val) in x.row(i).iter().enumerate() {
                    let delta = val - mean[j];
                    mean[j] += delta / (count + 1) as f64;
                    m2[j] += delta * (val - mean[j]);
                }
            }
            for j in 0..p {
                means[[c, j]] = mean[j];
                variances[[c, j]] = m2[j] / idx.len() as f64 + epsilon;
            }
            log_priors[c] = (idx.len() as f64 / n as f64).ln();
        }

        self.means = means;
        self.variances = variances;
        self.log_priors = log_priors;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(argmax_classes(&self.predict_proba(x)?, &self.classes))
    }

    fn classes(&self) -> &[f64] {
        &self.classes
    }

    fn as_probabilistic(&self) -> Option<&dyn ProbabilisticClassifier> {
        Some(self)
    }
}

impl ProbabilisticClassifier for GaussianNaiveBayes {
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.classes.is_empty() {
            return Err(StudioError::ModelNotFitted);
        }
        check_predict_input(x, self.means.ncols())?;

        let k = self.classes.len();
        let mut log_probs = Array2::<f64>::zeros((x.nrows(), k));
        for (i, row) in x.rows().into_iter().enumerate() {
            for c in 0..k {
                let ll: f64 = row
                    .iter()
                    .zip(self.means.row(c))
                    .zip(self.variances.row(c))
                    .map(|((&xi, &mean), &var)| -0.5 * ((xi - mean).powi(2) / var + var.ln() + (2.0 * PI).ln()))
                    .sum();
                log_probs[[i, c]] = self.log_priors[c] + ll;
            }
        }
        Ok(normalize_log_rows(log_probs))
    }
}

/// Bernoulli Naive Bayes for binary features; values above `binarize` count as present
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BernoulliNaiveBayes {
    /// log P(x_j = 1 | class), shape (n_classes, n_features)
    log_prob_present: Array2<f64>,
    /// log P(x_j = 0 | class)
    log_prob_absent: Array2<f64>,
    log_priors: Array1<f64>,
    classes: Vec<f64>,
    /// Laplace smoothing
    pub alpha: f64,
    pub binarize: f64,
}

impl BernoulliNaiveBayes {
    pub fn new(alpha: f64) -> Self {
        Self {
            log_prob_present: Array2::zeros((0, 0)),
            log_prob_absent: Array2::zeros((0, 0)),
            log_priors: Array1::zeros(0),
            classes: Vec::new(),
            alpha,
            binarize: 0.0,
        }
    }

    /// P(x_j = 1 | class) for every class and feature
    pub fn feature_probabilities(&self) -> Array2<f64> {
        self.log_prob_present.mapv(f64::exp)
    }
}

impl Classifier for BernoulliNaiveBayes {
    fn name(&self) -> &'static str {
        "bernoulli_nb"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let (n, p) = x.dim();
        self.classes = unique_classes(y);
        let k = self.classes.len();

        let mut present = Array2::<f64>::zeros((k, p));
        let mut absent = Array2::<f64>::zeros((k, p));
        let mut log_priors = Array1::<f64>::zeros(k);

        for (c, idx) in class_indices(y, &self.classes).iter().enumerate() {
            let count = idx.len() as f64;
            for j in 0..p {
                let ones = idx.iter().filter(|&&i| x[[i, j]] > self.binarize).count() as f64;
                let prob = (ones + self.alpha) / (count + 2.0 * self.alpha);
                present[[c, j]] = prob.ln();
                absent[[c, j]] = (1.0 - prob).ln();
            }
            log_priors[c] = (count / n as f64).ln();
        }

        self.log_prob_present = present;
        self.log_prob_absent = absent;
        self.log_priors = log_priors;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(argmax_classes(&self.predict_proba(x)?, &self.classes))
    }

    fn classes(&self) -> &[f64] {
        &self.classes
    }

    fn as_probabilistic(&self) -> Option<&dyn ProbabilisticClassifier> {
        Some(self)
    }
}

impl ProbabilisticClassifier for BernoulliNaiveBayes {
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.classes.is_empty() {
            return Err(StudioError::ModelNotFitted);
        }
        check_predict_input(x, self.log_prob_present.ncols())?;

        let binary = x.mapv(|v| if v > self.binarize { 1.0 } else { 0.0 });
        let log_probs = binary.dot(&self.log_prob_present.t())
            + (1.0 - &binary).dot(&self.log_prob_absent.t())
            + &self.log_priors;
        Ok(normalize_log_rows(log_probs))
    }
}

/// Multinomial Naive Bayes (for count data)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultinomialNaiveBayes {
    /// log P(feature | class), shape (n_classes, n_features)
    feature_log_probs: Array2<f64>,
    log_priors: Array1<f64>,
    classes: Vec<f64>,
    /// Laplace smoothing
    pub alpha: f64,
}

impl MultinomialNaiveBayes {
    pub fn new(alpha: f64) -> Self {
        Self {
            feature_log_probs: Array2::zeros((0, 0)),
            log_priors: Array1::zeros(0),
            classes: Vec::new(),
            alpha,
        }
    }
}

impl Classifier for MultinomialNaiveBayes {
    fn name(&self) -> &'static str {
        "multinomial_nb"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        if x.iter().any(|&v| v < 0.0) {
            return Err(StudioError::TrainingError(
                "Multinomial naive Bayes requires non-negative features".to_string(),
            ));
        }
        let (n, p) = x.dim();
        self.classes = unique_classes(y);
        let k = self.classes.len();

        let mut feature_log_probs = Array2::<f64>::zeros((k, p));
        let mut log_priors = Array1::<f64>::zeros(k);

        for (c, idx) in class_indices(y, &self.classes).iter().enumerate() {
            let mut counts = Array1::<f64>::zeros(p);
            for &i in idx {
                counts += &x.row(i);
            }
            let total = counts.sum() + self.alpha * p as f64;
            for j in 0..p {
                feature_log_probs[[c, j]] = ((counts[j] + self.alpha) / total).ln();
            }
            log_priors[c] = (idx.len() as f64 / n as f64).ln();
        }

        self.feature_log_probs = feature_log_probs;
        self.log_priors = log_priors;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(argmax_classes(&self.predict_proba(x)?, &self.classes))
    }

    fn classes(&self) -> &[f64] {
        &self.classes
    }

    fn as_probabilistic(&self) -> Option<&dyn ProbabilisticClassifier> {
        Some(self)
    }
}

impl ProbabilisticClassifier for MultinomialNaiveBayes {
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.classes.is_empty() {
            return Err(StudioError::ModelNotFitted);
        }
        check_predict_input(x, self.feature_log_probs.ncols())?;

        let counts = x.mapv(|v| v.max(0.0));
        let log_probs = counts.dot(&self.feature_log_probs.t()) + &self.log_priors;
        Ok(normalize_log_rows(log_probs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn create_classification_data() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [1.0, 2.0], [1.5, 1.8], [1.2, 2.2], [0.8, 1.9],
            [5.0, 6.0], [5.5, 5.8], [5.2, 6.2], [4.8, 5.9],
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        (x, y)
    }

    fn create_binary_data() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [1.0, 1.0, 0.0], [1.0, 1.0, 0.0], [1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0], [0.0, 1.0, 1.0], [0.0, 0.0, 1.0],
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        (x, y)
    }

    #[test]
    fn test_gaussian_nb() {
        let (x, y) = create_classification_data();
        let mut model = GaussianNaiveBayes::new();
        model.fit(&x, &y).unwrap();

        assert_eq!(model.predict(&x).unwrap(), y);
        let proba = model.predict_proba(&x).unwrap();
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_bernoulli_nb() {
        let (x, y) = create_binary_data();
        let mut model = BernoulliNaiveBayes::new(1.0);
        model.fit(&x, &y).unwrap();

        let pred = model.predict(&array![[1.0, 0.0, 0.0], [0.0, 0.0, 1.0]]).unwrap();
        assert_eq!(pred.to_vec(), vec![0.0, 1.0]);

        let probs = model.feature_probabilities();
        // class 0 has feature 0 in 3 of 3 rows: (3 + 1) / (3 + 2)
        assert!((probs[[0, 0]] - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_multinomial_nb() {
        let x = array![[3.0, 0.0], [4.0, 1.0], [0.0, 5.0], [1.0, 3.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut model = MultinomialNaiveBayes::new(1.0);
        model.fit(&x, &y).unwrap();

        assert_eq!(model.predict(&x).unwrap(), y);
        assert!(model.fit(&array![[-1.0]], &array![0.0]).is_err());
    }

    #[test]
    fn test_unfitted() {
        let model = BernoulliNaiveBayes::new(1.0);
        assert!(model.predict(&array![[1.0]]).is_err());
    }
}
