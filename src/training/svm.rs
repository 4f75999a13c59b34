//! Linear Support Vector Machine
//!
//! One-vs-rest hinge-loss classifier trained with the Pegasos stochastic
//! sub-gradient method. It produces margins, not probabilities, so it exposes
//! no probability capability.

use crate::error::{Result, StudioError};
use super::models::{check_fit_input, check_predict_input, unique_classes, Classifier};
use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// SVM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMConfig {
    /// Regularization parameter (C)
    pub c: f64,
    /// Passes over the training data
    pub epochs: usize,
    pub random_state: u64,
}

impl Default for SVMConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            epochs: 50,
            random_state: 42,
        }
    }
}

/// A single binary SVM trained for one class vs rest
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BinarySVM {
    weights: Array1<f64>,
    bias: f64,
}

/// Linear Support Vector Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearSVC {
    config: SVMConfig,
    classes: Vec<f64>,
    ovr: Vec<BinarySVM>,
    n_features: usize,
}

impl LinearSVC {
    pub fn new(config: SVMConfig) -> Self {
        Self {
            config,
            classes: Vec::new(),
            ovr: Vec::new(),
            n_features: 0,
        }
    }

    fn fit_binary(&self, x: &Array2<f64>, targets: &[f64], rng: &mut ChaCha8Rng) -> BinarySVM {
        let (n, p) = x.dim();
        let lambda = 1.0 / (self.config.c * n as f64);
        let mut w = Array1::<f64>::zeros(p);
        let mut b = 0.0;
        let mut order: Vec<usize> = (0..n).collect();
        let mut t = 0usize;

        for _ in 0..self.config.epochs {
            order.shuffle(rng);
            for &i in &order {
                t += 1;
                let eta = 1.0 / (lambda * t as f64);
                let row = x.row(i);
                let margin = targets[i] * (row.dot(&w) + b);

                // bias is treated as the weight of a constant feature
                w *= 1.0 - eta * lambda;
                b *= 1.0 - eta * lambda;
                if margin < 1.0 {
                    w.scaled_add(eta * targets[i], &row);
                    b += eta * targets[i];
                }

                // projection onto the ball of radius 1/sqrt(lambda)
                let norm = (w.dot(&w) + b * b).sqrt();
                let radius = 1.0 / lambda.sqrt();
                if norm > radius {
                    let shrink = radius / norm;
                    w *= shrink;
                    b *= shrink;
                }
            }
        }

        BinarySVM { weights: w, bias: b }
    }

    /// Margin of every sample against every class, shape (n_samples, n_classes)
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.ovr.is_empty() {
            return Err(StudioError::ModelNotFitted);
        }
        check_predict_input(x, self.n_features)?;

        let mut scores = Array2::<f64>::zeros((x.nrows(), self.ovr.len()));
        for (c, svm) in self.ovr.iter().enumerate() {
            let margins = x.dot(&svm.weights) + svm.bias;
            scores.column_mut(c).assign(&margins);
        }
        Ok(scores)
    }
}

impl Classifier for LinearSVC {
    fn name(&self) -> &'static str {
        "svm"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        self.classes = unique_classes(y);
        self.n_features = x.ncols();
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.random_state);

        self.ovr = if self.classes.len() == 2 {
            // a single separator; the rest-class is its mirror image
            let positive = self.classes[1];
            let targets: Vec<f64> = y.iter().map(|&v| if v == positive { 1.0 } else { -1.0 }).collect();
            let svm = self.fit_binary(x, &targets, &mut rng);
            let mirror = BinarySVM {
                weights: -&svm.weights,
                bias: -svm.bias,
            };
            vec![mirror, svm]
        } else {
            self.classes
                .iter()
                .map(|&class| {
                    let targets: Vec<f64> = y.iter().map(|&v| if v == class { 1.0 } else { -1.0 }).collect();
                    self.fit_binary(x, &targets, &mut rng)
                })
                .collect()
        };
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
}
