//! Gradient boosted trees for classification
//!
//! Binary targets boost a single logit; more classes boost one logit per
//! class under a softmax. Each round fits a second-order regression tree to
//! the log-loss residuals.

use crate::error::{Result, StudioError};
use super::models::{
    check_fit_input, check_predict_input, unique_classes, Classifier, ProbabilisticClassifier,
};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Gradient Boosting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingConfig {
    /// Number of boosting rounds
    pub n_estimators: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Row subsample ratio for each round
    pub subsample: f64,
    /// Column subsample ratio for each round
    pub colsample_bytree: f64,
    /// L2 regularization on leaf values
    pub reg_lambda: f64,
    pub random_state: u64,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            subsample: 1.0,
            colsample_bytree: 1.0,
            reg_lambda: 1.0,
            random_state: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum RegressionNode {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<RegressionNode>,
        right: Box<RegressionNode>,
    },
}

impl RegressionNode {
    fn predict(&self, row: ArrayView1<f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                RegressionNode::Leaf(value) => return *value,
                RegressionNode::Split { feature, threshold, left, right } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }
}

/// Grows one tree; leaves hold Σr / (Σh + λ) scaled by `leaf_scale`
struct TreeGrower<'a> {
    x: &'a Array2<f64>,
    residual: &'a [f64],
    hessian: &'a [f64],
    features: &'a [usize],
    config: &'a GradientBoostingConfig,
    leaf_scale: f64,
}

impl TreeGrower<'_> {
    fn sums(&self, indices: &[usize]) -> (f64, f64) {
        indices
            .iter()
            .fold((0.0, 0.0), |(g, h), &i| (g + self.residual[i], h + self.hessian[i]))
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.config.reg_lambda).max(1e-12)
    }

    fn grow(&self, indices: Vec<usize>, depth: usize) -> RegressionNode {
        let (g, h) = self.sums(&indices);
        let leaf = RegressionNode::Leaf(self.leaf_scale * g / (h + self.config.reg_lambda).max(1e-12));
        if depth >= self.config.max_depth || indices.len() < 2 * self.config.min_samples_leaf.max(1) {
            return leaf;
        }

        let Some((feature, threshold)) = self.best_split(&indices, g, h) else {
            return leaf;
        };
        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
            indices.into_iter().partition(|&i| self.x[[i, feature]] <= threshold);

        RegressionNode::Split {
            feature,
            threshold,
            left: Box::new(self.grow(left_idx, depth + 1)),
            right: Box::new(self.grow(right_idx, depth + 1)),
        }
    }

    fn best_split(&self, indices: &[usize], g_total: f64, h_total: f64) -> Option<(usize, f64)> {
        let n = indices.len();
        let parent = self.score(g_total, h_total);
        let min_leaf = self.config.min_samples_leaf.max(1);

        let mut best: Option<(usize, f64, f64)> = None;
        for &f in self.features {
            let mut order = indices.to_vec();
            order.sort_by(|&a, &b| self.x[[a, f]].total_cmp(&self.x[[b, f]]));

            let (mut g_left, mut h_left) = (0.0, 0.0);
            for pos in 0..n - 1 {
                let i = order[pos];
                g_left += self.residual[i];
                h_left += self.hessian[i];

                let current = self.x[[i, f]];
                let next = self.x[[order[pos + 1], f]];
                let n_left = pos + 1;
                if current == next || n_left < min_leaf || n - n_left < min_leaf {
                    continue;
                }
                let gain = self.score(g_left, h_left) + self.score(g_total - g_left, h_total - h_left) - parent;
                if gain > 1e-12 && best.map_or(true, |b| gain > b.2) {
                    best = Some((f, (current + next) / 2.0, gain));
                }
            }
        }
        best.map(|(f, t, _)| (f, t))
    }
}

/// Gradient Boosting Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    pub config: GradientBoostingConfig,
    /// Trees of each round, one per boosted logit
    rounds: Vec<Vec<RegressionNode>>,
    initial: Vec<f64>,
    classes: Vec<f64>,
    n_features: usize,
}

impl GradientBoostingClassifier {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            rounds: Vec::new(),
            initial: Vec::new(),
            classes: Vec::new(),
            n_features: 0,
        }
    }

    fn n_logits(&self) -> usize {
        if self.classes.len() == 2 {
            1
        } else {
            self.classes.len()
        }
    }

    /// Class probabilities from raw logits
    fn link(&self, raw: &Array2<f64>) -> Array2<f64> {
        let mut proba = Array2::<f64>::zeros((raw.nrows(), self.classes.len()));
        for (i, logits) in raw.rows().into_iter().enumerate() {
            if self.classes.len() == 2 {
                let p = 1.0 / (1.0 + (-logits[0]).exp());
                proba[[i, 0]] = 1.0 - p;
                proba[[i, 1]] = p;
            } else {
                let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                let exps: Vec<f64> = logits.iter().map(|v| (v - max).exp()).collect();
                let sum: f64 = exps.iter().sum();
                for (c, e) in exps.into_iter().enumerate() {
                    proba[[i, c]] = e / sum;
                }
            }
        }
        proba
    }

    fn sample(n: usize, ratio: f64, rng: &mut ChaCha8Rng) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..n).collect();
        if ratio < 1.0 {
            indices.shuffle(rng);
            indices.truncate(((n as f64 * ratio).ceil() as usize).clamp(1, n));
            indices.sort_unstable();
        }
        indices
    }

    fn raw_scores(&self, x: &Array2<f64>) -> Array2<f64> {
        let k = self.n_logits();
        let mut raw = Array2::<f64>::zeros((x.nrows(), k));
        for (i, row) in x.rows().into_iter().enumerate() {
            for j in 0..k {
                raw[[i, j]] = self.initial[j]
                    + self.config.learning_rate
                        * self.rounds.iter().map(|trees| trees[j].predict(row)).sum::<f64>();
            }
        }
        raw
    }
}

impl Classifier for GradientBoostingClassifier {
    fn name(&self) -> &'static str {
        "gradient_boosting"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let classes = unique_classes(y);
        if classes.len() < 2 {
            return Err(StudioError::TrainingError(
                "Gradient boosting needs at least two classes".to_string(),
            ));
        }
        let (n, p) = x.dim();
        self.classes = classes;
        self.n_features = p;
        self.rounds.clear();
        let k = self.n_logits();

        // one-hot targets over the boosted logits
        let targets = Array2::from_shape_fn((n, k), |(i, j)| {
            let class = if k == 1 { self.classes[1] } else { self.classes[j] };
            if y[i] == class { 1.0 } else { 0.0 }
        });
        self.initial = (0..k)
            .map(|j| {
                let prior = (targets.column(j).sum() / n as f64).clamp(1e-6, 1.0 - 1e-6);
                if k == 1 {
                    (prior / (1.0 - prior)).ln()
                } else {
                    prior.ln()
                }
            })
            .collect();

        let leaf_scale = if k == 1 { 1.0 } else { (k - 1) as f64 / k as f64 };
        let mut raw = Array2::from_shape_fn((n, k), |(_, j)| self.initial[j]);
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.random_state);

        for _ in 0..self.config.n_estimators {
            let proba = self.link(&raw);
            let rows = Self::sample(n, self.config.subsample, &mut rng);
            let features = Self::sample(p, self.config.colsample_bytree, &mut rng);

            let mut trees = Vec::with_capacity(k);
            for j in 0..k {
                let column = if k == 1 { 1 } else { j };
                let residual: Vec<f64> = (0..n).map(|i| targets[[i, j]] - proba[[i, column]]).collect();
                let hessian: Vec<f64> = (0..n)
                    .map(|i| proba[[i, column]] * (1.0 - proba[[i, column]]))
                    .collect();
                let grower = TreeGrower {
                    x,
                    residual: &residual,
                    hessian: &hessian,
                    features: &features,
                    config: &self.config,
                    leaf_scale,
                };
                let tree = grower.grow(rows.clone(), 0);
                for (i, row) in x.rows().into_iter().enumerate() {
                    raw[[i, j]] += self.config.learning_rate * tree.predict(row);
                }
                trees.push(tree);
            }
            self.rounds.push(trees);
        }
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(proba
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

impl ProbabilisticClassifier for GradientBoostingClassifier {
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.initial.is_empty() {
            return Err(StudioError::ModelNotFitted);
        }
        check_predict_input(x, self.n_features)?;
        Ok(self.link(&self.raw_scores(x)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn three_bands() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((30, 2), |(i, j)| match j {
            0 => (i / 10) as f64 * 5.0 + (i % 10) as f64 * 0.1,
            _ => (i % 3) as f64,
        });
        let y = Array1::from_iter((0..30).map(|i| (i / 10) as f64));
        (x, y)
    }

    #[test]
    fn test_binary_boosting() {
        let x = array![
            [1.0, 2.0], [1.5, 1.8], [1.2, 2.2], [0.8, 1.9],
            [5.0, 6.0], [5.5, 5.8], [5.2, 6.2], [4.8, 5.9],
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        let mut gb = GradientBoostingClassifier::new(GradientBoostingConfig::default());
        gb.fit(&x, &y).unwrap();

        assert_eq!(gb.predict(&x).unwrap(), y);
        let proba = gb.predict_proba(&array![[1.0, 2.0], [5.1, 6.0]]).unwrap();
        assert!(proba[[0, 0]] > 0.9);
        assert!(proba[[1, 1]] > 0.9);
        assert!((proba.row(0).sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_multiclass_boosting() {
        let (x, y) = three_bands();
        let mut gb = GradientBoostingClassifier::new(GradientBoostingConfig {
            n_estimators: 50,
            subsample: 0.8,
            ..GradientBoostingConfig::default()
        });
        gb.fit(&x, &y).unwrap();

        assert_eq!(gb.predict(&x).unwrap(), y);
        let proba = gb.predict_proba(&x).unwrap();
        assert_eq!(proba.ncols(), 3);
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_rejects_single_class_and_unfitted() {
        let mut gb = GradientBoostingClassifier::new(GradientBoostingConfig::default());
        assert!(matches!(gb.predict(&array![[1.0]]), Err(StudioError::ModelNotFitted)));
        assert!(gb.fit(&array![[1.0], [2.0]], &array![1.0, 1.0]).is_err());
    }
}
