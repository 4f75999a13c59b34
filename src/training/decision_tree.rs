//! Decision tree classifier

use crate::error::{Result, StudioError};
use super::models::{
    check_fit_input, check_predict_input, unique_classes, Classifier, ProbabilisticClassifier,
};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node holding the class distribution of its samples
    Leaf {
        distribution: Vec<f64>,
        n_samples: usize,
    },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    #[default]
    Gini,
    Entropy,
}

impl Criterion {
    fn impurity(&self, counts: &[usize], total: usize) -> f64 {
        if total == 0 {
            return 0.0;
        }
        let n = total as f64;
        match self {
            Criterion::Gini => 1.0 - counts.iter().map(|&c| (c as f64 / n).powi(2)).sum::<f64>(),
            Criterion::Entropy => -counts
                .iter()
                .filter(|&&c| c > 0)
                .map(|&c| {
                    let p = c as f64 / n;
                    p * p.ln()
                })
                .sum::<f64>(),
        }
    }
}

/// Decision tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features sampled per split; `None` considers all
    pub max_features: Option<usize>,
    pub criterion: Criterion,
    pub random_state: u64,
    n_features: usize,
    classes: Vec<f64>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTree {
    pub fn new() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion: Criterion::Gini,
            random_state: 42,
            n_features: 0,
            classes: Vec::new(),
        }
    }

    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Fit against an externally fixed class list (used by forests so every
    /// tree reports distributions over the same classes)
    pub(crate) fn fit_with_classes(&mut self, x: &Array2<f64>, y: &Array1<f64>, classes: Vec<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        self.n_features = x.ncols();
        self.classes = classes;

        let labels: Vec<usize> = y
            .iter()
            .map(|v| {
                self.classes
                    .iter()
                    .position(|c| c == v)
                    .ok_or_else(|| StudioError::TrainingError(format!("Label {} outside class list", v)))
            })
            .collect::<Result<_>>()?;

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let indices: Vec<usize> = (0..x.nrows()).collect();
        self.root = Some(self.build(x, &labels, indices, 0, &mut rng));
        Ok(())
    }

    fn class_counts(&self, labels: &[usize], indices: &[usize]) -> Vec<usize> {
        let mut counts = vec![0usize; self.classes.len()];
        for &i in indices {
            counts[labels[i]] += 1;
        }
        counts
    }

    fn leaf(&self, counts: &[usize], n_samples: usize) -> TreeNode {
        let distribution = counts
            .iter()
            .map(|&c| if n_samples > 0 { c as f64 / n_samples as f64 } else { 0.0 })
            .collect();
        TreeNode::Leaf { distribution, n_samples }
    }

    fn build(
        &self,
        x: &Array2<f64>,
        labels: &[usize],
        indices: Vec<usize>,
        depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n_samples = indices.len();
        let counts = self.class_counts(labels, &indices);
        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;

        if pure
            || n_samples < self.min_samples_split
            || self.max_depth.is_some_and(|d| depth >= d)
        {
            return self.leaf(&counts, n_samples);
        }

        let Some((feature_idx, threshold)) = self.best_split(x, labels, &indices, &counts, rng) else {
            return self.leaf(&counts, n_samples);
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
            indices.into_iter().partition(|&i| x[[i, feature_idx]] <= threshold);

        let left = Box::new(self.build(x, labels, left_idx, depth + 1, rng));
        let right = Box::new(self.build(x, labels, right_idx, depth + 1, rng));
        TreeNode::Split {
            feature_idx,
            threshold,
            left,
            right,
            n_samples,
        }
    }

    /// Best (feature, threshold) by impurity decrease, scanning sorted values once per feature
    fn best_split(
        &self,
        x: &Array2<f64>,
        labels: &[usize],
        indices: &[usize],
        parent_counts: &[usize],
        rng: &mut ChaCha8Rng,
    ) -> Option<(usize, f64)> {
        let n = indices.len();
        let parent_impurity = self.criterion.impurity(parent_counts, n);

        let mut features: Vec<usize> = (0..x.ncols()).collect();
        if let Some(m) = self.max_features {
            features.shuffle(rng);
            features.truncate(m.clamp(1, x.ncols()));
        }

        let mut best: Option<(usize, f64, f64)> = None;
        for &f in &features {
            let mut order: Vec<usize> = indices.to_vec();
            order.sort_by(|&a, &b| x[[a, f]].total_cmp(&x[[b, f]]));

            let mut left = vec![0usize; self.classes.len()];
            let mut right = parent_counts.to_vec();

            for pos in 0..n - 1 {
                let label = labels[order[pos]];
                left[label] += 1;
                right[label] -= 1;

                let current = x[[order[pos], f]];
                let next = x[[order[pos + 1], f]];
                if current == next {
                    continue;
                }
                let n_left = pos + 1;
                let n_right = n - n_left;
                if n_left < self.min_samples_leaf || n_right < self.min_samples_leaf {
                    continue;
                }

                let weighted = (n_left as f64 * self.criterion.impurity(&left, n_left)
                    + n_right as f64 * self.criterion.impurity(&right, n_right))
                    / n as f64;
                let gain = parent_impurity - weighted;
                if gain > 1e-12 && best.map_or(true, |b| gain > b.2) {
                    best = Some((f, (current + next) / 2.0, gain));
                }
            }
        }

        best.map(|(f, t, _)| (f, t))
    }

    fn leaf_distribution(&self, row: ArrayView1<f64>) -> Option<&[f64]> {
        let mut node = self.root.as_ref()?;
        loop {
            match node {
                TreeNode::Leaf { distribution, .. } => return Some(distribution),
                TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                    node = if row[*feature_idx] <= *threshold { left } else { right };
                }
            }
        }
    }

    /// Depth of the fitted tree
    pub fn depth(&self) -> usize {
        fn walk(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + walk(left).max(walk(right)),
            }
        }
        self.root.as_ref().map(walk).unwrap_or(0)
    }
}

impl Classifier for DecisionTree {
    fn name(&self) -> &'static str {
        "decision_tree"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let classes = unique_classes(y);
        self.fit_with_classes(x, y, classes)
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

impl ProbabilisticClassifier for DecisionTree {
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.root.is_none() {
            return Err(StudioError::ModelNotFitted);
        }
        check_predict_input(x, self.n_features)?;

        let mut proba = Array2::<f64>::zeros((x.nrows(), self.classes.len()));
        for (i, row) in x.rows().into_iter().enumerate() {
            let dist = self.leaf_distribution(row).ok_or(StudioError::ModelNotFitted)?;
            for (c, &p) in dist.iter().enumerate() {
                proba[[i, c]] = p;
            }
        }
        Ok(proba)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_fits_xor_like_data() {
        let x = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0], [0.1, 0.9], [0.9, 0.1]];
        let y = array![0.0, 1.0, 1.0, 0.0, 1.0, 1.0];
        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();

        assert_eq!(tree.predict(&x).unwrap(), y);
        assert!(tree.depth() >= 2);
    }

    #[test]
    fn test_max_depth_limits_tree() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0.0, 1.0, 0.0, 1.0];
        let mut tree = DecisionTree::new().with_max_depth(Some(1));
        tree.fit(&x, &y).unwrap();

        assert!(tree.depth() <= 1);
        let proba = tree.predict_proba(&x).unwrap();
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_entropy_criterion() {
        let x = array![[0.0], [0.2], [0.8], [1.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut tree = DecisionTree::new().with_criterion(Criterion::Entropy);
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.predict(&array![[0.1], [0.9]]).unwrap().to_vec(), vec![0.0, 1.0]);
    }
}
