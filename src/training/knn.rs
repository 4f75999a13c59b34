//! K-Nearest Neighbors classifier

use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::models::{
    check_fit_input, check_predict_input, unique_classes, Classifier, ProbabilisticClassifier,
};
use crate::error::{Result, StudioError};

/// Weighting scheme for neighbors
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightScheme {
    /// All neighbors have equal weight
    #[default]
    Uniform,
    /// Closer neighbors have more weight (inverse distance)
    Distance,
}

/// K-Nearest Neighbors Classifier with Euclidean distance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNClassifier {
    pub n_neighbors: usize,
    pub weights: WeightScheme,
    x_train: Option<Array2<f64>>,
    y_train: Option<Array1<f64>>,
    classes: Vec<f64>,
}

impl KNNClassifier {
    pub fn new(n_neighbors: usize) -> Self {
        Self {
            n_neighbors: n_neighbors.max(1),
            weights: WeightScheme::Uniform,
            x_train: None,
            y_train: None,
            classes: Vec::new(),
        }
    }

    pub fn with_weights(mut self, weights: WeightScheme) -> Self {
        self.weights = weights;
        self
    }

    /// Weighted class votes of the k nearest training rows, normalized to sum 1
    fn vote(&self, row: ArrayView1<f64>, x_train: &Array2<f64>, y_train: &Array1<f64>) -> Vec<f64> {
        let mut distances: Vec<(f64, f64)> = x_train
            .rows()
            .into_iter()
            .zip(y_train.iter())
            .map(|(train, &label)| {
                let d: f64 = train.iter().zip(row.iter()).map(|(a, b)| (a - b).powi(2)).sum();
                (d.sqrt(), label)
            })
            .collect();

        let k = self.n_neighbors.min(distances.len());
        distances.select_nth_unstable_by(k - 1, |a, b| a.0.total_cmp(&b.0));

        let mut votes = vec![0.0; self.classes.len()];
        for &(dist, label) in &distances[..k] {
            let weight = match self.weights {
                WeightScheme::Uniform => 1.0,
                WeightScheme::Distance => 1.0 / dist.max(1e-12),
            };
            if let Some(c) = self.classes.iter().position(|&c| c == label) {
                votes[c] += weight;
            }
        }

        let total: f64 = votes.iter().sum();
        if total > 0.0 {
            votes.iter_mut().for_each(|v| *v /= total);
        }
        votes
    }
}

impl Classifier for KNNClassifier {
    fn name(&self) -> &'static str {
        "knn"
    }

    /// Stores the training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        self.classes = unique_classes(y);
        self.x_train = Some(x.clone());
        self.y_train = Some(y.clone());
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

impl ProbabilisticClassifier for KNNClassifier {
    /// Neighbor vote shares (parallelized over query rows)
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (x_train, y_train) = match (&self.x_train, &self.y_train) {
            (Some(x), Some(y)) => (x, y),
            _ => return Err(StudioError::ModelNotFitted),
        };
        check_predict_input(x, x_train.ncols())?;

        let rows: Vec<Vec<f64>> = (0..x.nrows())
            .into_par_iter()
            .map(|i| self.vote(x.row(i), x_train, y_train))
            .collect();

        let k = self.classes.len();
        let mut proba = Array2::<f64>::zeros((x.nrows(), k));
        for (i, row) in rows.into_iter().enumerate() {
            for (c, v) in row.into_iter().enumerate() {
                proba[[i, c]] = v;
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
    fn test_knn_classifier() {
        let x = array![[0.0, 0.0], [0.1, 0.1], [0.2, 0.0], [5.0, 5.0], [5.1, 5.0], [5.0, 5.2]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut model = KNNClassifier::new(3);
        model.fit(&x, &y).unwrap();

        let pred = model.predict(&array![[0.05, 0.05], [4.9, 5.1]]).unwrap();
        assert_eq!(pred.to_vec(), vec![0.0, 1.0]);

        let proba = model.predict_proba(&array![[0.05, 0.05]]).unwrap();
        assert_eq!(proba[[0, 0]], 1.0);
    }

    #[test]
    fn test_k_larger_than_training_set() {
        let x = array![[0.0], [1.0]];
        let y = array![0.0, 1.0];
        let mut model = KNNClassifier::new(10).with_weights(WeightScheme::Distance);
        model.fit(&x, &y).unwrap();

        let proba = model.predict_proba(&array![[0.1]]).unwrap();
        assert!((proba.row(0).sum() - 1.0).abs() < 1e-12);
        assert!(proba[[0, 0]] > proba[[0, 1]]);
    }

    #[test]
    fn test_unfitted() {
        let model = KNNClassifier::new(3);
        assert!(matches!(model.predict(&array![[1.0]]), Err(StudioError::ModelNotFitted)));
    }
}
