//! Data splitting: hold-out splits and k-fold cross-validation

use crate::error::{Result, StudioError};
use super::models::{Classifier, ModelMetrics, Regressor};
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cross-validation strategy
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum CVStrategy {
    /// K-Fold cross-validation
    KFold { n_splits: usize, shuffle: bool },
    /// Stratified K-Fold (preserves class proportions)
    StratifiedKFold { n_splits: usize, shuffle: bool },
}

/// A single train/test split
#[derive(Debug, Clone)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Cross-validation splitter
#[derive(Debug, Clone)]
pub struct CrossValidator {
    strategy: CVStrategy,
    random_state: u64,
}

impl CrossValidator {
    pub fn new(strategy: CVStrategy) -> Self {
        Self {
            strategy,
            random_state: 42,
        }
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Generate train/test splits; stratification requires `y`
    pub fn split(&self, n_samples: usize, y: Option<&Array1<f64>>) -> Result<Vec<CVSplit>> {
        match self.strategy {
            CVStrategy::KFold { n_splits, shuffle } => self.k_fold_split(n_samples, n_splits, shuffle),
            CVStrategy::StratifiedKFold { n_splits, shuffle } => {
                let y = y.ok_or_else(|| {
                    StudioError::InvalidInput("Stratified splitting requires target labels".to_string())
                })?;
                self.stratified_k_fold_split(y, n_splits, shuffle)
            }
        }
    }

    fn check_splits(n_samples: usize, n_splits: usize) -> Result<()> {
        if n_splits < 2 {
            return Err(StudioError::InvalidParameter {
                name: "n_splits".to_string(),
                value: n_splits.to_string(),
                reason: "must be at least 2".to_string(),
            });
        }
        if n_samples < n_splits {
            return Err(StudioError::TrainingError(format!(
                "n_samples ({}) must be >= n_splits ({})",
                n_samples, n_splits
            )));
        }
        Ok(())
    }

    fn k_fold_split(&self, n_samples: usize, n_splits: usize, shuffle: bool) -> Result<Vec<CVSplit>> {
        Self::check_splits(n_samples, n_splits)?;

        let mut indices: Vec<usize> = (0..n_samples).collect();
        if shuffle {
            let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
            indices.shuffle(&mut rng);
        }

        let base = n_samples / n_splits;
        let remainder = n_samples % n_splits;
        let mut splits = Vec::with_capacity(n_splits);
        let mut current = 0;

        for fold_idx in 0..n_splits {
            let fold_size = if fold_idx < remainder { base + 1 } else { base };
            let test_indices = indices[current..current + fold_size].to_vec();
            let train_indices = indices[..current]
                .iter()
                .chain(indices[current + fold_size..].iter())
                .copied()
                .collect();
            splits.push(CVSplit {
                train_indices,
                test_indices,
                fold_idx,
            });
            current += fold_size;
        }

        Ok(splits)
    }

    fn stratified_k_fold_split(&self, y: &Array1<f64>, n_splits: usize, shuffle: bool) -> Result<Vec<CVSplit>> {
        Self::check_splits(y.len(), n_splits)?;

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
        // offset keeps small classes from all landing in fold 0
        let mut offset = 0;
        for mut indices in group_by_class(y).into_values() {
            if shuffle {
                indices.shuffle(&mut rng);
            }
            for (i, &idx) in indices.iter().enumerate() {
                folds[(offset + i) % n_splits].push(idx);
            }
            offset += indices.len();
        }

        Ok((0..n_splits)
            .map(|fold_idx| CVSplit {
                test_indices: folds[fold_idx].clone(),
                train_indices: folds
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != fold_idx)
                    .flat_map(|(_, f)| f.iter().copied())
                    .collect(),
                fold_idx,
            })
            .collect())
    }
}

/// Row indices per class, keyed by the class code
fn group_by_class(y: &Array1<f64>) -> BTreeMap<i64, Vec<usize>> {
    let mut groups: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (idx, &val) in y.iter().enumerate() {
        groups.entry(val.round() as i64).or_default().push(idx);
    }
    groups
}

/// Shuffled hold-out split, returned as `(train_indices, test_indices)`.
///
/// With `stratify`, every class contributes its share to the test set so
/// proportions match across both sides. Both sides always receive at least
/// one row when `n_samples >= 2`.
pub fn train_test_split(
    n_samples: usize,
    test_size: f64,
    random_state: u64,
    stratify: Option<&Array1<f64>>,
) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(StudioError::InvalidParameter {
            name: "test_size".to_string(),
            value: test_size.to_string(),
            reason: "must be strictly between 0 and 1".to_string(),
        });
    }
    if n_samples < 2 {
        return Err(StudioError::DataError(format!(
            "At least 2 rows are needed for a train/test split, got {}",
            n_samples
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(random_state);
    let n_test = ((n_samples as f64 * test_size).ceil() as usize).clamp(1, n_samples - 1);

    let mut test = Vec::with_capacity(n_test);
    let mut train = Vec::with_capacity(n_samples - n_test);

    match stratify {
        Some(y) if y.len() == n_samples => {
            for mut indices in group_by_class(y).into_values() {
                indices.shuffle(&mut rng);
                // singleton classes stay in training
                let take = if indices.len() < 2 {
                    0
                } else {
                    ((indices.len() as f64 * test_size).round() as usize).clamp(1, indices.len() - 1)
                };
                test.extend_from_slice(&indices[..take]);
                train.extend_from_slice(&indices[take..]);
            }
            if test.is_empty() {
                // every class was a singleton; fall back to a plain split
                return train_test_split(n_samples, test_size, random_state, None);
            }
            test.shuffle(&mut rng);
            train.shuffle(&mut rng);
        }
        Some(y) => {
            return Err(StudioError::ShapeError {
                expected: format!("{} labels", n_samples),
                actual: format!("{} labels", y.len()),
            });
        }
        None => {
            let mut indices: Vec<usize> = (0..n_samples).collect();
            indices.shuffle(&mut rng);
            test.extend_from_slice(&indices[..n_test]);
            train.extend_from_slice(&indices[n_test..]);
        }
    }

    Ok((train, test))
}

/// Cross-validation results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CVResults {
    /// Scores for each fold
    pub scores: Vec<f64>,
    pub mean_score: f64,
    pub std_score: f64,
    pub n_folds: usize,
}

impl CVResults {
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n_folds = scores.len();
        let mean_score = if n_folds > 0 {
            scores.iter().sum::<f64>() / n_folds as f64
        } else {
            0.0
        };
        let variance = if n_folds > 0 {
            scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n_folds as f64
        } else {
            0.0
        };

        Self {
            scores,
            mean_score,
            std_score: variance.sqrt(),
            n_folds,
        }
    }
}

/// Accuracy of a freshly built classifier on each stratified fold.
///
/// Folds are capped by the smallest class so every fold sees every class
/// during training; fewer than two usable folds yields `None`.
pub fn cross_val_accuracy<F>(
    build: F,
    x: &Array2<f64>,
    y: &Array1<f64>,
    n_splits: usize,
    random_state: u64,
) -> Result<Option<CVResults>>
where
    F: Fn() -> Box<dyn Classifier>,
{
    let smallest = group_by_class(y).values().map(Vec::len).min().unwrap_or(0);
    let n_splits = n_splits.min(smallest);
    if n_splits < 2 {
        return Ok(None);
    }

    let splits = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits, shuffle: true })
        .with_random_state(random_state)
        .split(y.len(), Some(y))?;

    let mut scores = Vec::with_capacity(splits.len());
    for split in &splits {
        let x_train = x.select(Axis(0), &split.train_indices);
        let y_train = y.select(Axis(0), &split.train_indices);
        let x_test = x.select(Axis(0), &split.test_indices);
        let y_test = y.select(Axis(0), &split.test_indices);

        let mut model = build();
        model.fit(&x_train, &y_train)?;
        let pred = model.predict(&x_test)?;
        let metrics = ModelMetrics::compute_classification(&y_test, &pred, model.classes());
        scores.push(metrics.accuracy.unwrap_or(0.0));
    }

    Ok(Some(CVResults::from_scores(scores)))
}

/// R² of a freshly built regressor on each shuffled k-fold split.
///
/// Folds are capped by the sample count; fewer than two usable folds yields `None`.
pub fn cross_val_r2<F>(
    build: F,
    x: &Array2<f64>,
    y: &Array1<f64>,
    n_splits: usize,
    random_state: u64,
) -> Result<Option<CVResults>>
where
    F: Fn() -> Box<dyn Regressor>,
{
    let n_splits = n_splits.min(y.len());
    if n_splits < 2 {
        return Ok(None);
    }

    let splits = CrossValidator::new(CVStrategy::KFold { n_splits, shuffle: true })
        .with_random_state(random_state)
        .split(y.len(), None)?;

    let mut scores = Vec::with_capacity(splits.len());
    for split in &splits {
        let x_train = x.select(Axis(0), &split.train_indices);
        let y_train = y.select(Axis(0), &split.train_indices);
        let x_test = x.select(Axis(0), &split.test_indices);
        let y_test = y.select(Axis(0), &split.test_indices);

        let mut model = build();
        model.fit(&x_train, &y_train)?;
        let pred = model.predict(&x_test)?;
        scores.push(ModelMetrics::compute_regression(&y_test, &pred).r2.unwrap_or(0.0));
    }

    Ok(Some(CVResults::from_scores(scores)))
}
