//! Linear model implementations

use crate::error::{Result, StudioError};
use super::models::{
    check_fit_input, check_predict_input, unique_classes, Classifier, ProbabilisticClassifier,
    Regressor,
};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Lower Cholesky factor of a symmetric positive-definite matrix.
/// Returns `None` when a pivot is not safely positive.
fn cholesky(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    if n != a.ncols() {
        return None;
    }
    let scale = a.diag().iter().map(|v| v.abs()).fold(0.0f64, f64::max).max(1.0);

    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 1e-12 * scale {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }
    Some(l)
}

/// Forward substitution: L * y = b
pub(crate) fn forward_substitute(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * y[j];
        }
        y[i] = (b[i] - sum) / l[[i, i]];
    }
    y
}

/// Backward substitution: L^T * x = y
fn backward_substitute(l: &Array2<f64>, y: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (y[i] - sum) / l[[i, i]];
    }
    x
}

/// Cholesky factor of a symmetric positive semi-definite matrix, adding a
/// growing ridge until the factorization succeeds.
pub(crate) fn regularized_cholesky(a: &Array2<f64>) -> Result<Array2<f64>> {
    let n = a.nrows();
    let mean_diag = (a.diag().sum() / n.max(1) as f64).abs().max(1e-12);

    for jitter in [0.0, 1e-10, 1e-8, 1e-6, 1e-4] {
        let mut regularized = a.clone();
        for i in 0..n {
            regularized[[i, i]] += jitter * mean_diag;
        }
        if let Some(l) = cholesky(&regularized) {
            return Ok(l);
        }
    }

    Err(StudioError::TrainingError(
        "System is singular; cannot solve".to_string(),
    ))
}

/// Solve a symmetric positive semi-definite system through [`regularized_cholesky`]
pub(crate) fn solve_spd(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    if a.nrows() != b.len() {
        return Err(StudioError::ShapeError {
            expected: format!("{} right-hand values", a.nrows()),
            actual: format!("{}", b.len()),
        });
    }
    let l = regularized_cholesky(a)?;
    Ok(backward_substitute(&l, &forward_substitute(&l, b)))
}

/// Solve (X^T X + alpha*I) w = X^T y.
///
/// One-hot blocks make X^T X singular, which `solve_spd` absorbs with a small ridge.
pub(crate) fn solve_normal_equations(x: &Array2<f64>, y: &Array1<f64>, alpha: f64) -> Result<Array1<f64>> {
    let mut xtx = x.t().dot(x);
    let xty = x.t().dot(y);
    for i in 0..xtx.nrows() {
        xtx[[i, i]] += alpha;
    }
    solve_spd(&xtx, &xty)
}

/// Center columns, returning the centered matrix and column means
fn center(x: &Array2<f64>) -> Result<(Array2<f64>, Array1<f64>)> {
    let mean = x
        .mean_axis(Axis(0))
        .ok_or_else(|| StudioError::TrainingError("Cannot center empty matrix".to_string()))?;
    let centered = x - &mean.view().insert_axis(Axis(0));
    Ok((centered, mean))
}

/// Ordinary least squares, optionally with an L2 penalty (ridge)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    pub coefficients: Option<Array1<f64>>,
    pub intercept: f64,
    /// L2 regularization strength; 0 is plain OLS
    pub alpha: f64,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearRegression {
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: 0.0,
            alpha: 0.0,
        }
    }

    /// Ridge regression with the given penalty
    pub fn ridge(alpha: f64) -> Self {
        Self {
            alpha,
            ..Self::new()
        }
    }
}

impl Regressor for LinearRegression {
    fn name(&self) -> &'static str {
        if self.alpha > 0.0 {
            "ridge"
        } else {
            "linear"
        }
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let (xc, x_mean) = center(x)?;
        let y_mean = y.mean().unwrap_or(0.0);
        let yc = y - y_mean;

        let w = solve_normal_equations(&xc, &yc, self.alpha)?;
        self.intercept = y_mean - w.dot(&x_mean);
        self.coefficients = Some(w);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let w = self.coefficients.as_ref().ok_or(StudioError::ModelNotFitted)?;
        check_predict_input(x, w.len())?;
        Ok(x.dot(w) + self.intercept)
    }

    fn coefficients(&self) -> Option<Array1<f64>> {
        self.coefficients.clone()
    }
}

/// Soft thresholding operator used by coordinate descent
fn soft_threshold(x: f64, lambda: f64) -> f64 {
    if x > lambda {
        x - lambda
    } else if x < -lambda {
        x + lambda
    } else {
        0.0
    }
}

/// Lasso and elastic net via cyclic coordinate descent.
///
/// Objective: 1/(2n)·||y - Xw||² + alpha·l1_ratio·||w||₁ + alpha·(1-l1_ratio)/2·||w||²
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticNet {
    pub coefficients: Option<Array1<f64>>,
    pub intercept: f64,
    pub alpha: f64,
    pub l1_ratio: f64,
    pub max_iter: usize,
    pub tol: f64,
}

impl ElasticNet {
    pub fn new(alpha: f64, l1_ratio: f64) -> Self {
        Self {
            coefficients: None,
            intercept: 0.0,
            alpha,
            l1_ratio: l1_ratio.clamp(0.0, 1.0),
            max_iter: 1000,
            tol: 1e-6,
        }
    }

    pub fn lasso(alpha: f64) -> Self {
        Self::new(alpha, 1.0)
    }
}

impl Regressor for ElasticNet {
    fn name(&self) -> &'static str {
        if self.l1_ratio >= 1.0 {
            "lasso"
        } else {
            "elastic"
        }
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let n = x.nrows() as f64;
        let (xc, x_mean) = center(x)?;
        let y_mean = y.mean().unwrap_or(0.0);
        let yc = y - y_mean;

        let p = xc.ncols();
        let col_sq: Vec<f64> = (0..p).map(|j| xc.column(j).dot(&xc.column(j)) / n).collect();
        let l1 = self.alpha * self.l1_ratio;
        let l2 = self.alpha * (1.0 - self.l1_ratio);

        let mut w = Array1::<f64>::zeros(p);
        let mut residual = yc.clone();

        for _ in 0..self.max_iter {
            let mut max_delta = 0.0f64;
            for j in 0..p {
                if col_sq[j] == 0.0 {
                    continue;
                }
                let col = xc.column(j);
                let rho = col.dot(&residual) / n + col_sq[j] * w[j];
                let new_w = soft_threshold(rho, l1) / (col_sq[j] + l2);
                let delta = new_w - w[j];
                if delta != 0.0 {
                    residual.scaled_add(-delta, &col);
                    w[j] = new_w;
                    max_delta = max_delta.max(delta.abs());
                }
            }
            if max_delta < self.tol {
                break;
            }
        }

        self.intercept = y_mean - w.dot(&x_mean);
        self.coefficients = Some(w);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let w = self.coefficients.as_ref().ok_or(StudioError::ModelNotFitted)?;
        check_predict_input(x, w.len())?;
        Ok(x.dot(w) + self.intercept)
    }

    fn coefficients(&self) -> Option<Array1<f64>> {
        self.coefficients.clone()
    }
}

/// Polynomial regression on per-feature powers 1..=degree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolynomialRegression {
    pub degree: usize,
    n_features: usize,
    inner: LinearRegression,
}

impl PolynomialRegression {
    pub fn new(degree: usize) -> Self {
        Self {
            degree: degree.max(1),
            n_features: 0,
            inner: LinearRegression::new(),
        }
    }

    fn expand(&self, x: &Array2<f64>) -> Array2<f64> {
        let p = x.ncols();
        let mut out = Array2::<f64>::zeros((x.nrows(), p * self.degree));
        for d in 0..self.degree {
            for j in 0..p {
                let powered = x.column(j).mapv(|v| v.powi(d as i32 + 1));
                out.column_mut(d * p + j).assign(&powered);
            }
        }
        out
    }
}

impl Regressor for PolynomialRegression {
    fn name(&self) -> &'static str {
        "polynomial"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        self.n_features = x.ncols();
        let expanded = self.expand(x);
        self.inner.fit(&expanded, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.inner.coefficients.is_none() {
            return Err(StudioError::ModelNotFitted);
        }
        check_predict_input(x, self.n_features)?;
        self.inner.predict(&self.expand(x))
    }

    fn coefficients(&self) -> Option<Array1<f64>> {
        self.inner.coefficients.clone()
    }
}

/// Multinomial logistic regression trained with batch gradient descent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Weights, shape (n_features, n_classes)
    weights: Option<Array2<f64>>,
    bias: Option<Array1<f64>>,
    classes: Vec<f64>,
    pub learning_rate: f64,
    pub max_iter: usize,
    /// L2 penalty
    pub l2: f64,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self {
            weights: None,
            bias: None,
            classes: Vec::new(),
            learning_rate: 0.5,
            max_iter: 300,
            l2: 1e-4,
        }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    fn softmax_rows(mut logits: Array2<f64>) -> Array2<f64> {
        for mut row in logits.rows_mut() {
            let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            if sum > 0.0 {
                row.mapv_inplace(|v| v / sum);
            }
        }
        logits
    }
}

impl Classifier for LogisticRegression {
    fn name(&self) -> &'static str {
        "logistic"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        self.classes = unique_classes(y);
        let k = self.classes.len();
        let (n, p) = x.dim();

        let mut onehot = Array2::<f64>::zeros((n, k));
        for (i, label) in y.iter().enumerate() {
            if let Some(c) = self.classes.iter().position(|c| c == label) {
                onehot[[i, c]] = 1.0;
            }
        }

        let mut w = Array2::<f64>::zeros((p, k));
        let mut b = Array1::<f64>::zeros(k);
        let inv_n = 1.0 / n as f64;

        for _ in 0..self.max_iter {
            let probs = Self::softmax_rows(x.dot(&w) + &b);
            let err = probs - &onehot;
            let grad_w = x.t().dot(&err) * inv_n + &w * self.l2;
            let grad_b = err.sum_axis(Axis(0)) * inv_n;
            w.scaled_add(-self.learning_rate, &grad_w);
            b.scaled_add(-self.learning_rate, &grad_b);
        }

        self.weights = Some(w);
        self.bias = Some(b);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let probs = self.predict_proba(x)?;
        Ok(probs
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

impl ProbabilisticClassifier for LogisticRegression {
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (w, b) = match (&self.weights, &self.bias) {
            (Some(w), Some(b)) => (w, b),
            _ => return Err(StudioError::ModelNotFitted),
        };
        check_predict_input(x, w.nrows())?;
        Ok(Self::softmax_rows(x.dot(w) + b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn linear_data() -> (Array2<f64>, Array1<f64>) {
        let x = array![[1.0, 2.0], [2.0, 1.0], [3.0, 4.0], [4.0, 3.0], [5.0, 5.0], [6.0, 2.0]];
        let y = x.column(0).mapv(|v| 2.0 * v) + &x.column(1).mapv(|v| -1.0 * v) + 3.0;
        (x, y)
    }

    #[test]
    fn test_linear_regression_recovers_coefficients() {
        let (x, y) = linear_data();
        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();

        let w = model.coefficients().unwrap();
        assert!((w[0] - 2.0).abs() < 1e-6);
        assert!((w[1] + 1.0).abs() < 1e-6);
        assert!((model.intercept - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_collinear_columns_do_not_fail() {
        // two one-hot columns that always sum to one
        let x = array![[1.0, 0.0], [0.0, 1.0], [1.0, 0.0], [0.0, 1.0]];
        let y = array![1.0, 3.0, 1.0, 3.0];
        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();

        let pred = model.predict(&x).unwrap();
        assert!((pred[0] - 1.0).abs() < 1e-3);
        assert!((pred[1] - 3.0).abs() < 1e-3);
    }

    #[test]
    fn test_lasso_shrinks() {
        let (x, y) = linear_data();
        let mut lasso = ElasticNet::lasso(0.5);
        lasso.fit(&x, &y).unwrap();
        let mut ols = LinearRegression::new();
        ols.fit(&x, &y).unwrap();

        let l1_lasso: f64 = lasso.coefficients().unwrap().iter().map(|v| v.abs()).sum();
        let l1_ols: f64 = ols.coefficients().unwrap().iter().map(|v| v.abs()).sum();
        assert!(l1_lasso < l1_ols);
        assert_eq!(lasso.name(), "lasso");
        assert_eq!(ElasticNet::new(0.1, 0.5).name(), "elastic");
    }

    #[test]
    fn test_polynomial_fits_square() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [4.0]];
        let y = x.column(0).mapv(|v| v * v);
        let mut model = PolynomialRegression::new(2);
        model.fit(&x, &y).unwrap();

        let pred = model.predict(&array![[5.0]]).unwrap();
        assert!((pred[0] - 25.0).abs() < 1e-4);
    }

    #[test]
    fn test_logistic_regression_probabilities() {
        let x = array![[-2.0], [-1.5], [-1.0], [1.0], [1.5], [2.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut model = LogisticRegression::new();
        model.fit(&x, &y).unwrap();

        let proba = model.predict_proba(&x).unwrap();
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
        assert_eq!(model.predict(&x).unwrap(), y);
        assert!(model.as_probabilistic().is_some());
    }

    #[test]
    fn test_predict_before_fit() {
        let model = LinearRegression::new();
        assert!(matches!(
            model.predict(&array![[1.0]]),
            Err(StudioError::ModelNotFitted)
        ));
    }
}
