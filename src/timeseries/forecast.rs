//! Forecasting models: autoregression on a differenced series (optionally
//! with seasonal lags), and Holt's linear trend smoothing. All report 95%
//! prediction intervals.

use crate::error::{Result, StudioError};
use crate::training::linear_models::solve_normal_equations;
use super::transforms::{Differencer, SeasonalDifferencer};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// z-value of a two-sided 95% interval
const Z_95: f64 = 1.959964;

/// Point forecasts with interval bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast {
    pub values: Vec<f64>,
    pub lower_bound: Vec<f64>,
    pub upper_bound: Vec<f64>,
    pub periods: usize,
}

impl Forecast {
    fn from_variances(values: Vec<f64>, variances: &[f64]) -> Self {
        let (lower_bound, upper_bound) = values
            .iter()
            .zip(variances)
            .map(|(&v, &var)| {
                let half = Z_95 * var.max(0.0).sqrt();
                (v - half, v + half)
            })
            .unzip();
        Self {
            periods: values.len(),
            values,
            lower_bound,
            upper_bound,
        }
    }
}

/// Hold-out error of a forecast
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastMetrics {
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    /// Percent error over the non-zero actuals; absent when all are zero
    pub mape: Option<f64>,
}

impl ForecastMetrics {
    pub fn compute(actual: &[f64], predicted: &[f64]) -> Self {
        let n = actual.len().min(predicted.len()).max(1) as f64;
        let pairs = || actual.iter().zip(predicted);
        let mse = pairs().map(|(a, p)| (a - p).powi(2)).sum::<f64>() / n;
        let mae = pairs().map(|(a, p)| (a - p).abs()).sum::<f64>() / n;

        let pct: Vec<f64> = pairs()
            .filter(|(a, _)| a.abs() > f64::EPSILON)
            .map(|(a, p)| ((a - p) / a).abs())
            .collect();
        let mape = if pct.is_empty() {
            None
        } else {
            Some(pct.iter().sum::<f64>() / pct.len() as f64 * 100.0)
        };

        Self {
            mse,
            rmse: mse.sqrt(),
            mae,
            mape,
        }
    }
}

/// A model fitted on one series that extrapolates it forward
pub trait Forecaster: Send + Sync + Debug {
    fn name(&self) -> String;

    fn fit(&mut self, series: &Array1<f64>) -> Result<()>;

    /// Forecast the next `steps` values after the fitted series
    fn forecast(&self, steps: usize) -> Result<Forecast>;

    /// Akaike information criterion of the fit, when defined
    fn aic(&self) -> Option<f64> {
        None
    }

    /// In-sample one-step residuals
    fn residuals(&self) -> &[f64];
}

// ═══════════════════════════════════════════════════════════════════════════
//  Least-squares autoregression on an arbitrary lag set
// ═══════════════════════════════════════════════════════════════════════════

/// Intercept plus one coefficient per lag, fitted by least squares
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LagRegression {
    /// Sorted, distinct, all positive
    lags: Vec<usize>,
    /// Intercept followed by one coefficient per lag
    coef: Option<Array1<f64>>,
    /// Last `max_lag` values of the fitted series, oldest first
    window: Vec<f64>,
    sigma2: f64,
    residuals: Vec<f64>,
}

impl LagRegression {
    fn new(mut lags: Vec<usize>) -> Self {
        lags.retain(|&l| l > 0);
        lags.sort_unstable();
        lags.dedup();
        Self {
            lags,
            ..Self::default()
        }
    }

    fn max_lag(&self) -> usize {
        self.lags.last().copied().unwrap_or(0)
    }

    fn fit(&mut self, z: &Array1<f64>) -> Result<()> {
        let n = z.len();
        let max_lag = self.max_lag();
        if n < max_lag + 2 {
            return Err(StudioError::TrainingError(format!(
                "Need at least {} observations after differencing for lags up to {}, got {}",
                max_lag + 2,
                max_lag,
                n
            )));
        }

        let rows = n - max_lag;
        let mut x = Array2::<f64>::ones((rows, self.lags.len() + 1));
        let mut y = Array1::<f64>::zeros(rows);
        for t in max_lag..n {
            let r = t - max_lag;
            for (j, &lag) in self.lags.iter().enumerate() {
                x[[r, j + 1]] = z[t - lag];
            }
            y[r] = z[t];
        }

        let coef = solve_normal_equations(&x, &y, 1e-8)?;
        let fitted = x.dot(&coef);
        self.residuals = y.iter().zip(fitted.iter()).map(|(a, f)| a - f).collect();
        let dof = rows.saturating_sub(self.lags.len() + 1).max(1);
        self.sigma2 = self.residuals.iter().map(|r| r * r).sum::<f64>() / dof as f64;
        self.window = z.iter().skip(n - max_lag).copied().collect();
        self.coef = Some(coef);
        Ok(())
    }

    fn forecast(&self, steps: usize) -> Result<Array1<f64>> {
        let coef = self.coef.as_ref().ok_or(StudioError::ModelNotFitted)?;
        let mut history = self.window.clone();
        let mut out = Array1::<f64>::zeros(steps);
        for h in 0..steps {
            let len = history.len();
            let next = coef[0]
                + self
                    .lags
                    .iter()
                    .enumerate()
                    .map(|(j, &lag)| coef[j + 1] * history[len - lag])
                    .sum::<f64>();
            out[h] = next;
            history.push(next);
        }
        Ok(out)
    }

    /// MA(∞) weights of the stationary part
    fn psi_weights(&self, steps: usize) -> Result<Vec<f64>> {
        let coef = self.coef.as_ref().ok_or(StudioError::ModelNotFitted)?;
        let mut psi = vec![0.0; steps];
        if steps == 0 {
            return Ok(psi);
        }
        psi[0] = 1.0;
        for j in 1..steps {
            psi[j] = self
                .lags
                .iter()
                .enumerate()
                .filter(|(_, &lag)| lag <= j)
                .map(|(i, &lag)| coef[i + 1] * psi[j - lag])
                .sum();
        }
        Ok(psi)
    }

    fn aic(&self) -> Option<f64> {
        let n = self.residuals.len();
        if n == 0 {
            return None;
        }
        let sse: f64 = self.residuals.iter().map(|r| r * r).sum();
        let k = (self.lags.len() + 2) as f64;
        Some(n as f64 * (sse.max(1e-300) / n as f64).ln() + 2.0 * k)
    }
}

/// Accumulate psi weights through `rounds` of integration at `lag`
fn integrate_weights(psi: &mut [f64], rounds: usize, lag: usize) {
    for _ in 0..rounds {
        for j in lag..psi.len() {
            psi[j] += psi[j - lag];
        }
    }
}

/// Forecast variance at every horizon from the psi weights
fn horizon_variances(psi: &[f64], sigma2: f64) -> Vec<f64> {
    let mut acc = 0.0;
    psi.iter()
        .map(|w| {
            acc += w * w;
            sigma2 * acc
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════
//  AR(p) on a d-times differenced series
// ═══════════════════════════════════════════════════════════════════════════

/// Autoregression of order `p` fitted by least squares on the series after
/// `d` rounds of differencing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArimaModel {
    pub p: usize,
    pub d: usize,
    differencer: Differencer,
    ar: LagRegression,
}

impl ArimaModel {
    pub fn new(p: usize, d: usize) -> Self {
        Self {
            p,
            d,
            differencer: Differencer::new(d),
            ar: LagRegression::new((1..=p).collect()),
        }
    }

    /// Intercept followed by the `p` lag coefficients
    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.ar.coef.as_ref()
    }
}

impl Forecaster for ArimaModel {
    fn name(&self) -> String {
        format!("ARIMA({}, {}, 0)", self.p, self.d)
    }

    fn fit(&mut self, series: &Array1<f64>) -> Result<()> {
        let z = self.differencer.transform(series)?;
        self.ar.fit(&z)
    }

    fn forecast(&self, steps: usize) -> Result<Forecast> {
        let diffs = self.ar.forecast(steps)?;
        let values = self.differencer.integrate(&diffs)?.to_vec();
        let mut psi = self.ar.psi_weights(steps)?;
        integrate_weights(&mut psi, self.d, 1);
        Ok(Forecast::from_variances(values, &horizon_variances(&psi, self.ar.sigma2)))
    }

    fn aic(&self) -> Option<f64> {
        self.ar.aic()
    }

    fn residuals(&self) -> &[f64] {
        &self.ar.residuals
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Seasonal AR on a seasonally and regularly differenced series
// ═══════════════════════════════════════════════════════════════════════════

/// SARIMA without moving-average terms.
///
/// The series is differenced `seasonal_d` times at lag `period`, then `d`
/// times at lag 1. The result is regressed on lags `1..=p` and on the
/// seasonal lags `period, 2 * period, ..., seasonal_p * period`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SarimaModel {
    pub p: usize,
    pub d: usize,
    pub seasonal_p: usize,
    pub seasonal_d: usize,
    pub period: usize,
    seasonal: SeasonalDifferencer,
    differencer: Differencer,
    ar: LagRegression,
}

impl SarimaModel {
    pub fn new((p, d): (usize, usize), (seasonal_p, seasonal_d, period): (usize, usize, usize)) -> Self {
        let lags = (1..=p).chain((1..=seasonal_p).map(|k| k * period)).collect();
        Self {
            p,
            d,
            seasonal_p,
            seasonal_d,
            period,
            seasonal: SeasonalDifferencer::new(seasonal_d, period),
            differencer: Differencer::new(d),
            ar: LagRegression::new(lags),
        }
    }

    /// Lags the regression uses, sorted
    pub fn lags(&self) -> &[usize] {
        &self.ar.lags
    }
}

impl Forecaster for SarimaModel {
    fn name(&self) -> String {
        format!(
            "SARIMA({}, {}, 0)x({}, {}, 0, {})",
            self.p, self.d, self.seasonal_p, self.seasonal_d, self.period
        )
    }

    fn fit(&mut self, series: &Array1<f64>) -> Result<()> {
        if self.period < 2 {
            return Err(StudioError::InvalidParameter {
                name: "period".to_string(),
                value: self.period.to_string(),
                reason: "seasonal period must be at least 2".to_string(),
            });
        }
        let w = self.seasonal.transform(series)?;
        let z = self.differencer.transform(&w)?;
        self.ar.fit(&z)
    }

    fn forecast(&self, steps: usize) -> Result<Forecast> {
        let diffs = self.ar.forecast(steps)?;
        let seasonal_diffs = self.differencer.integrate(&diffs)?;
        let values = self.seasonal.integrate(&seasonal_diffs)?.to_vec();

        let mut psi = self.ar.psi_weights(steps)?;
        integrate_weights(&mut psi, self.d, 1);
        integrate_weights(&mut psi, self.seasonal_d, self.period);
        Ok(Forecast::from_variances(values, &horizon_variances(&psi, self.ar.sigma2)))
    }

    fn aic(&self) -> Option<f64> {
        self.ar.aic()
    }

    fn residuals(&self) -> &[f64] {
        &self.ar.residuals
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Holt's linear trend (double exponential smoothing)
// ═══════════════════════════════════════════════════════════════════════════

/// Double exponential smoothing. Unset smoothing factors are chosen by a
/// grid search minimizing the one-step squared error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoltSmoother {
    pub alpha: Option<f64>,
    pub beta: Option<f64>,
    fitted_alpha: f64,
    fitted_beta: f64,
    level: f64,
    trend: f64,
    sigma2: f64,
    residuals: Vec<f64>,
    is_fitted: bool,
}

impl Default for HoltSmoother {
    fn default() -> Self {
        Self::new()
    }
}

impl HoltSmoother {
    pub fn new() -> Self {
        Self {
            alpha: None,
            beta: None,
            fitted_alpha: 0.0,
            fitted_beta: 0.0,
            level: 0.0,
            trend: 0.0,
            sigma2: 0.0,
            residuals: Vec::new(),
            is_fitted: false,
        }
    }

    pub fn with_smoothing(mut self, alpha: f64, beta: f64) -> Self {
        self.alpha = Some(alpha);
        self.beta = Some(beta);
        self
    }

    /// Smoothing factors actually used by the fit
    pub fn smoothing(&self) -> (f64, f64) {
        (self.fitted_alpha, self.fitted_beta)
    }

    /// Run the recursions; returns (level, trend, one-step residuals)
    fn smooth(series: &Array1<f64>, alpha: f64, beta: f64) -> (f64, f64, Vec<f64>) {
        let mut level = series[0];
        let mut trend = series[1] - series[0];
        let mut residuals = Vec::with_capacity(series.len() - 1);
        for &y in series.iter().skip(1) {
            let predicted = level + trend;
            residuals.push(y - predicted);
            let prev_level = level;
            level = alpha * y + (1.0 - alpha) * predicted;
            trend = beta * (level - prev_level) + (1.0 - beta) * trend;
        }
        (level, trend, residuals)
    }
}

impl Forecaster for HoltSmoother {
    fn name(&self) -> String {
        "Holt".to_string()
    }

    fn fit(&mut self, series: &Array1<f64>) -> Result<()> {
        if series.len() < 3 {
            return Err(StudioError::TrainingError(format!(
                "Holt smoothing needs at least 3 observations, got {}",
                series.len()
            )));
        }

        let grid: Vec<f64> = (1..10).map(|i| i as f64 / 10.0).collect();
        let alphas = self.alpha.map(|a| vec![a]).unwrap_or_else(|| grid.clone());
        let betas = self.beta.map(|b| vec![b]).unwrap_or_else(|| grid.clone());

        let mut best: Option<(f64, f64, f64)> = None;
        for &a in &alphas {
            for &b in &betas {
                let (_, _, res) = Self::smooth(series, a, b);
                let sse: f64 = res.iter().map(|r| r * r).sum();
                if best.map_or(true, |(s, _, _)| sse < s) {
                    best = Some((sse, a, b));
                }
            }
        }
        let (sse, alpha, beta) = best.ok_or_else(|| {
            StudioError::TrainingError("No smoothing parameters to evaluate".to_string())
        })?;

        let (level, trend, residuals) = Self::smooth(series, alpha, beta);
        self.fitted_alpha = alpha;
        self.fitted_beta = beta;
        self.level = level;
        self.trend = trend;
        self.sigma2 = sse / residuals.len().saturating_sub(2).max(1) as f64;
        self.residuals = residuals;
        self.is_fitted = true;
        Ok(())
    }

    fn forecast(&self, steps: usize) -> Result<Forecast> {
        if !self.is_fitted {
            return Err(StudioError::ModelNotFitted);
        }

        let values: Vec<f64> = (1..=steps).map(|h| self.level + h as f64 * self.trend).collect();
        let (a, b) = (self.fitted_alpha, self.fitted_beta);
        let mut acc = 1.0;
        let variances: Vec<f64> = (0..steps)
            .map(|j| {
                if j > 0 {
                    acc += (a * (1.0 + j as f64 * b)).powi(2);
                }
                self.sigma2 * acc
            })
            .collect();

        Ok(Forecast::from_variances(values, &variances))
    }

    fn aic(&self) -> Option<f64> {
        let n = self.residuals.len();
        if n == 0 {
            return None;
        }
        let sse: f64 = self.residuals.iter().map(|r| r * r).sum();
        Some(n as f64 * (sse.max(1e-300) / n as f64).ln() + 2.0 * 4.0)
    }

    fn residuals(&self) -> &[f64] {
        &self.residuals
    }
}
