//! Series diagnostics: autocorrelations and the augmented Dickey-Fuller test

use crate::error::{Result, StudioError};
use crate::training::linear_models::solve_spd;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Largest lag reported by [`Correlogram::compute`]
pub const MAX_CORRELOGRAM_LAGS: usize = 40;

/// Lags whose |correlation| falls below this are treated as insignificant
/// when suggesting model orders
const ORDER_CUTOFF: f64 = 0.2;

/// Sample autocorrelations for lags `0..=nlags`
pub fn acf(series: &[f64], nlags: usize) -> Vec<f64> {
    let n = series.len();
    if n == 0 {
        return Vec::new();
    }
    let mean = series.iter().sum::<f64>() / n as f64;
    let centered: Vec<f64> = series.iter().map(|v| v - mean).collect();
    let denom: f64 = centered.iter().map(|v| v * v).sum();

    (0..=nlags.min(n - 1))
        .map(|k| {
            if denom <= f64::EPSILON {
                return if k == 0 { 1.0 } else { 0.0 };
            }
            let num: f64 = (k..n).map(|t| centered[t] * centered[t - k]).sum();
            num / denom
        })
        .collect()
}

/// Partial autocorrelations for lags `0..=nlags`, by the Durbin-Levinson recursion
pub fn pacf(series: &[f64], nlags: usize) -> Vec<f64> {
    let r = acf(series, nlags);
    if r.is_empty() {
        return r;
    }
    let nlags = r.len() - 1;
    let mut out = vec![1.0];
    let mut phi: Vec<f64> = Vec::new();

    for k in 1..=nlags {
        let num = r[k] - (1..k).map(|j| phi[j - 1] * r[k - j]).sum::<f64>();
        let den = 1.0 - (1..k).map(|j| phi[j - 1] * r[j]).sum::<f64>();
        let phi_kk = if den.abs() > f64::EPSILON { num / den } else { 0.0 };

        let mut next: Vec<f64> = (1..k).map(|j| phi[j - 1] - phi_kk * phi[k - j - 1]).collect();
        next.push(phi_kk);
        phi = next;
        out.push(phi_kk);
    }
    out
}

/// ACF and PACF with the orders they suggest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Correlogram {
    pub acf: Vec<f64>,
    pub pacf: Vec<f64>,
    /// First lag whose partial autocorrelation is insignificant
    pub suggested_p: usize,
    /// First lag whose autocorrelation is insignificant
    pub suggested_q: usize,
}

impl Correlogram {
    /// Lags up to `min(40, n / 2 - 1)`
    pub fn compute(series: &[f64]) -> Result<Self> {
        let nlags = MAX_CORRELOGRAM_LAGS.min((series.len() / 2).saturating_sub(1));
        if nlags == 0 {
            return Err(StudioError::DataError(format!(
                "Autocorrelations need at least 4 observations, got {}",
                series.len()
            )));
        }
        let acf = acf(series, nlags);
        let pacf = pacf(series, nlags);
        Ok(Self {
            suggested_p: first_insignificant(&pacf),
            suggested_q: first_insignificant(&acf),
            acf,
            pacf,
        })
    }
}

/// Lag 1 when no lag falls below the cutoff
fn first_insignificant(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, v)| v.abs() < ORDER_CUTOFF)
        .map_or(1, |(lag, _)| lag)
}

// ═══════════════════════════════════════════════════════════════════════════
//  Augmented Dickey-Fuller
// ═══════════════════════════════════════════════════════════════════════════

/// MacKinnon (2010) response-surface coefficients for the constant-only
/// regression: 1%, 5% and 10% critical values as polynomials in 1/nobs
const ADF_CRITICAL: [(&str, [f64; 4]); 3] = [
    ("1%", [-3.43035, -6.5393, -16.786, -79.433]),
    ("5%", [-2.86154, -2.8903, -4.234, -40.040]),
    ("10%", [-2.56677, -1.5384, -2.809, 0.0]),
];

/// MacKinnon (1994) approximate p-value surface, constant-only regression
const TAU_MAX: f64 = 2.74;
const TAU_MIN: f64 = -18.83;
const TAU_STAR: f64 = -1.61;
const TAU_SMALL_P: [f64; 3] = [2.1659, 1.4412, 0.038269];
const TAU_LARGE_P: [f64; 4] = [1.7339, 0.93202, -0.12745, -0.010368];

/// Outcome of an augmented Dickey-Fuller test with a constant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdfResult {
    pub adf_statistic: f64,
    pub p_value: f64,
    /// Lagged differences chosen by AIC
    pub n_lags: usize,
    /// Rows in the final regression
    pub n_observations: usize,
    /// Keyed "1%", "5%", "10%"
    pub critical_values: Vec<(String, f64)>,
    pub is_stationary: bool,
}

/// Ordinary least squares fit: coefficients, residual sum of squares, and
/// the unscaled variance of coefficient `col`
fn ols(x: &Array2<f64>, y: &Array1<f64>, col: usize) -> Result<(Array1<f64>, f64, f64)> {
    let xtx = x.t().dot(x);
    let coef = solve_spd(&xtx, &x.t().dot(y))?;
    let resid = y - &x.dot(&coef);
    let ssr = resid.dot(&resid);
    let mut unit = Array1::<f64>::zeros(xtx.nrows());
    unit[col] = 1.0;
    let var = solve_spd(&xtx, &unit)?[col];
    Ok((coef, ssr, var))
}

/// Design for Δy_t = a + g·y_{t-1} + Σ b_i·Δy_{t-i}, rows starting at difference index `first`
fn adf_design(series: &[f64], lags: usize, first: usize) -> (Array2<f64>, Array1<f64>) {
    let dy: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();
    let rows = dy.len() - first;
    let mut x = Array2::<f64>::ones((rows, lags + 2));
    let mut y = Array1::<f64>::zeros(rows);
    for (r, t) in (first..dy.len()).enumerate() {
        x[[r, 1]] = series[t];
        for i in 1..=lags {
            x[[r, i + 1]] = dy[t - i];
        }
        y[r] = dy[t];
    }
    (x, y)
}

fn gaussian_aic(ssr: f64, nobs: usize, k: usize) -> f64 {
    let n = nobs as f64;
    let llf = -n / 2.0 * ((2.0 * std::f64::consts::PI).ln() + (ssr.max(1e-300) / n).ln() + 1.0);
    -2.0 * llf + 2.0 * k as f64
}

fn polyval(coef: &[f64], x: f64) -> f64 {
    coef.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Complementary error function, fractional error below 1.2e-7
fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.26551223
        + t * (1.00002368
            + t * (0.37409196
                + t * (0.09678418
                    + t * (-0.18628806
                        + t * (0.27886807
                            + t * (-1.13520398 + t * (1.48851587 + t * (-0.82215223 + t * 0.17087277))))))));
    let ans = t * poly.exp();
    if x >= 0.0 { ans } else { 2.0 - ans }
}

fn normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

/// Approximate p-value of an ADF statistic
pub fn adf_p_value(stat: f64) -> f64 {
    if stat > TAU_MAX {
        1.0
    } else if stat < TAU_MIN {
        0.0
    } else if stat <= TAU_STAR {
        normal_cdf(polyval(&TAU_SMALL_P, stat))
    } else {
        normal_cdf(polyval(&TAU_LARGE_P, stat))
    }
}

/// Augmented Dickey-Fuller test with a constant and AIC lag selection over
/// `0..=12 * (n / 100)^(1/4)` lagged differences
pub fn adf_test(series: &[f64]) -> Result<AdfResult> {
    let n = series.len();
    let max_lag = ((12.0 * (n as f64 / 100.0).powf(0.25)).ceil() as usize).min((n / 2).saturating_sub(2));
    if n < 6 || series.iter().any(|v| !v.is_finite()) {
        return Err(StudioError::DataError(format!(
            "Stationarity test needs at least 6 finite observations, got {}",
            n
        )));
    }

    // every candidate lag is scored on the same rows
    let mut best: Option<(usize, f64)> = None;
    for lags in 0..=max_lag {
        let (x, y) = adf_design(series, lags, max_lag);
        let (_, ssr, _) = ols(&x, &y, 1)?;
        let aic = gaussian_aic(ssr, y.len(), lags + 2);
        if best.map_or(true, |(_, b)| aic < b) {
            best = Some((lags, aic));
        }
    }
    let lags = best.map_or(0, |(l, _)| l);

    let (x, y) = adf_design(series, lags, lags);
    let nobs = y.len();
    let (coef, ssr, var) = ols(&x, &y, 1)?;
    let dof = nobs.saturating_sub(lags + 2).max(1) as f64;
    let se = (ssr / dof * var).sqrt();
    let stat = coef[1] / se;
    if !stat.is_finite() {
        return Err(StudioError::DataError(
            "Stationarity test is undefined for a series the lags predict exactly".to_string(),
        ));
    }
    let p_value = adf_p_value(stat);

    let inv_n = 1.0 / nobs as f64;
    let critical_values = ADF_CRITICAL
        .iter()
        .map(|(name, c)| (name.to_string(), polyval(c, inv_n)))
        .collect();

    Ok(AdfResult {
        adf_statistic: stat,
        p_value,
        n_lags: lags,
        n_observations: nobs,
        critical_values,
        is_stationary: p_value < 0.05,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic noise in [-0.5, 0.5)
    fn noise(n: usize) -> Vec<f64> {
        let mut state: u64 = 12345;
        (0..n)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                (state >> 11) as f64 / (1u64 << 53) as f64 - 0.5
            })
            .collect()
    }

    #[test]
    fn test_acf_of_alternating_series() {
        let series: Vec<f64> = (0..20).map(|t| if t % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let r = acf(&series, 3);
        assert_eq!(r.len(), 4);
        assert!((r[0] - 1.0).abs() < 1e-12);
        assert!((r[1] + 0.95).abs() < 1e-12);
        assert!((r[2] - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_pacf_of_ar1_cuts_off() {
        let e = noise(500);
        let mut series = vec![0.0];
        for t in 1..500 {
            series.push(0.7 * series[t - 1] + e[t]);
        }
        let p = pacf(&series, 5);
        assert!((p[1] - 0.7).abs() < 0.1);
        assert!(p[2..].iter().all(|v| v.abs() < 0.15));

        let correlogram = Correlogram::compute(&series).unwrap();
        assert_eq!(correlogram.acf.len(), 41);
        assert_eq!(correlogram.suggested_p, 2);
    }

    #[test]
    fn test_correlogram_needs_observations() {
        assert!(Correlogram::compute(&[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_adf_rejects_degenerate_series() {
        assert!(adf_test(&[1.0, 2.0, 3.0]).is_err());
        assert!(adf_test(&[5.0; 30]).is_err());
    }

    #[test]
    fn test_adf_tells_noise_from_random_walk() {
        let e = noise(200);
        let stationary = adf_test(&e).unwrap();
        assert!(stationary.is_stationary, "p = {}", stationary.p_value);
        assert!(stationary.adf_statistic < stationary.critical_values[0].1);

        let walk: Vec<f64> = e
            .iter()
            .scan(0.0, |acc, v| {
                *acc += v + 0.05;
                Some(*acc)
            })
            .collect();
        let unit_root = adf_test(&walk).unwrap();
        assert!(!unit_root.is_stationary, "p = {}", unit_root.p_value);
    }

    #[test]
    fn test_critical_values_and_p_value_surface() {
        let result = adf_test(&noise(100)).unwrap();
        let names: Vec<&str> = result.critical_values.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["1%", "5%", "10%"]);
        // asymptotic 5% value is about -2.86
        assert!((result.critical_values[1].1 + 2.89).abs() < 0.05);

        assert_eq!(adf_p_value(3.0), 1.0);
        assert_eq!(adf_p_value(-20.0), 0.0);
        assert!((adf_p_value(-2.86) - 0.05).abs() < 0.01);
        assert!(adf_p_value(-1.0) > 0.5);
    }

    #[test]
    fn test_normal_cdf() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((normal_cdf(1.959964) - 0.975).abs() < 1e-6);
        assert!((normal_cdf(-1.0) - 0.158655).abs() < 1e-5);
    }
}
