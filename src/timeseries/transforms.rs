//! Time series transformations

use crate::error::{Result, StudioError};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Differencing transformer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Differencer {
    /// Order of differencing
    order: usize,
    /// Last observed value at every differencing level, outermost first
    tails: Option<Vec<f64>>,
}

impl Differencer {
    /// Differencing of the given order; 0 leaves the series untouched
    pub fn new(order: usize) -> Self {
        Self { order, tails: None }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Apply differencing, remembering what is needed to integrate forecasts
    pub fn transform(&mut self, series: &Array1<f64>) -> Result<Array1<f64>> {
        if series.len() <= self.order {
            return Err(StudioError::DataError(format!(
                "Series of length {} is too short for differencing of order {}",
                series.len(),
                self.order
            )));
        }

        let mut result = series.clone();
        let mut tails = Vec::with_capacity(self.order);
        for _ in 0..self.order {
            tails.push(result[result.len() - 1]);
            result = diff_once(&result);
        }

        self.tails = Some(tails);
        Ok(result)
    }

    /// Turn forecasts of the differenced series back into levels that
    /// continue the series passed to `transform`
    pub fn integrate(&self, forecast: &Array1<f64>) -> Result<Array1<f64>> {
        let tails = self.tails.as_ref().ok_or(StudioError::ModelNotFitted)?;

        let mut result = forecast.clone();
        for &last in tails.iter().rev() {
            let mut level = last;
            for v in result.iter_mut() {
                level += *v;
                *v = level;
            }
        }
        Ok(result)
    }
}

/// Seasonal differencing: `y[t] - y[t - period]`, applied `order` times
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonalDifferencer {
    order: usize,
    period: usize,
    /// Last `period` values at every differencing level, outermost first
    tails: Option<Vec<Vec<f64>>>,
}

impl SeasonalDifferencer {
    pub fn new(order: usize, period: usize) -> Self {
        Self {
            order,
            period,
            tails: None,
        }
    }

    pub fn transform(&mut self, series: &Array1<f64>) -> Result<Array1<f64>> {
        if self.order > 0 && self.period == 0 {
            return Err(StudioError::InvalidParameter {
                name: "period".to_string(),
                value: "0".to_string(),
                reason: "seasonal period must be positive".to_string(),
            });
        }
        if series.len() <= self.order * self.period {
            return Err(StudioError::DataError(format!(
                "Series of length {} is too short for {} rounds of seasonal differencing at lag {}",
                series.len(),
                self.order,
                self.period
            )));
        }

        let mut result = series.to_vec();
        let mut tails = Vec::with_capacity(self.order);
        for _ in 0..self.order {
            tails.push(result[result.len() - self.period..].to_vec());
            result = (self.period..result.len())
                .map(|t| result[t] - result[t - self.period])
                .collect();
        }

        self.tails = Some(tails);
        Ok(Array1::from(result))
    }

    /// Undo the differencing for forecasts that continue the transformed series
    pub fn integrate(&self, forecast: &Array1<f64>) -> Result<Array1<f64>> {
        let tails = self.tails.as_ref().ok_or(StudioError::ModelNotFitted)?;

        let mut result = forecast.to_vec();
        for tail in tails.iter().rev() {
            let mut levels = tail.clone();
            for v in result.iter_mut() {
                *v += levels[levels.len() - self.period];
                levels.push(*v);
            }
        }
        Ok(Array1::from(result))
    }
}

fn diff_once(series: &Array1<f64>) -> Array1<f64> {
    let n = series.len();
    if n <= 1 {
        return Array1::zeros(0);
    }

    let mut result = Array1::zeros(n - 1);
    for i in 1..n {
        result[i - 1] = series[i] - series[i - 1];
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_differencing() {
        let mut diff = Differencer::new(1);
        let out = diff.transform(&array![1.0, 3.0, 6.0, 10.0]).unwrap();
        assert_eq!(out, array![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_integrate_continues_series() {
        let mut diff = Differencer::new(2);
        // quadratic: second differences are constant 2
        let series = array![0.0, 1.0, 4.0, 9.0, 16.0];
        let out = diff.transform(&series).unwrap();
        assert_eq!(out, array![2.0, 2.0, 2.0]);

        let levels = diff.integrate(&array![2.0, 2.0]).unwrap();
        assert_eq!(levels, array![25.0, 36.0]);
    }

    #[test]
    fn test_order_zero_is_identity() {
        let mut diff = Differencer::new(0);
        let series = array![5.0, 6.0];
        assert_eq!(diff.transform(&series).unwrap(), series);
        assert_eq!(diff.integrate(&array![7.0]).unwrap(), array![7.0]);
    }

    #[test]
    fn test_seasonal_differencing_round_trips_the_pattern() {
        let mut diff = SeasonalDifferencer::new(1, 3);
        let series = array![1.0, 5.0, 2.0, 2.0, 6.0, 3.0];
        assert_eq!(diff.transform(&series).unwrap(), array![1.0, 1.0, 1.0]);

        let levels = diff.integrate(&array![1.0, 1.0, 1.0, 1.0]).unwrap();
        assert_eq!(levels, array![3.0, 7.0, 4.0, 4.0]);
        assert!(SeasonalDifferencer::new(1, 4).transform(&array![1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_too_short() {
        let mut diff = Differencer::new(2);
        assert!(diff.transform(&array![1.0, 2.0]).is_err());
        assert!(Differencer::new(1).integrate(&array![1.0]).is_err());
    }
}
