//! Time series forecasting analysis

use super::config::{ForecastMethod, TimeSeriesConfig};
use super::{round4, SERVED_MODEL_FIT};
use crate::error::{Result, StudioError};
use crate::preprocessing::{FeatureEncoder, Table};
use crate::registry::{FittedModel, ModelType, TrainedModelEntry};
use crate::timeseries::{adf_test, ArimaModel, Correlogram, Forecaster, ForecastMetrics, HoltSmoother, SarimaModel};
use chrono::{TimeZone, Timelike, Utc};
use ndarray::Array1;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

const HISTORY_LIMIT: usize = 500;
const MIN_OBSERVATIONS: usize = 4;

/// Dated observations sorted by time
struct Series {
    timestamps: Vec<i64>,
    values: Vec<f64>,
    /// Every timestamp falls on midnight
    date_only: bool,
}

impl Series {
    fn from_table(table: &Table, date_column: &str, target_column: &str) -> Result<Self> {
        let dates = table.require(date_column)?;
        let targets = table.require(target_column)?;

        let mut points: Vec<(i64, f64)> = dates
            .values
            .iter()
            .zip(&targets.values)
            .filter_map(|(d, v)| Some((d.as_datetime()?, v.as_number()?)))
            .collect();
        let skipped = table.n_rows() - points.len();
        if skipped > 0 {
            warn!(skipped, "Dropping rows without a parseable date or numeric value");
        }
        if points.len() < MIN_OBSERVATIONS {
            return Err(StudioError::DataError(format!(
                "Time series needs at least {} dated observations, got {}",
                MIN_OBSERVATIONS,
                points.len()
            )));
        }

        points.sort_by_key(|(t, _)| *t);
        let (timestamps, values): (Vec<i64>, Vec<f64>) = points.into_iter().unzip();
        let date_only = timestamps.iter().all(|ns| {
            let dt = Utc.timestamp_nanos(*ns);
            dt.hour() == 0 && dt.minute() == 0 && dt.second() == 0
        });
        Ok(Self {
            timestamps,
            values,
            date_only,
        })
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    /// Median spacing between consecutive observations
    fn step(&self) -> i64 {
        let mut gaps: Vec<i64> = self.timestamps.windows(2).map(|w| w[1] - w[0]).collect();
        gaps.sort_unstable();
        gaps.get(gaps.len() / 2).copied().unwrap_or(0)
    }

    fn format(&self, ns: i64) -> String {
        let dt = Utc.timestamp_nanos(ns);
        if self.date_only {
            dt.format("%Y-%m-%d").to_string()
        } else {
            dt.format("%Y-%m-%dT%H:%M:%S").to_string()
        }
    }

    fn labels(&self, range: std::ops::Range<usize>) -> Vec<String> {
        self.timestamps[range].iter().map(|ns| self.format(*ns)).collect()
    }

    /// Dates following the last observation at the median spacing
    fn future_labels(&self, periods: usize) -> Vec<String> {
        let step = self.step();
        let last = self.timestamps.last().copied().unwrap_or(0);
        (1..=periods as i64)
            .map(|i| self.format(last.saturating_add(step.saturating_mul(i))))
            .collect()
    }
}

fn build(method: ForecastMethod, cfg: &TimeSeriesConfig) -> Result<Box<dyn Forecaster>> {
    Ok(match method {
        ForecastMethod::Arima => {
            let (p, d) = cfg.ar_order()?;
            Box::new(ArimaModel::new(p, d))
        }
        ForecastMethod::Sarima => {
            let (order, seasonal) = cfg.seasonal_order()?;
            Box::new(SarimaModel::new(order, seasonal))
        }
        ForecastMethod::Holt => {
            let mut holt = HoltSmoother::new();
            holt.alpha = cfg.holt_alpha;
            holt.beta = cfg.holt_beta;
            Box::new(holt)
        }
    })
}

fn rounded(values: &[f64]) -> Vec<f64> {
    values.iter().map(|v| round4(*v)).collect()
}

fn residual_stats(residuals: &[f64]) -> Value {
    if residuals.is_empty() {
        return Value::Null;
    }
    let r = Array1::from(residuals.to_vec());
    json!({
        "mean": round4(r.mean().unwrap_or(0.0)),
        "std": round4(r.std(0.0)),
    })
}

/// Stationarity test and correlogram of the full series; failures are reported inline
fn diagnostics(values: &[f64]) -> Value {
    let stationarity = match adf_test(values) {
        Ok(adf) => {
            let critical: Map<String, Value> = adf
                .critical_values
                .iter()
                .map(|(name, v)| (name.clone(), json!(round4(*v))))
                .collect();
            json!({
                "adf_statistic": round4(adf.adf_statistic),
                "p_value": round4(adf.p_value),
                "n_lags": adf.n_lags,
                "n_observations": adf.n_observations,
                "critical_values": critical,
                "is_stationary": adf.is_stationary,
                "interpretation": if adf.is_stationary {
                    "Stationary series"
                } else {
                    "Non-stationary series (differencing needed)"
                },
            })
        }
        Err(e) => {
            warn!(error = %e, "Stationarity test failed");
            json!({"error": e.to_string()})
        }
    };
    let acf_pacf = match Correlogram::compute(values) {
        Ok(c) => json!({
            "acf": rounded(&c.acf),
            "pacf": rounded(&c.pacf),
            "suggested_p": c.suggested_p,
            "suggested_q": c.suggested_q,
        }),
        Err(e) => json!({"error": e.to_string()}),
    };
    json!({
        "stationarity": stationarity,
        "acf_pacf": acf_pacf,
    })
}

struct MethodOutcome {
    rmse: Option<f64>,
    payload: Value,
    /// Fitted on the full series
    model: Box<dyn Forecaster>,
}

fn evaluate(method: ForecastMethod, cfg: &TimeSeriesConfig, series: &Series, n_test: usize) -> Result<MethodOutcome> {
    let full = Array1::from(series.values.clone());
    let n_train = series.len() - n_test;

    let mut payload = json!({ "method": build(method, cfg)?.name() });
    let mut rmse = None;

    if n_test > 0 {
        let mut model = build(method, cfg)?;
        model.fit(&Array1::from(series.values[..n_train].to_vec()))?;
        let predicted = model.forecast(n_test)?;
        let actual = &series.values[n_train..];
        let metrics = ForecastMetrics::compute(actual, &predicted.values);
        rmse = Some(metrics.rmse);

        payload["test_metrics"] = json!({
            "mse": round4(metrics.mse),
            "rmse": round4(metrics.rmse),
            "mae": round4(metrics.mae),
            "mape": metrics.mape.map(round4),
        });
        payload["test_predictions"] = json!(rounded(&predicted.values));
        payload["test_actual"] = json!(actual);
        payload["test_index"] = json!(series.labels(n_train..series.len()));
    }

    let mut model = build(method, cfg)?;
    model.fit(&full)?;
    let forecast = model.forecast(cfg.forecast_periods)?;

    payload["forecast"] = json!({
        "values": rounded(&forecast.values),
        "lower_bound": rounded(&forecast.lower_bound),
        "upper_bound": rounded(&forecast.upper_bound),
        "periods": forecast.periods,
        "dates": series.future_labels(forecast.periods),
    });
    payload["aic"] = json!(model.aic().map(round4));
    payload["residuals_stats"] = residual_stats(model.residuals());

    Ok(MethodOutcome { rmse, payload, model })
}

pub(super) fn run(table: &Table, cfg: &TimeSeriesConfig) -> Result<(Value, Option<TrainedModelEntry>)> {
    let date_column = cfg.date_column()?;
    let target_column = cfg.target_column()?;
    if cfg.methods.is_empty() {
        return Err(StudioError::ConfigError("methods must name at least one forecasting method".to_string()));
    }
    if !(0.0..1.0).contains(&cfg.test_size) {
        return Err(StudioError::InvalidParameter {
            name: "test_size".to_string(),
            value: cfg.test_size.to_string(),
            reason: "must be in [0, 1)".to_string(),
        });
    }

    let series = Series::from_table(table, date_column, target_column)?;
    // the hold-out is the last rows; keep enough history to fit on
    let n_test = ((series.len() as f64 * cfg.test_size) as usize).min(series.len() - MIN_OBSERVATIONS / 2);

    let mut models = Map::new();
    let mut comparison: Vec<(f64, Value)> = Vec::new();
    let mut best: Option<(ForecastMethod, Option<f64>, Box<dyn Forecaster>)> = None;

    for &method in &cfg.methods {
        match evaluate(method, cfg, &series, n_test) {
            Ok(outcome) => {
                debug!(method = method.key(), rmse = ?outcome.rmse, "Forecast method evaluated");
                if let Some(rmse) = outcome.rmse {
                    let metrics = &outcome.payload["test_metrics"];
                    comparison.push((
                        rmse,
                        json!({
                            "model": outcome.payload["method"],
                            "key": method.key(),
                            "rmse": metrics["rmse"],
                            "mae": metrics["mae"],
                            "mape": metrics["mape"],
                            "aic": outcome.payload["aic"],
                        }),
                    ));
                }
                let better = match &best {
                    None => true,
                    Some((_, best_rmse, _)) => match (outcome.rmse, best_rmse) {
                        (Some(r), Some(b)) => r < *b,
                        (Some(_), None) => true,
                        _ => false,
                    },
                };
                models.insert(method.key().to_string(), outcome.payload);
                if better {
                    best = Some((method, outcome.rmse, outcome.model));
                }
            }
            Err(e) => {
                warn!(method = method.key(), error = %e, "Forecast method failed");
                models.insert(method.key().to_string(), json!({"method": method.key(), "error": e.to_string()}));
            }
        }
    }

    let (best_method, _, served) =
        best.ok_or_else(|| StudioError::TrainingError("No forecasting method could be fitted".to_string()))?;

    comparison.sort_by(|a, b| a.0.total_cmp(&b.0));
    let comparison: Vec<Value> = comparison.into_iter().map(|(_, v)| v).collect();
    let best_name = models
        .get(best_method.key())
        .map(|m| m["method"].clone())
        .unwrap_or(Value::Null);

    let history_start = series.len().saturating_sub(HISTORY_LIMIT);
    let payload = json!({
        "success": true,
        "model_type": ModelType::TimeSeries,
        "date_column": date_column,
        "target_column": target_column,
        "n_observations": series.len(),
        "train_samples": series.len() - n_test,
        "test_samples": n_test,
        "diagnostics": diagnostics(&series.values),
        "models": models,
        "summary": {
            "best_model": best_name,
            "best_model_key": best_method.key(),
            "comparison": comparison,
        },
        "history": {
            "dates": series.labels(history_start..series.len()),
            "values": &series.values[history_start..],
        },
        "served_model_fit": SERVED_MODEL_FIT,
    });

    let entry = TrainedModelEntry::new(
        ModelType::TimeSeries,
        FeatureEncoder::new(),
        FittedModel::Forecaster(served),
        best_method.key(),
    );
    Ok((payload, Some(entry)))
}
