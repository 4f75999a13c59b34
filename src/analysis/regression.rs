//! Regression analysis

use super::config::{RegressionConfig, RegressionMethod};
use super::{head, improves, round4, supervised_data, SERVED_MODEL_FIT};
use crate::error::{Result, StudioError};
use crate::preprocessing::{FeatureEncoder, RawValue, Table};
use crate::registry::{FittedModel, ModelType, TrainedModelEntry};
use crate::training::{
    cross_val_r2, train_test_split, ElasticNet, LinearRegression, ModelMetrics, PolynomialRegression,
    Regressor,
};
use ndarray::{Array1, Array2, Axis};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

const SAMPLE_SIZE: usize = 100;

fn display_name(method: RegressionMethod) -> &'static str {
    match method {
        RegressionMethod::Linear => "Linear Regression",
        RegressionMethod::Ridge => "Ridge Regression",
        RegressionMethod::Lasso => "Lasso Regression",
        RegressionMethod::Polynomial => "Polynomial Regression",
        RegressionMethod::Elastic => "Elastic Net",
    }
}

fn build(method: RegressionMethod, cfg: &RegressionConfig) -> Box<dyn Regressor> {
    match method {
        RegressionMethod::Linear => Box::new(LinearRegression::new()),
        RegressionMethod::Ridge => Box::new(LinearRegression::ridge(cfg.ridge_alpha)),
        RegressionMethod::Lasso => Box::new(ElasticNet::lasso(cfg.lasso_alpha)),
        RegressionMethod::Polynomial => Box::new(PolynomialRegression::new(cfg.polynomial_degree)),
        RegressionMethod::Elastic => Box::new(ElasticNet::new(cfg.elastic_alpha, cfg.elastic_l1_ratio)),
    }
}

pub(super) fn numeric_target(values: &[RawValue], target: &str) -> Result<Array1<f64>> {
    values
        .iter()
        .map(|v| v.as_number())
        .collect::<Option<Vec<f64>>>()
        .map(Array1::from)
        .ok_or_else(|| StudioError::DataError(format!("Regression target '{}' must be numeric", target)))
}

pub(super) fn metrics_json(m: &ModelMetrics) -> Value {
    json!({
        "r2": m.r2.map(round4),
        "mse": m.mse.map(round4),
        "rmse": m.rmse.map(round4),
        "mae": m.mae.map(round4),
    })
}

struct Evaluation {
    test_r2: f64,
    payload: Value,
}

fn evaluate(
    method: RegressionMethod,
    cfg: &RegressionConfig,
    feature_names: &[String],
    (x_train, y_train): (&Array2<f64>, &Array1<f64>),
    (x_test, y_test): (&Array2<f64>, &Array1<f64>),
) -> Result<Evaluation> {
    let mut model = build(method, cfg);
    model.fit(x_train, y_train)?;
    let train_pred = model.predict(x_train)?;
    let test_pred = model.predict(x_test)?;

    let train_metrics = ModelMetrics::compute_regression(y_train, &train_pred);
    let test_metrics = ModelMetrics::compute_regression(y_test, &test_pred);

    let coefficients = match model.coefficients() {
        Some(coef) if coef.len() == feature_names.len() => {
            let named: Map<String, Value> = feature_names
                .iter()
                .zip(coef.iter())
                .map(|(name, c)| (name.clone(), json!(round4(*c))))
                .collect();
            Value::Object(named)
        }
        Some(coef) => json!(coef.iter().map(|c| round4(*c)).collect::<Vec<_>>()),
        None => Value::Null,
    };

    let cross_validation = if cfg.cv_folds >= 2 {
        cross_val_r2(|| build(method, cfg), x_train, y_train, cfg.cv_folds, cfg.random_state)?.map(|cv| {
            json!({
                "mean": round4(cv.mean_score),
                "std": round4(cv.std_score),
                "scores": cv.scores.iter().map(|s| round4(*s)).collect::<Vec<_>>(),
            })
        })
    } else {
        None
    };

    let residuals = y_test - &test_pred;
    Ok(Evaluation {
        test_r2: test_metrics.r2.unwrap_or(f64::NEG_INFINITY),
        payload: json!({
            "method": display_name(method),
            "coefficients": coefficients,
            "train_metrics": metrics_json(&train_metrics),
            "test_metrics": metrics_json(&test_metrics),
            "cross_validation": cross_validation,
            "predictions_sample": head(test_pred.iter().copied(), SAMPLE_SIZE),
            "actual_sample": head(y_test.iter().copied(), SAMPLE_SIZE),
            "residuals_sample": head(residuals.iter().copied(), SAMPLE_SIZE),
        }),
    })
}

pub(super) fn run(table: &Table, cfg: &RegressionConfig) -> Result<(Value, Option<TrainedModelEntry>)> {
    let target = cfg.target()?;
    if cfg.methods.is_empty() {
        return Err(StudioError::ConfigError("methods must name at least one regression method".to_string()));
    }

    let (features, target_values) = supervised_data(table, target, &cfg.features)?;
    let y = numeric_target(&target_values, target)?;

    let mut encoder = FeatureEncoder::new();
    let x = encoder.fit_transform(&features)?;
    let feature_names = encoder.feature_schema().columns().to_vec();

    let (train_idx, test_idx) = train_test_split(y.len(), cfg.test_size, cfg.random_state, None)?;
    let x_train = x.select(Axis(0), &train_idx);
    let y_train = y.select(Axis(0), &train_idx);
    let x_test = x.select(Axis(0), &test_idx);
    let y_test = y.select(Axis(0), &test_idx);

    let mut results = Map::new();
    let mut best: Option<(RegressionMethod, f64)> = None;
    let mut comparison = Vec::new();

    for &method in &cfg.methods {
        match evaluate(method, cfg, &feature_names, (&x_train, &y_train), (&x_test, &y_test)) {
            Ok(eval) => {
                debug!(method = method.key(), test_r2 = eval.test_r2, "Regression method evaluated");
                comparison.push(json!({
                    "method": display_name(method),
                    "key": method.key(),
                    "test_r2": eval.payload["test_metrics"]["r2"],
                    "test_rmse": eval.payload["test_metrics"]["rmse"],
                }));
                if improves(eval.test_r2, best.map(|(_, r2)| r2)) {
                    best = Some((method, eval.test_r2));
                }
                results.insert(method.key().to_string(), eval.payload);
            }
            Err(e) => {
                warn!(method = method.key(), error = %e, "Regression method failed");
                results.insert(
                    method.key().to_string(),
                    json!({"method": display_name(method), "error": e.to_string()}),
                );
            }
        }
    }

    let (best_method, _) =
        best.ok_or_else(|| StudioError::TrainingError("No regression method could be fitted".to_string()))?;

    let mut served = build(best_method, cfg);
    served.fit(&x, &y)?;

    let payload = json!({
        "success": true,
        "model_type": ModelType::Regression,
        "target": target,
        "features": encoder.raw_feature_spec().columns(),
        "encoded_features": feature_names,
        "n_samples": y.len(),
        "train_samples": train_idx.len(),
        "test_samples": test_idx.len(),
        "results": results,
        "summary": {
            "best_model": display_name(best_method),
            "best_model_key": best_method.key(),
            "comparison": comparison,
        },
        "served_model_fit": SERVED_MODEL_FIT,
    });

    let entry = TrainedModelEntry::new(
        ModelType::Regression,
        encoder,
        FittedModel::Regressor(served),
        best_method.key(),
    );
    Ok((payload, Some(entry)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn housing(n: usize) -> Table {
        let rows: Vec<Value> = (0..n)
            .map(|i| {
                let size = 50.0 + i as f64;
                let city = if i % 2 == 0 { "north" } else { "south" };
                let bonus = if city == "north" { 10.0 } else { 0.0 };
                json!({"size": size, "city": city, "price": 3.0 * size + bonus + 5.0})
            })
            .collect();
        Table::from_json_rows(&rows).unwrap()
    }

    #[test]
    fn test_linear_recovers_exact_fit() {
        let cfg: RegressionConfig =
            serde_json::from_value(json!({"target": "price", "methods": ["linear", "ridge"]})).unwrap();
        let (payload, entry) = run(&housing(40), &cfg).unwrap();

        assert_eq!(payload["summary"]["best_model_key"], "linear");
        let r2 = payload["results"]["linear"]["test_metrics"]["r2"].as_f64().unwrap();
        assert!(r2 > 0.999);
        let cv = &payload["results"]["linear"]["cross_validation"];
        assert_eq!(cv["scores"].as_array().unwrap().len(), 5);
        assert!(cv["mean"].as_f64().unwrap() > 0.999);
        assert_eq!(payload["served_model_fit"], "full_dataset");
        assert_eq!(payload["encoded_features"].as_array().unwrap().len(), 3);

        let entry = entry.unwrap();
        assert_eq!(entry.method, "linear");
        assert_eq!(entry.raw_feature_spec().len(), 2);
    }

    #[test]
    fn test_cross_validation_can_be_disabled() {
        let cfg: RegressionConfig =
            serde_json::from_value(json!({"target": "price", "cv_folds": 0})).unwrap();
        let (payload, _) = run(&housing(20), &cfg).unwrap();
        assert!(payload["results"]["linear"]["cross_validation"].is_null());
    }

    #[test]
    fn test_non_numeric_target_rejected() {
        let table = Table::from_json_rows(&[
            json!({"x": 1, "y": "a"}),
            json!({"x": 2, "y": "b"}),
            json!({"x": 3, "y": "c"}),
        ])
        .unwrap();
        let cfg: RegressionConfig = serde_json::from_value(json!({"target": "y"})).unwrap();
        assert!(matches!(run(&table, &cfg), Err(StudioError::DataError(_))));
    }

    #[test]
    fn test_missing_target_config() {
        let cfg = RegressionConfig::default();
        assert!(matches!(run(&housing(10), &cfg), Err(StudioError::InvalidInput(_))));
    }
}
