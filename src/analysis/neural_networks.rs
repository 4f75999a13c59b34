//! Neural network analysis: a multi-layer perceptron for either task

use super::classification::{evaluate_classifier, ClassificationData};
use super::config::{NeuralMethod, NeuralNetworkConfig, NeuralTask};
use super::regression::{metrics_json, numeric_target};
use super::{head, round4, supervised_data, SERVED_MODEL_FIT};
use crate::error::{Result, StudioError};
use crate::preprocessing::{FeatureEncoder, StandardScaler, Table};
use crate::registry::{FittedModel, ModelType, TrainedModelEntry};
use crate::training::{
    train_test_split, Classifier, MLPClassifier, MLPConfig, MLPRegressor, ModelMetrics, Regressor,
};
use ndarray::Axis;
use serde_json::{json, Map, Value};
use tracing::debug;

const SAMPLE_SIZE: usize = 100;

fn display_name(method: NeuralMethod) -> &'static str {
    match method {
        NeuralMethod::Mlp => "Multi-Layer Perceptron",
    }
}

fn mlp_config(cfg: &NeuralNetworkConfig) -> MLPConfig {
    MLPConfig {
        hidden_layers: cfg.hidden_layers.clone(),
        activation: cfg.activation,
        learning_rate: cfg.learning_rate,
        max_epochs: cfg.epochs,
        batch_size: cfg.batch_size,
        alpha: cfg.alpha,
        random_state: cfg.random_state,
        ..MLPConfig::default()
    }
}

fn architecture(cfg: &NeuralNetworkConfig, n_parameters: usize, n_iter: usize) -> Value {
    json!({
        "hidden_layers": cfg.hidden_layers,
        "activation": cfg.activation,
        "n_parameters": n_parameters,
        "n_iterations": n_iter,
    })
}

fn insert(payload: &mut Value, key: &str, value: Value) {
    if let Some(map) = payload.as_object_mut() {
        map.insert(key.to_string(), value);
    }
}

fn run_classification(
    table: &Table,
    target: &str,
    method: NeuralMethod,
    cfg: &NeuralNetworkConfig,
) -> Result<(Value, TrainedModelEntry)> {
    let data = ClassificationData::prepare(table, target, &cfg.features, cfg.test_size, cfg.random_state)?;
    let mut scaler = StandardScaler::new();
    let x = scaler.fit_transform(&data.x)?;

    let mut eval = evaluate_classifier(
        || Box::new(MLPClassifier::new(mlp_config(cfg))) as Box<dyn Classifier>,
        display_name(method),
        &data,
        &x,
        0,
        cfg.random_state,
    )?;
    debug!(accuracy = eval.test_accuracy, "Neural network classifier evaluated");

    let mut served = MLPClassifier::new(mlp_config(cfg));
    served.fit(&x, &data.target.y)?;
    insert(
        &mut eval.payload,
        "architecture",
        architecture(cfg, served.n_parameters(), served.n_iter()),
    );

    let mut results = Map::new();
    results.insert(method.key().to_string(), eval.payload);
    let payload = json!({
        "success": true,
        "task": NeuralTask::Classification,
        "model_type": ModelType::Classification,
        "target": target,
        "features": data.encoder.raw_feature_spec().columns(),
        "encoded_features": data.encoder.feature_schema().columns(),
        "n_samples": data.target.y.len(),
        "n_classes": data.classes.len(),
        "train_samples": data.train.len(),
        "test_samples": data.test.len(),
        "results": results,
        "summary": {
            "best_model": display_name(method),
            "best_model_key": method.key(),
            "comparison": [{
                "method": display_name(method),
                "key": method.key(),
                "test_accuracy": round4(eval.test_accuracy),
            }],
        },
        "label_mapping": data.label_mapping(),
        "served_model_fit": SERVED_MODEL_FIT,
    });

    let ClassificationData { encoder, target: encoded, .. } = data;
    let entry = TrainedModelEntry::new(
        ModelType::Classification,
        encoder,
        FittedModel::Classifier(Box::new(served)),
        method.key(),
    )
    .with_scaler(Some(scaler))
    .with_label_codec(encoded.codec);
    Ok((payload, entry))
}

fn run_regression(
    table: &Table,
    target: &str,
    method: NeuralMethod,
    cfg: &NeuralNetworkConfig,
) -> Result<(Value, TrainedModelEntry)> {
    let (features, target_values) = supervised_data(table, target, &cfg.features)?;
    let y = numeric_target(&target_values, target)?;
    let mut encoder = FeatureEncoder::new();
    let encoded = encoder.fit_transform(&features)?;
    let mut scaler = StandardScaler::new();
    let x = scaler.fit_transform(&encoded)?;

    let (train_idx, test_idx) = train_test_split(y.len(), cfg.test_size, cfg.random_state, None)?;
    let x_train = x.select(Axis(0), &train_idx);
    let y_train = y.select(Axis(0), &train_idx);
    let x_test = x.select(Axis(0), &test_idx);
    let y_test = y.select(Axis(0), &test_idx);

    let mut model = MLPRegressor::new(mlp_config(cfg));
    model.fit(&x_train, &y_train)?;
    let train_metrics = ModelMetrics::compute_regression(&y_train, &model.predict(&x_train)?);
    let test_pred = model.predict(&x_test)?;
    let test_metrics = ModelMetrics::compute_regression(&y_test, &test_pred);
    debug!(test_r2 = ?test_metrics.r2, "Neural network regressor evaluated");

    let mut served = MLPRegressor::new(mlp_config(cfg));
    served.fit(&x, &y)?;

    let mut results = Map::new();
    results.insert(
        method.key().to_string(),
        json!({
            "method": display_name(method),
            "architecture": architecture(cfg, served.n_parameters(), served.n_iter()),
            "train_metrics": metrics_json(&train_metrics),
            "test_metrics": metrics_json(&test_metrics),
            "predictions_sample": head(test_pred.iter().copied(), SAMPLE_SIZE),
            "actual_sample": head(y_test.iter().copied(), SAMPLE_SIZE),
        }),
    );
    let payload = json!({
        "success": true,
        "task": NeuralTask::Regression,
        "model_type": ModelType::Regression,
        "target": target,
        "features": encoder.raw_feature_spec().columns(),
        "encoded_features": encoder.feature_schema().columns(),
        "n_samples": y.len(),
        "train_samples": train_idx.len(),
        "test_samples": test_idx.len(),
        "results": results,
        "summary": {
            "best_model": display_name(method),
            "best_model_key": method.key(),
            "comparison": [{
                "method": display_name(method),
                "key": method.key(),
                "test_r2": test_metrics.r2.map(round4),
            }],
        },
        "served_model_fit": SERVED_MODEL_FIT,
    });

    let entry = TrainedModelEntry::new(
        ModelType::Regression,
        encoder,
        FittedModel::Regressor(Box::new(served)),
        method.key(),
    )
    .with_scaler(Some(scaler));
    Ok((payload, entry))
}

pub(super) fn run(table: &Table, cfg: &NeuralNetworkConfig) -> Result<(Value, Option<TrainedModelEntry>)> {
    let target = cfg.target()?;
    let method = *cfg.methods.first().ok_or_else(|| {
        StudioError::ConfigError("methods must name at least one neural network method".to_string())
    })?;
    if cfg.hidden_layers.is_empty() || cfg.hidden_layers.contains(&0) {
        return Err(StudioError::InvalidParameter {
            name: "hidden_layers".to_string(),
            value: format!("{:?}", cfg.hidden_layers),
            reason: "must list at least one layer, each with one or more units".to_string(),
        });
    }

    let (payload, entry) = match cfg.task {
        NeuralTask::Classification => run_classification(table, target, method, cfg)?,
        NeuralTask::Regression => run_regression(table, target, method, cfg)?,
    };
    Ok((payload, Some(entry)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flowers(n_per_class: usize) -> Table {
        let mut rows = Vec::new();
        for i in 0..n_per_class {
            let jitter = (i % 5) as f64 * 0.05;
            rows.push(json!({"petal": 1.0 + jitter, "sepal": 3.0 - jitter, "species": "setosa"}));
            rows.push(json!({"petal": 4.0 + jitter, "sepal": 2.5 + jitter, "species": "versicolor"}));
            rows.push(json!({"petal": 6.0 + jitter, "sepal": 3.5 - jitter, "species": "virginica"}));
        }
        Table::from_json_rows(&rows).unwrap()
    }

    #[test]
    fn test_mlp_classifier_is_stored_with_scaler() {
        let cfg: NeuralNetworkConfig = serde_json::from_value(json!({
            "target": "species",
            "hidden_layers": [16],
            "epochs": 300,
            "learning_rate": 0.01,
        }))
        .unwrap();
        let (payload, entry) = run(&flowers(15), &cfg).unwrap();

        let mlp = &payload["results"]["mlp"];
        assert!(mlp["test_metrics"]["accuracy"].as_f64().unwrap() >= 0.9);
        // 2 inputs -> 16 hidden -> 3 classes
        assert_eq!(mlp["architecture"]["n_parameters"], 2 * 16 + 16 + 16 * 3 + 3);
        assert_eq!(payload["label_mapping"]["setosa"], 0);

        let entry = entry.unwrap();
        assert_eq!(entry.model_type, ModelType::Classification);
        assert_eq!(entry.method, "mlp");
        assert!(entry.scaler.is_some());
        assert!(entry.label_codec.is_some());
        let FittedModel::Classifier(model) = &entry.model else {
            panic!("expected a classifier");
        };
        assert!(model.as_probabilistic().is_some());
    }

    #[test]
    fn test_mlp_regressor_learns_a_line() {
        let rows: Vec<Value> = (0..40)
            .map(|i| {
                let x = i as f64 / 4.0;
                json!({"x": x, "y": 2.0 * x + 1.0})
            })
            .collect();
        let cfg: NeuralNetworkConfig = serde_json::from_value(json!({
            "target": "y",
            "task": "regression",
            "hidden_layers": [8],
            "activation": "tanh",
            "epochs": 500,
            "learning_rate": 0.01,
        }))
        .unwrap();
        let (payload, entry) = run(&Table::from_json_rows(&rows).unwrap(), &cfg).unwrap();

        assert!(payload["results"]["mlp"]["test_metrics"]["r2"].as_f64().unwrap() > 0.9);
        assert_eq!(payload["task"], "regression");
        let entry = entry.unwrap();
        assert_eq!(entry.model_type, ModelType::Regression);
        let FittedModel::Regressor(model) = &entry.model else {
            panic!("expected a regressor");
        };
        assert_eq!(model.name(), "mlp");
    }

    #[test]
    fn test_empty_hidden_layers_rejected() {
        let cfg: NeuralNetworkConfig =
            serde_json::from_value(json!({"target": "species", "hidden_layers": []})).unwrap();
        assert!(matches!(
            run(&flowers(5), &cfg),
            Err(StudioError::InvalidParameter { .. })
        ));
    }
}
