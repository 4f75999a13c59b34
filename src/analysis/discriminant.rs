//! Linear and quadratic discriminant analysis, served as a classification model

use super::classification::{evaluate_classifier, ClassificationData};
use super::config::{DiscriminantConfig, DiscriminantMethod};
use super::{improves, round4, SERVED_MODEL_FIT};
use crate::error::{Result, StudioError};
use crate::preprocessing::Table;
use crate::registry::{FittedModel, ModelType, TrainedModelEntry};
use crate::training::{Classifier, LinearDiscriminant, QuadraticDiscriminant};
use ndarray::Axis;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

fn display_name(method: DiscriminantMethod) -> &'static str {
    match method {
        DiscriminantMethod::Lda => "Linear Discriminant Analysis",
        DiscriminantMethod::Qda => "Quadratic Discriminant Analysis",
    }
}

fn build(method: DiscriminantMethod, cfg: &DiscriminantConfig) -> Box<dyn Classifier> {
    match method {
        DiscriminantMethod::Lda => Box::new(LinearDiscriminant::new()),
        DiscriminantMethod::Qda => {
            Box::new(QuadraticDiscriminant::new().with_regularization(cfg.qda_reg_param))
        }
    }
}

/// Per-class feature means keyed by transport label
fn class_means(data: &ClassificationData) -> Result<Map<String, Value>> {
    let feature_names = data.encoder.feature_schema().columns();
    let mut out = Map::new();
    for &class_id in &data.classes {
        let rows: Vec<usize> = data
            .target
            .y
            .iter()
            .enumerate()
            .filter(|(_, &v)| v == class_id)
            .map(|(i, _)| i)
            .collect();
        let Some(means) = data.x.select(Axis(0), &rows).mean_axis(Axis(0)) else {
            continue;
        };
        let row: Map<String, Value> = feature_names
            .iter()
            .zip(means.iter())
            .map(|(name, m)| (name.clone(), json!(round4(*m))))
            .collect();
        out.insert(data.decode(class_id)?, Value::Object(row));
    }
    Ok(out)
}

pub(super) fn run(table: &Table, cfg: &DiscriminantConfig) -> Result<(Value, Option<TrainedModelEntry>)> {
    let target = cfg.target()?;
    if cfg.methods.is_empty() {
        return Err(StudioError::ConfigError(
            "methods must name at least one discriminant method".to_string(),
        ));
    }
    let data = ClassificationData::prepare(table, target, &cfg.features, cfg.test_size, cfg.random_state)?;

    let mut results = Map::new();
    let mut comparison = Vec::new();
    let mut best: Option<(DiscriminantMethod, f64)> = None;

    for &method in &cfg.methods {
        let outcome = evaluate_classifier(
            || build(method, cfg),
            display_name(method),
            &data,
            &data.x,
            cfg.cv_folds,
            cfg.random_state,
        );
        match outcome {
            Ok(eval) => {
                debug!(method = method.key(), accuracy = eval.test_accuracy, "Discriminant method evaluated");
                comparison.push(json!({
                    "method": display_name(method),
                    "key": method.key(),
                    "test_accuracy": round4(eval.test_accuracy),
                }));
                if improves(eval.test_accuracy, best.map(|(_, acc)| acc)) {
                    best = Some((method, eval.test_accuracy));
                }
                results.insert(method.key().to_string(), eval.payload);
            }
            Err(e) => {
                warn!(method = method.key(), error = %e, "Discriminant method failed");
                results.insert(
                    method.key().to_string(),
                    json!({"method": display_name(method), "error": e.to_string()}),
                );
            }
        }
    }

    let (best_method, _) = best
        .ok_or_else(|| StudioError::TrainingError("No discriminant method could be fitted".to_string()))?;
    let mut served = build(best_method, cfg);
    served.fit(&data.x, &data.target.y)?;

    let payload = json!({
        "success": true,
        "model_type": ModelType::Classification,
        "target": target,
        "features": data.encoder.raw_feature_spec().columns(),
        "encoded_features": data.encoder.feature_schema().columns(),
        "n_samples": data.target.y.len(),
        "n_classes": data.classes.len(),
        "train_samples": data.train.len(),
        "test_samples": data.test.len(),
        "results": results,
        "class_means": class_means(&data)?,
        "summary": {
            "best_model": display_name(best_method),
            "best_model_key": best_method.key(),
            "comparison": comparison,
        },
        "label_mapping": data.label_mapping(),
        "served_model_fit": SERVED_MODEL_FIT,
    });

    let ClassificationData { encoder, target: encoded, .. } = data;
    let entry = TrainedModelEntry::new(
        ModelType::Classification,
        encoder,
        FittedModel::Classifier(served),
        best_method.key(),
    )
    .with_label_codec(encoded.codec);
    Ok((payload, Some(entry)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups() -> Table {
        let rows: Vec<Value> = (0..30)
            .map(|i| {
                let group = if i % 2 == 0 { "low" } else { "high" };
                let base = if i % 2 == 0 { 0.0 } else { 5.0 };
                json!({"a": base + (i % 3) as f64 * 0.1, "b": base - (i % 4) as f64 * 0.1, "group": group})
            })
            .collect();
        Table::from_json_rows(&rows).unwrap()
    }

    #[test]
    fn test_lda_entry_is_classification() {
        let cfg: DiscriminantConfig =
            serde_json::from_value(json!({"target": "group", "methods": ["lda"]})).unwrap();

        let (payload, entry) = run(&groups(), &cfg).unwrap();
        assert_eq!(payload["results"]["lda"]["test_metrics"]["accuracy"].as_f64().unwrap(), 1.0);
        assert!(payload["class_means"]["high"]["a"].as_f64().unwrap() > 4.0);
        assert!(payload["results"].get("qda").is_none());

        let entry = entry.unwrap();
        assert_eq!(entry.model_type, ModelType::Classification);
        assert_eq!(entry.method, "lda");
    }

    #[test]
    fn test_default_methods_compare_lda_and_qda() {
        let cfg: DiscriminantConfig = serde_json::from_value(json!({"target": "group"})).unwrap();
        let (payload, entry) = run(&groups(), &cfg).unwrap();

        assert_eq!(payload["results"]["qda"]["method"], "Quadratic Discriminant Analysis");
        assert_eq!(payload["results"]["qda"]["test_metrics"]["accuracy"].as_f64().unwrap(), 1.0);
        assert_eq!(payload["summary"]["comparison"].as_array().unwrap().len(), 2);
        // ties keep the first method listed
        assert_eq!(payload["summary"]["best_model_key"], "lda");

        let entry = entry.unwrap();
        let FittedModel::Classifier(model) = &entry.model else {
            panic!("expected a classifier");
        };
        assert!(model.as_probabilistic().is_some());
    }

    #[test]
    fn test_qda_can_be_served() {
        let cfg: DiscriminantConfig =
            serde_json::from_value(json!({"target": "group", "methods": ["qda"]})).unwrap();
        let (_, entry) = run(&groups(), &cfg).unwrap();
        assert_eq!(entry.unwrap().method, "qda");
    }
}
