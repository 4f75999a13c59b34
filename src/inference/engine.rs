//! Inference engine implementation
//!
//! Serves single-row predictions from the registry:
//! - Sparse record reconstruction through the stored feature encoder
//! - Probability capability with uniform fallback
//! - Label decoding and bounded top-K ranking
//! - Latency and error counters

use crate::error::{Result, StudioError};
use crate::preprocessing::EncodedTarget;
use crate::registry::{FittedModel, ModelRegistry, TrainedModelEntry};
use ndarray::{Array1, Axis};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Maximum number of ranked classes in a prediction
pub const TOP_K: usize = 10;

/// One ranked class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedClass {
    pub class: String,
    pub probability: f64,
}

/// Ranked classes for a classification-style entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassPrediction {
    pub predictions: Vec<RankedClass>,
    pub top_prediction: Option<RankedClass>,
    pub n_features_used: usize,
    pub total_features: usize,
    /// Set when the model has no probability capability
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub uniform_fallback: bool,
}

/// Scalar output of a regression entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuePrediction {
    pub prediction: f64,
    pub n_features_used: usize,
    pub total_features: usize,
}

/// Prediction payload, shaped by the entry's family
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prediction {
    Classes(ClassPrediction),
    Value(ValuePrediction),
}

/// Inference statistics snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceStats {
    pub total_predictions: u64,
    pub error_count: u64,
    pub avg_latency_ms: f64,
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Encode the record against the entry's frozen schema and apply its scaler
fn encode_record(entry: &TrainedModelEntry, features: &Map<String, Value>) -> Result<Array1<f64>> {
    let encoded = entry.encoder.transform_record(features)?;
    let expected = entry.feature_schema().len();
    if encoded.len() != expected {
        return Err(StudioError::EncodingShapeMismatch {
            expected,
            actual: encoded.len(),
        });
    }
    match &entry.scaler {
        Some(scaler) => scaler.transform_row(encoded.view()),
        None => Ok(encoded),
    }
}

/// Run one prediction against a stored entry
pub fn predict_entry(entry: &TrainedModelEntry, features: &Map<String, Value>) -> Result<Prediction> {
    if !entry.model_type.is_servable() {
        return Err(StudioError::ModelTypeMismatch {
            expected: "regression, classification or symptom_matching".to_string(),
            actual: entry.model_type.to_string(),
        });
    }

    let x = encode_record(entry, features)?;
    let n_features_used = entry.encoder.count_non_default(features);
    let total_features = entry.raw_feature_spec().len();
    let row = x.insert_axis(Axis(0));

    match &entry.model {
        FittedModel::Regressor(model) => {
            let y = model.predict(&row)?;
            let prediction = y.first().copied().ok_or_else(|| StudioError::ShapeError {
                expected: "1 prediction".to_string(),
                actual: "0 predictions".to_string(),
            })?;
            Ok(Prediction::Value(ValuePrediction {
                prediction,
                n_features_used,
                total_features,
            }))
        }
        FittedModel::Classifier(model) => {
            let classes = model.classes();
            if classes.is_empty() {
                return Err(StudioError::ModelNotFitted);
            }

            let (proba, uniform_fallback) = match model.as_probabilistic() {
                Some(probabilistic) => (probabilistic.predict_proba(&row)?.row(0).to_vec(), false),
                None => {
                    debug!(model = model.name(), "No probability capability, using uniform distribution");
                    (vec![1.0 / classes.len() as f64; classes.len()], true)
                }
            };
            if proba.len() != classes.len() {
                return Err(StudioError::ShapeError {
                    expected: format!("{} class probabilities", classes.len()),
                    actual: format!("{} class probabilities", proba.len()),
                });
            }

            let mut ranked: Vec<(f64, f64)> = classes.iter().copied().zip(proba).collect();
            // stable sort keeps class order among ties
            ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
            ranked.truncate(TOP_K);

            let predictions = ranked
                .into_iter()
                .map(|(class_id, p)| {
                    Ok(RankedClass {
                        class: EncodedTarget::decode_class(entry.label_codec.as_ref(), class_id)?,
                        probability: round4(p),
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            Ok(Prediction::Classes(ClassPrediction {
                top_prediction: predictions.first().cloned(),
                predictions,
                n_features_used,
                total_features,
                uniform_fallback,
            }))
        }
        FittedModel::Forecaster(_) => Err(StudioError::ModelTypeMismatch {
            expected: "regressor or classifier".to_string(),
            actual: entry.model.kind().to_string(),
        }),
    }
}

/// Registry-backed inference with latency tracking
pub struct InferenceEngine {
    registry: Arc<ModelRegistry>,
    total_predictions: AtomicU64,
    error_count: AtomicU64,
    total_latency_us: AtomicU64,
}

impl InferenceEngine {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self {
            registry,
            total_predictions: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            total_latency_us: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Look up the dataset's current entry and predict with it
    pub fn predict(&self, dataset_id: &str, features: &Map<String, Value>) -> Result<Prediction> {
        let start = Instant::now();
        let result = self
            .registry
            .lookup(dataset_id)
            .and_then(|entry| predict_entry(&entry, features));

        let elapsed = start.elapsed().as_micros() as u64;
        self.total_latency_us.fetch_add(elapsed, Ordering::Relaxed);
        match &result {
            Ok(_) => {
                self.total_predictions.fetch_add(1, Ordering::Relaxed);
                debug!(dataset_id, latency_us = elapsed, "Prediction served");
            }
            Err(e) => {
                self.error_count.fetch_add(1, Ordering::Relaxed);
                warn!(dataset_id, error = %e, "Prediction failed");
            }
        }
        result
    }

    pub fn stats(&self) -> InferenceStats {
        let total = self.total_predictions.load(Ordering::Relaxed);
        let errors = self.error_count.load(Ordering::Relaxed);
        let calls = total + errors;
        let latency = self.total_latency_us.load(Ordering::Relaxed) as f64 / 1000.0;
        InferenceStats {
            total_predictions: total,
            error_count: errors,
            avg_latency_ms: if calls > 0 { latency / calls as f64 } else { 0.0 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::{EncodedTarget, FeatureEncoder, RawValue, Table};
    use crate::registry::ModelType;
    use crate::training::{
        BernoulliNaiveBayes, Classifier, LinearRegression, LinearSVC, Regressor, SVMConfig,
    };
    use serde_json::json;

    fn symptom_rows(n_labels: usize) -> Vec<Value> {
        (0..n_labels * 3)
            .map(|i| {
                let label = i % n_labels;
                json!({
                    "fever": label % 2 == 0,
                    "cough": label % 3 == 0,
                    "rash": (label / 2) % 2 == 0,
                    "disease": format!("d{:03}", label),
                })
            })
            .collect()
    }

    fn classifier_entry(model: Box<dyn Classifier>, n_labels: usize) -> TrainedModelEntry {
        let table = Table::from_json_rows(&symptom_rows(n_labels)).unwrap();
        let features = table
            .select(&["fever".to_string(), "cough".to_string(), "rash".to_string()])
            .unwrap();
        let mut encoder = FeatureEncoder::new();
        let x = encoder.fit_transform(&features).unwrap();
        let target: Vec<RawValue> = table.require("disease").unwrap().values.clone();
        let encoded = EncodedTarget::from_values(&target).unwrap();

        let mut model = model;
        model.fit(&x, &encoded.y).unwrap();
        TrainedModelEntry::new(ModelType::SymptomMatching, encoder, FittedModel::Classifier(model), "bernoulli")
            .with_label_codec(encoded.codec)
    }

    fn record(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_top_k_bound_and_normalization() {
        let entry = classifier_entry(Box::new(BernoulliNaiveBayes::new(1.0)), 40);
        let out = predict_entry(&entry, &record(json!({"fever": true}))).unwrap();

        let Prediction::Classes(pred) = out else { panic!("expected classes") };
        assert_eq!(pred.predictions.len(), TOP_K);
        assert_eq!(pred.total_features, 3);
        assert_eq!(pred.n_features_used, 1);
        assert_eq!(pred.top_prediction.as_ref(), pred.predictions.first());
        for pair in pred.predictions.windows(2) {
            assert!(pair[0].probability >= pair[1].probability);
        }
        assert!(pred.predictions.iter().all(|p| p.class.starts_with('d')));
    }

    #[test]
    fn test_uniform_fallback_without_probabilities() {
        let svm = LinearSVC::new(SVMConfig::default());
        let entry = classifier_entry(Box::new(svm), 4);
        let out = predict_entry(&entry, &record(json!({"fever": true, "cough": false}))).unwrap();

        let Prediction::Classes(pred) = out else { panic!("expected classes") };
        assert!(pred.uniform_fallback);
        assert_eq!(pred.predictions.len(), 4);
        assert!(pred.predictions.iter().all(|p| (p.probability - 0.25).abs() < 1e-12));
    }

    #[test]
    fn test_regression_value() {
        let table = Table::from_json_rows(&[
            json!({"x": 1.0}), json!({"x": 2.0}), json!({"x": 3.0}), json!({"x": 4.0}),
        ])
        .unwrap();
        let mut encoder = FeatureEncoder::new();
        let x = encoder.fit_transform(&table).unwrap();
        let mut model = LinearRegression::new();
        model.fit(&x, &ndarray::array![3.0, 5.0, 7.0, 9.0]).unwrap();
        let entry = TrainedModelEntry::new(ModelType::Regression, encoder, FittedModel::Regressor(Box::new(model)), "linear");

        let Prediction::Value(pred) = predict_entry(&entry, &record(json!({"x": 10.0}))).unwrap() else {
            panic!("expected value")
        };
        assert!((pred.prediction - 21.0).abs() < 1e-6);
        assert_eq!(pred.n_features_used, 1);
    }

    #[test]
    fn test_engine_counts_and_missing_dataset() {
        let registry = Arc::new(ModelRegistry::new());
        let engine = InferenceEngine::new(Arc::clone(&registry));
        let err = engine.predict("nope", &Map::new()).unwrap_err();
        assert!(matches!(err, StudioError::NoTrainedModel(_)));

        registry.store("d", classifier_entry(Box::new(BernoulliNaiveBayes::new(1.0)), 3));
        engine.predict("d", &Map::new()).unwrap();

        let stats = engine.stats();
        assert_eq!(stats.total_predictions, 1);
        assert_eq!(stats.error_count, 1);
    }
}
