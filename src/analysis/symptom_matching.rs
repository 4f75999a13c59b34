//! Symptom matching: naive Bayes over binary symptom indicators
//!
//! Besides the served model, results carry symptom importance
//! (frequency times variance), row-level cosine similarity between diseases
//! and the most frequent symptoms of the first diseases.

use super::config::{SymptomColumns, SymptomMatchingConfig, SymptomModel};
use super::{round4, supervised_data, SERVED_MODEL_FIT};
use crate::error::{Result, StudioError};
use crate::preprocessing::{stages, ColumnKind, EncodedTarget, FeatureEncoder, LabelCodec, Table};
use crate::registry::{FittedModel, ModelType, TrainedModelEntry};
use crate::training::{
    cross_val_accuracy, train_test_split, unique_classes, BernoulliNaiveBayes, Classifier, ModelMetrics, MultinomialNaiveBayes,
};
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

const IMPORTANCE_LIMIT: usize = 20;
const SIMILAR_PAIRS_LIMIT: usize = 20;
const PROFILED_DISEASES: usize = 20;
const SYMPTOMS_PER_DISEASE: usize = 10;
const EXAMPLE_ROWS: usize = 5;

/// Symptom columns named by the config, or detected: every boolean or
/// numeric column except the disease, `name` and identifier columns
fn symptom_columns(table: &Table, cfg: &SymptomMatchingConfig) -> Result<Vec<String>> {
    match &cfg.symptom_columns {
        SymptomColumns::List(columns) => {
            for c in columns {
                table.require(c)?;
            }
            Ok(columns.clone())
        }
        SymptomColumns::Keyword(k) if k.eq_ignore_ascii_case("auto") => {
            let excluded = |name: &str| {
                name == cfg.disease_column || name == "name" || cfg.id_column.as_deref() == Some(name)
            };
            Ok(table
                .columns()
                .iter()
                .filter(|c| !excluded(&c.name))
                .filter(|c| matches!(stages::classify(&c.values), ColumnKind::Boolean | ColumnKind::Numeric))
                .map(|c| c.name.clone())
                .collect())
        }
        SymptomColumns::Keyword(other) => Err(StudioError::ConfigError(format!(
            "symptom_columns must be \"auto\" or a list of columns, got \"{}\"",
            other
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NbVariant {
    Bernoulli,
    Multinomial,
}

impl NbVariant {
    fn key(&self) -> &'static str {
        match self {
            NbVariant::Bernoulli => "bernoulli",
            NbVariant::Multinomial => "multinomial",
        }
    }

    fn result_key(&self) -> &'static str {
        match self {
            NbVariant::Bernoulli => "bernoulli_nb",
            NbVariant::Multinomial => "multinomial_nb",
        }
    }

    fn display_name(&self) -> &'static str {
        match self {
            NbVariant::Bernoulli => "Bernoulli Naive Bayes",
            NbVariant::Multinomial => "Multinomial Naive Bayes",
        }
    }

    fn build(&self, alpha: f64) -> Box<dyn Classifier> {
        match self {
            NbVariant::Bernoulli => Box::new(BernoulliNaiveBayes::new(alpha)),
            NbVariant::Multinomial => Box::new(MultinomialNaiveBayes::new(alpha)),
        }
    }
}

/// How rows are split for evaluation
enum Evaluation {
    /// Too many classes for the row count; the model is trained on every row
    Unvalidated,
    Split { train: Vec<usize>, test: Vec<usize> },
}

fn plan_evaluation(y: &Array1<f64>, n_classes: usize, cfg: &SymptomMatchingConfig) -> Result<Evaluation> {
    let n = y.len();
    if n_classes as f64 > n as f64 * 0.9 || n < 2 {
        return Ok(Evaluation::Unvalidated);
    }
    let stratify = ((n_classes as f64) < n as f64 / 2.0).then_some(y);
    let (train, test) = train_test_split(n, cfg.test_size, cfg.random_state, stratify)?;
    Ok(Evaluation::Split { train, test })
}

fn ranked_probabilities(
    model: &dyn Classifier,
    row: &Array2<f64>,
    codec: Option<&LabelCodec>,
    top: usize,
) -> Result<Vec<Value>> {
    let Some(probabilistic) = model.as_probabilistic() else {
        return Ok(Vec::new());
    };
    let proba = probabilistic.predict_proba(row)?;
    let mut ranked: Vec<(f64, f64)> = model.classes().iter().copied().zip(proba.row(0).iter().copied()).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
        .into_iter()
        .take(top)
        .map(|(class_id, p)| {
            Ok(json!({
                "disease": EncodedTarget::decode_class(codec, class_id)?,
                "probability": round4(p),
            }))
        })
        .collect()
}

/// Evaluate one variant; returns its payload and held-out accuracy
fn evaluate_variant(
    variant: NbVariant,
    x: &Array2<f64>,
    target: &EncodedTarget,
    n_classes: usize,
    plan: &Evaluation,
    cfg: &SymptomMatchingConfig,
) -> Result<(Value, Option<f64>)> {
    let y = &target.y;
    let (train, test) = match plan {
        Evaluation::Unvalidated => {
            let mut model = variant.build(cfg.alpha);
            model.fit(x, y)?;
            return Ok((
                json!({
                    "model_name": variant.display_name(),
                    "note": "Too many distinct classes for a hold-out split; trained on every row",
                    "accuracy": Value::Null,
                    "train_samples": y.len(),
                    "test_samples": 0,
                    "n_classes": n_classes,
                    "example_predictions": [],
                }),
                None,
            ));
        }
        Evaluation::Split { train, test } => (train, test),
    };

    let x_train = x.select(Axis(0), train);
    let y_train = y.select(Axis(0), train);
    let x_test = x.select(Axis(0), test);
    let y_test = y.select(Axis(0), test);

    let mut model = variant.build(cfg.alpha);
    model.fit(&x_train, &y_train)?;
    let pred = model.predict(&x_test)?;
    let accuracy = ModelMetrics::compute_classification(&y_test, &pred, model.classes())
        .accuracy
        .unwrap_or(0.0);

    let codec = target.codec.as_ref();
    let mut examples = Vec::new();
    for i in 0..test.len().min(EXAMPLE_ROWS) {
        let row = x_test.row(i).to_owned().insert_axis(Axis(0));
        examples.push(json!({
            "true_disease": EncodedTarget::decode_class(codec, y_test[i])?,
            "top_predictions": ranked_probabilities(model.as_ref(), &row, codec, cfg.top_predictions)?,
        }));
    }

    let cross_validation = cross_val_accuracy(|| variant.build(cfg.alpha), &x_train, &y_train, 5, cfg.random_state)?
        .map(|cv| json!({"mean": round4(cv.mean_score), "std": round4(cv.std_score)}));

    Ok((
        json!({
            "model_name": variant.display_name(),
            "accuracy": round4(accuracy),
            "test_size": cfg.test_size,
            "train_samples": train.len(),
            "test_samples": test.len(),
            "n_classes": n_classes,
            "cross_validation": cross_validation,
            "example_predictions": examples,
        }),
        Some(accuracy),
    ))
}

/// Frequency times variance per symptom, most important first
fn symptom_importance(x: &Array2<f64>, symptoms: &[String]) -> Value {
    let n = x.nrows().max(1) as f64;
    let mut scores: Vec<(String, f64, f64, f64)> = symptoms
        .iter()
        .zip(x.axis_iter(Axis(1)))
        .map(|(name, column)| {
            let frequency = column.sum();
            let variance = column.var(0.0);
            let importance = frequency / n * variance * 100.0;
            (name.clone(), frequency, variance, importance)
        })
        .collect();
    scores.sort_by(|a, b| b.3.total_cmp(&a.3));

    let to_json = |(name, frequency, variance, importance): &(String, f64, f64, f64)| {
        json!({
            "symptom": name,
            "frequency": frequency,
            "frequency_pct": (10_000.0 * frequency / n).round() / 100.0,
            "variance": round4(*variance),
            "importance_score": round4(*importance),
        })
    };
    let bottom_start = scores.len().saturating_sub(IMPORTANCE_LIMIT);

    json!({
        "top_symptoms": scores.iter().take(IMPORTANCE_LIMIT).map(to_json).collect::<Vec<_>>(),
        "bottom_symptoms": scores[bottom_start..].iter().map(to_json).collect::<Vec<_>>(),
        "total_symptoms": symptoms.len(),
        "analysis": "frequency x variance",
    })
}

/// Cosine similarity between symptom rows; pairs strictly above the threshold
fn disease_similarity(x: &Array2<f64>, labels: &[String], threshold: f64) -> Value {
    let norms: Vec<f64> = x.rows().into_iter().map(|r| r.dot(&r).sqrt()).collect();
    let n = x.nrows();

    let mut pairs: Vec<(usize, usize, f64)> = (0..n)
        .into_par_iter()
        .flat_map_iter(|i| {
            let norms = &norms;
            (i + 1..n).filter_map(move |j| {
                let denom = norms[i] * norms[j];
                if denom <= 0.0 {
                    return None;
                }
                let sim = x.row(i).dot(&x.row(j)) / denom;
                (sim > threshold).then_some((i, j, sim))
            })
        })
        .collect();
    pairs.sort_by(|a, b| b.2.total_cmp(&a.2).then(a.0.cmp(&b.0)).then(a.1.cmp(&b.1)));

    let top: Vec<Value> = pairs
        .iter()
        .take(SIMILAR_PAIRS_LIMIT)
        .map(|&(i, j, sim)| {
            json!({
                "disease_1": labels[i],
                "disease_2": labels[j],
                "similarity": round4(sim),
            })
        })
        .collect();

    json!({
        "top_20_similar_pairs": top,
        "total_similar_pairs": pairs.len(),
        "similarity_threshold": threshold,
        "matrix_shape": [n, n],
    })
}

/// Symptom counts of the first diseases in row order
fn top_symptoms_per_disease(x: &Array2<f64>, labels: &[String], symptoms: &[String]) -> Value {
    let mut order: Vec<&String> = Vec::new();
    for label in labels {
        if !order.contains(&label) {
            order.push(label);
            if order.len() == PROFILED_DISEASES {
                break;
            }
        }
    }

    let profiles: Vec<Value> = order
        .into_iter()
        .map(|disease| {
            let mut counts = Array1::<f64>::zeros(symptoms.len());
            for (row, _) in x.rows().into_iter().zip(labels).filter(|(_, l)| *l == disease) {
                counts += &row;
            }
            let mut ranked: Vec<(usize, f64)> = counts.iter().copied().enumerate().collect();
            ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
            json!({
                "disease": disease,
                "total_symptom_count": counts.sum(),
                "top_symptoms": ranked
                    .into_iter()
                    .take(SYMPTOMS_PER_DISEASE)
                    .map(|(j, count)| json!({"symptom": symptoms[j], "count": count}))
                    .collect::<Vec<_>>(),
            })
        })
        .collect();
    Value::Array(profiles)
}

pub(super) fn run(table: &Table, cfg: &SymptomMatchingConfig) -> Result<(Value, Option<TrainedModelEntry>)> {
    let symptoms = symptom_columns(table, cfg)?;
    if symptoms.is_empty() {
        return Err(StudioError::DataError("No symptom columns found".to_string()));
    }

    let (symptom_table, disease_values) = supervised_data(table, &cfg.disease_column, &symptoms)?;
    let target = EncodedTarget::from_values(&disease_values)?;
    let labels = disease_values
        .iter()
        .map(|v| v.label().unwrap_or_default())
        .collect::<Vec<_>>();
    let n_classes = unique_classes(&target.y).len();
    if n_classes < 2 {
        return Err(StudioError::DataError(
            "Symptom matching needs at least two distinct diseases".to_string(),
        ));
    }

    let mut encoder = FeatureEncoder::new();
    let x = encoder.fit_transform(&symptom_table)?;
    let symptom_names = encoder.feature_schema().columns().to_vec();
    info!(
        diseases = labels.len(),
        symptoms = symptom_names.len(),
        classes = n_classes,
        "Symptom matrix encoded"
    );

    let variants: &[NbVariant] = match cfg.model {
        SymptomModel::Bernoulli => &[NbVariant::Bernoulli],
        SymptomModel::Multinomial => &[NbVariant::Multinomial],
        SymptomModel::All => &[NbVariant::Bernoulli, NbVariant::Multinomial],
    };
    let plan = plan_evaluation(&target.y, n_classes, cfg)?;

    let mut payload = json!({
        "success": true,
        "model_type": ModelType::SymptomMatching,
        "disease_column": cfg.disease_column,
        "total_diseases": labels.len(),
        "total_symptoms": symptom_names.len(),
        "symptom_columns": symptom_names,
    });

    let mut served: Option<(NbVariant, Option<f64>)> = None;
    for &variant in variants {
        match evaluate_variant(variant, &x, &target, n_classes, &plan, cfg) {
            Ok((result, accuracy)) => {
                debug!(model = variant.key(), ?accuracy, "Symptom model evaluated");
                let better = match served {
                    None => true,
                    Some((_, best)) => accuracy.unwrap_or(0.0) > best.unwrap_or(0.0),
                };
                if better {
                    served = Some((variant, accuracy));
                }
                payload[variant.result_key()] = result;
            }
            Err(e) => {
                warn!(model = variant.key(), error = %e, "Symptom model failed");
                payload[variant.result_key()] = json!({"model_name": variant.display_name(), "error": e.to_string()});
            }
        }
    }

    let (variant, _) =
        served.ok_or_else(|| StudioError::TrainingError("No symptom model could be fitted".to_string()))?;
    let mut model = variant.build(cfg.alpha);
    model.fit(&x, &target.y)?;

    payload["symptom_importance"] = symptom_importance(&x, &symptom_names);
    payload["disease_similarity"] = disease_similarity(&x, &labels, cfg.similarity_threshold);
    payload["top_symptoms_per_disease"] = top_symptoms_per_disease(&x, &labels, &symptom_names);
    payload["served_model"] = json!(variant.key());
    payload["label_mapping"] = target.codec.as_ref().map_or(Value::Null, |c| json!(c.mapping()));
    payload["served_model_fit"] = json!(SERVED_MODEL_FIT);

    let entry = TrainedModelEntry::new(
        ModelType::SymptomMatching,
        encoder,
        FittedModel::Classifier(model),
        variant.key(),
    )
    .with_label_codec(target.codec);
    Ok((payload, Some(entry)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diseases(copies: usize) -> Table {
        let profiles = [
            ("flu", [true, true, false, false]),
            ("cold", [false, true, true, false]),
            ("measles", [true, false, false, true]),
        ];
        let mut rows = Vec::new();
        let mut id = 0;
        for _ in 0..copies {
            for (name, s) in profiles {
                id += 1;
                rows.push(json!({
                    "id": id,
                    "name": name,
                    "fever": s[0],
                    "cough": s[1],
                    "sneezing": s[2],
                    "rash": s[3],
                    "notes": "n/a",
                }));
            }
        }
        Table::from_json_rows(&rows).unwrap()
    }

    #[test]
    fn test_auto_detection_skips_id_name_and_text() {
        let cfg = SymptomMatchingConfig::default();
        let columns = symptom_columns(&diseases(1), &cfg).unwrap();
        assert_eq!(columns, vec!["fever", "cough", "sneezing", "rash"]);
    }

    #[test]
    fn test_split_and_served_model() {
        let cfg: SymptomMatchingConfig = serde_json::from_value(json!({"model": "all"})).unwrap();
        let (payload, entry) = run(&diseases(10), &cfg).unwrap();

        assert_eq!(payload["bernoulli_nb"]["accuracy"].as_f64().unwrap(), 1.0);
        assert!(payload["multinomial_nb"]["accuracy"].is_number());
        assert_eq!(payload["total_symptoms"], 4);
        assert_eq!(payload["served_model"], "bernoulli");

        let top = &payload["top_symptoms_per_disease"];
        assert_eq!(top.as_array().unwrap().len(), 3);
        assert_eq!(top[0]["disease"], "flu");
        assert_eq!(top[0]["total_symptom_count"].as_f64().unwrap(), 20.0);

        let entry = entry.unwrap();
        assert_eq!(entry.model_type, ModelType::SymptomMatching);
        assert_eq!(entry.n_classes(), Some(3));
    }

    #[test]
    fn test_one_row_per_disease_trains_on_everything() {
        let cfg = SymptomMatchingConfig::default();
        let (payload, entry) = run(&diseases(1), &cfg).unwrap();
        assert!(payload["bernoulli_nb"]["accuracy"].is_null());
        assert_eq!(payload["bernoulli_nb"]["train_samples"], 3);
        assert!(entry.is_some());
    }

    #[test]
    fn test_similarity_threshold_is_strict() {
        let x = ndarray::array![[1.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let labels = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let out = disease_similarity(&x, &labels, 0.3);
        assert_eq!(out["total_similar_pairs"], 1);
        assert_eq!(out["top_20_similar_pairs"][0]["similarity"].as_f64().unwrap(), 1.0);

        let none = disease_similarity(&x, &labels, 1.0);
        assert_eq!(none["total_similar_pairs"], 0);
    }
}
