//! Classification analysis
//!
//! The evaluation helper here is shared with discriminant analysis.

use super::config::{ClassificationConfig, ClassificationMethod};
use super::{improves, round4, supervised_data, SERVED_MODEL_FIT};
use crate::error::{Result, StudioError};
use crate::preprocessing::{EncodedTarget, FeatureEncoder, LabelCodec, StandardScaler, Table};
use crate::registry::{FittedModel, ModelType, TrainedModelEntry};
use crate::training::{
    cross_val_accuracy, train_test_split, unique_classes, Classifier, ConfusionMatrix, DecisionTree,
    GaussianNaiveBayes, GradientBoostingClassifier, GradientBoostingConfig, KNNClassifier, LinearSVC,
    LogisticRegression, ModelMetrics, RandomForest, SVMConfig,
};
use ndarray::{Array2, Axis};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

const SAMPLE_SIZE: usize = 100;

/// Encoded features, class identifiers and the hold-out split
pub(super) struct ClassificationData {
    pub encoder: FeatureEncoder,
    pub x: Array2<f64>,
    pub target: EncodedTarget,
    pub classes: Vec<f64>,
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl ClassificationData {
    pub(super) fn prepare(
        table: &Table,
        target: &str,
        features: &[String],
        test_size: f64,
        random_state: u64,
    ) -> Result<Self> {
        let (feature_table, target_values) = supervised_data(table, target, features)?;
        let encoded = EncodedTarget::from_values(&target_values)?;
        let classes = unique_classes(&encoded.y);
        if classes.len() < 2 {
            return Err(StudioError::DataError(format!(
                "Target '{}' needs at least two classes, found {}",
                target,
                classes.len()
            )));
        }

        let mut encoder = FeatureEncoder::new();
        let x = encoder.fit_transform(&feature_table)?;
        let (train, test) = train_test_split(encoded.y.len(), test_size, random_state, Some(&encoded.y))?;

        Ok(Self {
            encoder,
            x,
            target: encoded,
            classes,
            train,
            test,
        })
    }

    pub(super) fn codec(&self) -> Option<&LabelCodec> {
        self.target.codec.as_ref()
    }

    pub(super) fn decode(&self, class_id: f64) -> Result<String> {
        EncodedTarget::decode_class(self.codec(), class_id)
    }

    pub(super) fn label_mapping(&self) -> Value {
        match self.codec() {
            Some(codec) => json!(codec.mapping()),
            None => Value::Null,
        }
    }
}

/// Outcome of one evaluated method
pub(super) struct ClassifierEvaluation {
    pub test_accuracy: f64,
    pub payload: Value,
}

fn metrics_json(m: &ModelMetrics) -> Value {
    json!({
        "accuracy": m.accuracy.map(round4),
        "precision": m.precision.map(round4),
        "recall": m.recall.map(round4),
        "f1": m.f1_score.map(round4),
    })
}

/// Fit on the training rows, score both sides, cross-validate, and build the
/// per-method payload. `x` is the full matrix in the model's feature space.
pub(super) fn evaluate_classifier<F>(
    build: F,
    display_name: &str,
    data: &ClassificationData,
    x: &Array2<f64>,
    cv_folds: usize,
    random_state: u64,
) -> Result<ClassifierEvaluation>
where
    F: Fn() -> Box<dyn Classifier>,
{
    let y = &data.target.y;
    let x_train = x.select(Axis(0), &data.train);
    let y_train = y.select(Axis(0), &data.train);
    let x_test = x.select(Axis(0), &data.test);
    let y_test = y.select(Axis(0), &data.test);

    let mut model = build();
    model.fit(&x_train, &y_train)?;
    let train_pred = model.predict(&x_train)?;
    let test_pred = model.predict(&x_test)?;

    let train_metrics = ModelMetrics::compute_classification(&y_train, &train_pred, &data.classes);
    let test_metrics = ModelMetrics::compute_classification(&y_test, &test_pred, &data.classes);
    let confusion = ConfusionMatrix::compute(&y_test, &test_pred, &data.classes);

    let cross_validation = if cv_folds >= 2 {
        cross_val_accuracy(&build, x, y, cv_folds, random_state)?.map(|cv| {
            json!({
                "mean": round4(cv.mean_score),
                "std": round4(cv.std_score),
                "scores": cv.scores.iter().map(|s| round4(*s)).collect::<Vec<_>>(),
            })
        })
    } else {
        None
    };

    let labels = data
        .classes
        .iter()
        .map(|c| data.decode(*c))
        .collect::<Result<Vec<_>>>()?;
    let predictions_sample = test_pred
        .iter()
        .take(SAMPLE_SIZE)
        .map(|c| data.decode(*c))
        .collect::<Result<Vec<_>>>()?;

    Ok(ClassifierEvaluation {
        test_accuracy: test_metrics.accuracy.unwrap_or(0.0),
        payload: json!({
            "method": display_name,
            "train_metrics": metrics_json(&train_metrics),
            "test_metrics": metrics_json(&test_metrics),
            "cross_validation": cross_validation,
            "confusion_matrix": {
                "labels": labels,
                "matrix": confusion.matrix,
            },
            "predictions_sample": predictions_sample,
            "classes": labels,
        }),
    })
}

fn display_name(method: ClassificationMethod) -> &'static str {
    match method {
        ClassificationMethod::Knn => "K-Nearest Neighbors",
        ClassificationMethod::NaiveBayes => "Naive Bayes",
        ClassificationMethod::DecisionTree => "Decision Tree",
        ClassificationMethod::RandomForest => "Random Forest",
        ClassificationMethod::GradientBoosting => "Gradient Boosting",
        ClassificationMethod::Logistic => "Logistic Regression",
        ClassificationMethod::Svm => "Support Vector Machine",
    }
}

fn build(method: ClassificationMethod, cfg: &ClassificationConfig) -> Box<dyn Classifier> {
    match method {
        ClassificationMethod::Knn => {
            Box::new(KNNClassifier::new(cfg.knn_neighbors).with_weights(cfg.knn_weights))
        }
        ClassificationMethod::NaiveBayes => Box::new(GaussianNaiveBayes::new()),
        ClassificationMethod::DecisionTree => Box::new(
            DecisionTree::new()
                .with_max_depth(cfg.dt_max_depth)
                .with_random_state(cfg.random_state),
        ),
        ClassificationMethod::RandomForest => Box::new(
            RandomForest::new(cfg.rf_n_estimators)
                .with_max_depth(cfg.rf_max_depth)
                .with_random_state(cfg.random_state),
        ),
        ClassificationMethod::GradientBoosting => Box::new(GradientBoostingClassifier::new(GradientBoostingConfig {
            n_estimators: cfg.gb_n_estimators,
            learning_rate: cfg.gb_learning_rate,
            max_depth: cfg.gb_max_depth,
            random_state: cfg.random_state,
            ..GradientBoostingConfig::default()
        })),
        ClassificationMethod::Logistic => Box::new(LogisticRegression::new()),
        ClassificationMethod::Svm => Box::new(LinearSVC::new(SVMConfig {
            c: cfg.svm_c,
            random_state: cfg.random_state,
            ..SVMConfig::default()
        })),
    }
}

pub(super) fn run(table: &Table, cfg: &ClassificationConfig) -> Result<(Value, Option<TrainedModelEntry>)> {
    let target = cfg.target()?;
    if cfg.methods.is_empty() {
        return Err(StudioError::ConfigError(
            "methods must name at least one classification method".to_string(),
        ));
    }

    let data = ClassificationData::prepare(table, target, &cfg.features, cfg.test_size, cfg.random_state)?;

    // one scaler serves every scale-sensitive method, fitted on all rows like the served model
    let scaler = if cfg.methods.iter().any(ClassificationMethod::needs_scaling) {
        let mut scaler = StandardScaler::new();
        scaler.fit(&data.x)?;
        Some(scaler)
    } else {
        None
    };
    let x_scaled = scaler.as_ref().map(|s| s.transform(&data.x)).transpose()?;

    let mut results = Map::new();
    let mut comparison = Vec::new();
    let mut best: Option<(ClassificationMethod, f64)> = None;

    for &method in &cfg.methods {
        let x = match (&x_scaled, method.needs_scaling()) {
            (Some(scaled), true) => scaled,
            _ => &data.x,
        };
        let outcome = evaluate_classifier(
            || build(method, cfg),
            display_name(method),
            &data,
            x,
            cfg.cv_folds,
            cfg.random_state,
        );
        match outcome {
            Ok(eval) => {
                debug!(method = method.key(), accuracy = eval.test_accuracy, "Classification method evaluated");
                comparison.push(json!({
                    "method": display_name(method),
                    "key": method.key(),
                    "test_accuracy": round4(eval.test_accuracy),
                    "cv_mean": eval.payload["cross_validation"]["mean"],
                }));
                if improves(eval.test_accuracy, best.map(|(_, acc)| acc)) {
                    best = Some((method, eval.test_accuracy));
                }
                results.insert(method.key().to_string(), eval.payload);
            }
            Err(e) => {
                warn!(method = method.key(), error = %e, "Classification method failed");
                results.insert(
                    method.key().to_string(),
                    json!({"method": display_name(method), "error": e.to_string()}),
                );
            }
        }
    }

    let (best_method, _) = best
        .ok_or_else(|| StudioError::TrainingError("No classification method could be fitted".to_string()))?;

    let (served_x, served_scaler) = match (x_scaled, best_method.needs_scaling()) {
        (Some(scaled), true) => (scaled, scaler),
        _ => (data.x.clone(), None),
    };
    let mut served = build(best_method, cfg);
    served.fit(&served_x, &data.target.y)?;

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
    .with_scaler(served_scaler)
    .with_label_codec(encoded.codec);
    Ok((payload, Some(entry)))
}
