//! HTTP request handlers

use std::sync::Arc;
use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::analysis::{self, AnalysisFamily, AnalysisOutcome, SERVED_MODEL_FIT};
use crate::preprocessing::Table;
use crate::registry::{ModelType, TrainedModelEntry};

use super::error::{Result, ServerError};
use super::state::AppState;

/// Dataset id used when an analyze request names none
pub const DEFAULT_DATASET_ID: &str = "default";

/// Bodies are parsed here rather than through the `Json` extractor so that
/// malformed input gets the same JSON error shape as every other failure.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    if body.is_empty() {
        return Err(ServerError::BadRequest("Request body is empty".to_string()));
    }
    Ok(serde_json::from_slice(body)?)
}

fn required_dataset_id(dataset_id: Option<String>) -> Result<String> {
    dataset_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ServerError::BadRequest("dataset_id is required".to_string()))
}

fn lookup_entry(state: &AppState, dataset_id: &str) -> Result<Arc<TrainedModelEntry>> {
    state
        .registry
        .get(dataset_id)
        .ok_or_else(|| ServerError::NotFound(format!("No trained model found for dataset '{}'", dataset_id)))
}

// ============================================================================
// System Handlers
// ============================================================================

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn get_system_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let system_info = state.get_system_info();

    Json(json!({
        "system": system_info,
        "registry": {
            "models_count": state.registry.len(),
            "capacity": state.registry.capacity(),
        },
        "inference": state.engine.stats(),
        "uptime_secs": state.uptime_secs(),
        "status": "healthy",
    }))
}

pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<Value> {
    let models = state.registry.describe();
    Json(json!({
        "count": models.len(),
        "models": models,
    }))
}

// ============================================================================
// Analysis Handlers
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    data: Vec<Value>,
    #[serde(default)]
    config: Value,
    dataset_id: Option<String>,
}

async fn analyze(state: Arc<AppState>, family: AnalysisFamily, request: AnalyzeRequest) -> Result<Json<Value>> {
    let dataset_id = request
        .dataset_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DATASET_ID.to_string());
    let AnalyzeRequest { data, config, .. } = request;
    if data.is_empty() {
        return Err(ServerError::BadRequest("data must be a non-empty array of rows".to_string()));
    }

    info!(dataset_id = %dataset_id, family = %family, rows = data.len(), "Analysis requested");

    let AnalysisOutcome { mut results, entry } =
        tokio::task::spawn_blocking(move || -> crate::error::Result<AnalysisOutcome> {
            let table = Table::from_json_rows(&data)?;
            analysis::run_analysis(family, &table, &config)
        })
        .await
        .map_err(|e| ServerError::Internal(format!("Analysis task failed: {}", e)))??;

    let stored = match entry {
        Some(entry) => {
            state.registry.store(dataset_id.clone(), entry);
            true
        }
        None => false,
    };

    if let Value::Object(map) = &mut results {
        map.insert("dataset_id".to_string(), json!(dataset_id));
        map.insert("model_stored".to_string(), json!(stored));
    }
    Ok(Json(results))
}

/// Run one analysis family and store its served model under `dataset_id`
pub async fn run_analysis(
    State(state): State<Arc<AppState>>,
    Path(family): Path<String>,
    body: Bytes,
) -> Result<Json<Value>> {
    let family: AnalysisFamily = family.parse()?;
    let request = parse_body(&body)?;
    analyze(state, family, request).await
}

pub async fn train_symptom_matching(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Value>> {
    let request = parse_body(&body)?;
    analyze(state, AnalysisFamily::SymptomMatching, request).await
}

// ============================================================================
// Inference Handlers
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    dataset_id: Option<String>,
    #[serde(default)]
    features: Map<String, Value>,
}

pub async fn predict(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Value>> {
    let request: PredictRequest = parse_body(&body)?;
    let dataset_id = required_dataset_id(request.dataset_id)?;

    let prediction = state.engine.predict(&dataset_id, &request.features)?;
    Ok(Json(serde_json::to_value(prediction)?))
}

// ============================================================================
// Model Summary / Plot Handlers
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ModelRequest {
    dataset_id: Option<String>,
    model_type: Option<String>,
}

/// Training config with data, feature and target keys removed
fn hyperparameters(config: &Value) -> Value {
    let params: Map<String, Value> = config
        .as_object()
        .map(|map| {
            map.iter()
                .filter(|(key, _)| *key != "data" && !key.contains("feature") && !key.contains("target"))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        })
        .unwrap_or_default();
    Value::Object(params)
}

/// Per-method result of the served model inside a stored payload
fn served_result(entry: &TrainedModelEntry) -> &Value {
    let results = &entry.results;
    match entry.model_type {
        ModelType::SymptomMatching => &results[format!("{}_nb", entry.method).as_str()],
        ModelType::TimeSeries => &results["models"][entry.method.as_str()],
        ModelType::Regression | ModelType::Classification => &results["results"][entry.method.as_str()],
    }
}

fn metrics(entry: &TrainedModelEntry) -> Value {
    let served = served_result(entry);
    match entry.model_type {
        ModelType::SymptomMatching => json!({
            "accuracy": served["accuracy"],
            "cross_validation": served["cross_validation"],
        }),
        ModelType::TimeSeries => served["test_metrics"].clone(),
        ModelType::Classification => json!({
            "train": served["train_metrics"],
            "test": served["test_metrics"],
            "cross_validation": served["cross_validation"],
        }),
        ModelType::Regression => json!({
            "train": served["train_metrics"],
            "test": served["test_metrics"],
        }),
    }
}

pub async fn model_summary(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Value>> {
    let request: ModelRequest = parse_body(&body)?;
    let dataset_id = required_dataset_id(request.dataset_id)?;
    let entry = lookup_entry(&state, &dataset_id)?;
    if let Some(model_type) = request.model_type.as_deref() {
        entry.expect_type(model_type.parse()?)?;
    }

    let served = served_result(&entry);
    let algorithm = served
        .get("method")
        .or_else(|| served.get("model_name"))
        .cloned()
        .unwrap_or_else(|| json!(entry.method));

    Ok(Json(json!({
        "success": true,
        "dataset_id": dataset_id,
        "model_type": entry.model_type,
        "algorithm": algorithm,
        "method": entry.method,
        "hyperparameters": hyperparameters(&entry.training_config),
        "metrics": metrics(&entry),
        "n_features": entry.raw_feature_spec().len(),
        "n_encoded_features": entry.feature_schema().len(),
        "feature_names": entry.raw_feature_spec().columns(),
        "n_classes": entry.n_classes(),
        "trained_at": entry.trained_at,
        "served_model_fit": SERVED_MODEL_FIT,
    })))
}

pub async fn model_plots(
    State(state): State<Arc<AppState>>,
    Path(family): Path<String>,
    body: Bytes,
) -> Result<Json<Value>> {
    let model_type: ModelType = family.parse()?;
    let request: ModelRequest = parse_body(&body)?;
    let dataset_id = required_dataset_id(request.dataset_id)?;
    let entry = lookup_entry(&state, &dataset_id)?;
    entry.expect_type(model_type)?;

    let served = served_result(&entry);
    let plot = match model_type {
        ModelType::Classification => json!({
            "plot_type": "confusion_matrix",
            "model": served["method"],
            "labels": served["confusion_matrix"]["labels"],
            "matrix": served["confusion_matrix"]["matrix"],
        }),
        ModelType::Regression => json!({
            "plot_type": "predicted_vs_actual",
            "model": served["method"],
            "predicted": served["predictions_sample"],
            "actual": served["actual_sample"],
            "residuals": served["residuals_sample"],
        }),
        ModelType::TimeSeries => json!({
            "plot_type": "forecast",
            "model": served["method"],
            "history": entry.results["history"],
            "forecast": served["forecast"],
            "test": {
                "dates": served["test_index"],
                "predicted": served["test_predictions"],
                "actual": served["test_actual"],
            },
        }),
        ModelType::SymptomMatching => json!({
            "plot_type": "symptom_importance",
            "model": served["model_name"],
            "top_symptoms": entry.results["symptom_importance"]["top_symptoms"],
            "bottom_symptoms": entry.results["symptom_importance"]["bottom_symptoms"],
        }),
    };

    Ok(Json(json!({
        "success": true,
        "dataset_id": dataset_id,
        "model_type": entry.model_type,
        "plot": plot,
    })))
}
