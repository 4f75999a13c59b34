//! Integration test: single-record inference against symptom models

use stat_studio::inference::TOP_K;
use stat_studio::server::{create_router, AppState, ServerConfig};
use std::sync::Arc;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

const SYMPTOMS: [&str; 5] = ["fever", "cough", "rash", "fatigue", "nausea"];

fn test_app() -> (axum::Router, Arc<AppState>) {
    let config = ServerConfig::default();
    let state = Arc::new(AppState::new(config.clone()));
    (create_router(Arc::clone(&state), &config), state)
}

async fn post(app: &axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 4 * 1024 * 1024).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

/// Boolean symptom rows; each disease has a fixed symptom pattern
fn symptom_rows(n_rows: usize, n_diseases: usize) -> Vec<Value> {
    (0..n_rows)
        .map(|i| {
            let disease = i % n_diseases;
            let pattern = disease % 32;
            let mut row = serde_json::Map::new();
            for (j, symptom) in SYMPTOMS.iter().enumerate() {
                row.insert(symptom.to_string(), json!((pattern >> j) & 1 == 1));
            }
            row.insert("name".to_string(), json!(format!("disease_{:02}", disease)));
            Value::Object(row)
        })
        .collect()
}

fn probabilities(body: &Value) -> Vec<f64> {
    body["predictions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["probability"].as_f64().unwrap())
        .collect()
}

#[tokio::test]
async fn test_sparse_symptom_record_top_k() {
    let (app, _) = test_app();
    let (status, body) = post(
        &app,
        "/api/analyze/symptom-matching/train",
        json!({
            "data": symptom_rows(431, 50),
            "config": {"model": "bernoulli"},
            "dataset_id": "clinic",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["total_diseases"], 431);
    assert_eq!(body["total_symptoms"], 5);
    assert_eq!(body["served_model"], "bernoulli");

    let (status, body) = post(
        &app,
        "/api/predict",
        json!({"dataset_id": "clinic", "features": {"fever": true, "cough": true}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["n_features_used"], 2);
    assert_eq!(body["total_features"], 5);

    let probs = probabilities(&body);
    assert_eq!(probs.len(), TOP_K);
    assert!(probs.windows(2).all(|w| w[0] >= w[1]));
    let total: f64 = probs.iter().sum();
    assert!(total > 0.5 && total <= 1.0 + 1e-3, "top-k mass was {}", total);

    // fever + cough only is pattern 0b00011; diseases 3 and 35 carry it
    let top = body["top_prediction"]["class"].as_str().unwrap();
    assert!(top == "disease_03" || top == "disease_35", "top was {}", top);
}

#[tokio::test]
async fn test_few_classes_return_full_distribution() {
    let (app, _) = test_app();
    let (status, _) = post(
        &app,
        "/api/analyze/symptom-matching",
        json!({"data": symptom_rows(80, 8), "config": {"model": "all"}, "dataset_id": "small"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post(
        &app,
        "/api/predict",
        json!({"dataset_id": "small", "features": {"rash": true}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let probs = probabilities(&body);
    assert_eq!(probs.len(), 8);
    let total: f64 = probs.iter().sum();
    assert!((total - 1.0).abs() < 1e-3);
    assert_eq!(body["n_features_used"], 1);
}

#[tokio::test]
async fn test_unseen_keys_and_values_do_not_break_inference() {
    let (app, _) = test_app();
    let (status, _) = post(
        &app,
        "/api/analyze/symptom-matching",
        json!({"data": symptom_rows(60, 6), "config": {"model": "bernoulli"}, "dataset_id": "odd"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post(
        &app,
        "/api/predict",
        json!({"dataset_id": "odd", "features": {"fever": true, "sneezing": true, "cough": null}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["n_features_used"], 1);
    assert_eq!(probabilities(&body).len(), 6);
}

#[tokio::test]
async fn test_predict_after_overwrite_uses_new_schema() {
    let (app, state) = test_app();
    let (status, _) = post(
        &app,
        "/api/analyze/symptom-matching",
        json!({"data": symptom_rows(60, 6), "config": {"model": "bernoulli"}, "dataset_id": "x"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state.registry.lookup("x").unwrap().raw_feature_spec().len(), 5);

    let narrow: Vec<Value> = symptom_rows(60, 6)
        .into_iter()
        .map(|row| json!({"fever": row["fever"], "cough": row["cough"], "name": row["name"]}))
        .collect();
    let (status, _) = post(
        &app,
        "/api/analyze/symptom-matching",
        json!({"data": narrow, "config": {"model": "multinomial"}, "dataset_id": "x"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post(
        &app,
        "/api/predict",
        json!({"dataset_id": "x", "features": {"fever": true, "rash": true}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_features"], 2);
    assert_eq!(body["n_features_used"], 1);
    assert_eq!(state.registry.lookup("x").unwrap().method, "multinomial");
}
