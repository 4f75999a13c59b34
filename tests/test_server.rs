//! Integration test: Server API endpoints

use stat_studio::server::{create_router, AppState, ServerConfig};
use std::sync::Arc;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_app() -> (axum::Router, Arc<AppState>) {
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        max_upload_size: 10 * 1024 * 1024,
        cors_origin: None,
        registry_capacity: None,
    };
    let state = Arc::new(AppState::new(config.clone()));
    (create_router(Arc::clone(&state), &config), state)
}

async fn get(app: &axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn post(app: &axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    post_raw(app, uri, body.to_string()).await
}

async fn post_raw(app: &axum::Router, uri: &str, body: String) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 4 * 1024 * 1024).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn housing_rows(n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| {
            let size = 50.0 + i as f64;
            let city = if i % 2 == 0 { "north" } else { "south" };
            let bonus = if city == "north" { 10.0 } else { 0.0 };
            json!({"size": size, "city": city, "price": 3.0 * size + bonus + 5.0})
        })
        .collect()
}

fn flower_rows(n_per_class: usize) -> Vec<Value> {
    let mut rows = Vec::new();
    for i in 0..n_per_class {
        let jitter = (i % 5) as f64 * 0.05;
        rows.push(json!({"petal": 1.0 + jitter, "sepal": 3.0 - jitter, "species": "setosa"}));
        rows.push(json!({"petal": 4.0 + jitter, "sepal": 2.5 + jitter, "species": "versicolor"}));
        rows.push(json!({"petal": 6.0 + jitter, "sepal": 3.5 - jitter, "species": "virginica"}));
    }
    rows
}

fn daily_rows(n: usize) -> Vec<Value> {
    let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    (0..n)
        .map(|i| {
            let date = start + chrono::Duration::days(i as i64);
            let wobble = [0.0, 0.3, -0.2][i % 3];
            json!({"day": date.format("%Y-%m-%d").to_string(), "sales": 10.0 + 0.5 * i as f64 + wobble})
        })
        .collect()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = test_app();
    let (status, body) = get(&app, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_system_status_endpoint() {
    let (app, _) = test_app();
    let (status, body) = get(&app, "/api/system/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["registry"]["models_count"], 0);
    assert!(body["system"]["cpu_count"].is_number());
}

#[tokio::test]
async fn test_unknown_route_returns_json_404() {
    let (app, _) = test_app();
    let (status, body) = get(&app, "/api/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], true);
}

#[tokio::test]
async fn test_wrong_method_returns_json_405() {
    let (app, _) = test_app();
    let (status, body) = get(&app, "/api/predict").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["error"], true);
}

#[tokio::test]
async fn test_predict_requires_dataset_id() {
    let (app, _) = test_app();
    let (status, body) = post(&app, "/api/predict", json!({"features": {"a": 1}})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("dataset_id"));
}

#[tokio::test]
async fn test_predict_without_trained_model() {
    let (app, _) = test_app();
    let (status, body) = post(&app, "/api/predict", json!({"dataset_id": "nope", "features": {}})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn test_root_predict_is_routed() {
    let (app, _) = test_app();
    let (status, body) = post(&app, "/predict", json!({"dataset_id": "x", "features": {}})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("'x'"));
}

#[tokio::test]
async fn test_root_and_api_prefix_share_the_registry() {
    let (app, state) = test_app();
    let (status, _) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = post(
        &app,
        "/analyze/regression",
        json!({"data": housing_rows(20), "config": {"target": "price", "methods": ["linear"]}, "dataset_id": "homes"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(state.registry.contains("homes"));

    let (status, body) = post(
        &app,
        "/api/predict",
        json!({"dataset_id": "homes", "features": {"size": 60.0, "city": "south"}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["prediction"].is_number());

    let (status, body) = get(&app, "/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], true);
}

#[tokio::test]
async fn test_predict_with_invalid_json() {
    let (app, _) = test_app();
    let (status, body) = post_raw(&app, "/api/predict", "{not json".to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], true);
}

#[tokio::test]
async fn test_analyze_rejects_unknown_family_and_empty_data() {
    let (app, _) = test_app();
    let (status, _) = post(&app, "/api/analyze/neural", json!({"data": housing_rows(10)})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(&app, "/api/analyze/regression", json!({"data": [], "config": {"target": "price"}})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_analyze_missing_target_column() {
    let (app, state) = test_app();
    let (status, body) = post(
        &app,
        "/api/analyze/regression",
        json!({"data": housing_rows(20), "config": {"target": "rent"}}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("rent"));
    assert!(state.registry.is_empty());
}

#[tokio::test]
async fn test_regression_train_predict_summary_plots() {
    let (app, state) = test_app();
    let (status, body) = post(
        &app,
        "/api/analyze/regression",
        json!({
            "data": housing_rows(40),
            "config": {"target": "price", "methods": ["linear", "ridge"], "ridge_alpha": 0.5},
            "dataset_id": "houses",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dataset_id"], "houses");
    assert_eq!(body["model_stored"], true);
    assert_eq!(body["served_model_fit"], "full_dataset");
    assert!(state.registry.contains("houses"));

    let (status, body) = post(
        &app,
        "/api/predict",
        json!({"dataset_id": "houses", "features": {"size": 60, "city": "north"}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let prediction = body["prediction"].as_f64().unwrap();
    assert!((prediction - 195.0).abs() < 1.0, "prediction was {}", prediction);
    assert_eq!(body["n_features_used"], 2);
    assert_eq!(body["total_features"], 2);

    let (status, body) = post(
        &app,
        "/api/models/summary",
        json!({"dataset_id": "houses", "model_type": "regression"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["method"], "linear");
    assert_eq!(body["n_features"], 2);
    assert_eq!(body["hyperparameters"]["ridge_alpha"], 0.5);
    assert!(body["hyperparameters"].get("target").is_none());
    assert!(body["metrics"]["test"]["r2"].as_f64().unwrap() > 0.99);

    let (status, _) = post(
        &app,
        "/api/models/summary",
        json!({"dataset_id": "houses", "model_type": "classification"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(&app, "/api/models/summary", json!({"dataset_id": "flats"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = post(&app, "/api/models/plots/regression", json!({"dataset_id": "houses"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["plot"]["plot_type"], "predicted_vs_actual");
    assert_eq!(body["plot"]["predicted"].as_array().unwrap().len(), 8);
    assert_eq!(body["plot"]["residuals"].as_array().unwrap().len(), 8);

    let (status, body) = get(&app, "/api/models").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["models"][0]["dataset_id"], "houses");
    assert_eq!(body["models"][0]["model_type"], "regression");
}

#[tokio::test]
async fn test_classification_predict_ranks_decoded_labels() {
    let (app, _) = test_app();
    let (status, body) = post(
        &app,
        "/api/analyze/classification",
        json!({
            "data": flower_rows(20),
            "config": {"target": "species", "methods": ["knn", "naive_bayes"], "cv_folds": 3},
            "dataset_id": "flowers",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["n_classes"], 3);

    let (status, body) = post(
        &app,
        "/api/predict",
        json!({"dataset_id": "flowers", "features": {"petal": 6.1, "sepal": 3.4}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["top_prediction"]["class"], "virginica");
    let predictions = body["predictions"].as_array().unwrap();
    assert_eq!(predictions.len(), 3);
    let total: f64 = predictions.iter().map(|p| p["probability"].as_f64().unwrap()).sum();
    assert!((total - 1.0).abs() < 1e-3);

    let (status, body) = post(&app, "/api/models/plots/classification", json!({"dataset_id": "flowers"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["plot"]["labels"], json!(["setosa", "versicolor", "virginica"]));
    assert_eq!(body["plot"]["matrix"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_svm_serves_uniform_distribution() {
    let (app, _) = test_app();
    let (status, _) = post(
        &app,
        "/api/analyze/classification",
        json!({
            "data": flower_rows(15),
            "config": {"target": "species", "methods": ["svm"]},
            "dataset_id": "svm",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post(&app, "/api/predict", json!({"dataset_id": "svm", "features": {"petal": 1.0}})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["uniform_fallback"], true);
    for p in body["predictions"].as_array().unwrap() {
        assert!((p["probability"].as_f64().unwrap() - 0.3333).abs() < 1e-3);
    }
}

#[tokio::test]
async fn test_time_series_is_not_servable() {
    let (app, _) = test_app();
    let (status, body) = post(
        &app,
        "/api/analyze/time-series",
        json!({
            "data": daily_rows(40),
            "config": {"date_column": "day", "target_column": "sales", "forecast_periods": 5},
            "dataset_id": "sales",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_stored"], true);

    let (status, _) = post(&app, "/api/predict", json!({"dataset_id": "sales", "features": {}})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post(&app, "/api/models/plots/time-series", json!({"dataset_id": "sales"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["plot"]["plot_type"], "forecast");
    assert_eq!(body["plot"]["forecast"]["values"].as_array().unwrap().len(), 5);
    assert_eq!(body["plot"]["history"]["values"].as_array().unwrap().len(), 40);
}

#[tokio::test]
async fn test_clustering_stores_nothing() {
    let (app, state) = test_app();
    let mut rows = Vec::new();
    for i in 0..10 {
        let d = i as f64 * 0.01;
        rows.push(json!({"x": d, "y": d}));
        rows.push(json!({"x": 10.0 + d, "y": 10.0 - d}));
    }
    let (status, body) = post(
        &app,
        "/api/analyze/clustering-advanced",
        json!({"data": rows, "config": {"n_clusters": 2}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_stored"], false);
    assert_eq!(body["results"]["kmeans"]["labels"].as_array().unwrap().len(), 20);
    assert!(state.registry.is_empty());
}

#[tokio::test]
async fn test_neural_network_is_servable() {
    let (app, _) = test_app();
    let (status, body) = post(
        &app,
        "/analyze/neural-networks",
        json!({
            "data": flower_rows(15),
            "config": {"target": "species", "hidden_layers": [16], "epochs": 300, "learning_rate": 0.01},
            "dataset_id": "mlp",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_stored"], true);
    assert!(body["results"]["mlp"]["architecture"]["n_parameters"].as_u64().unwrap() > 0);

    let (status, body) = post(&app, "/predict", json!({"dataset_id": "mlp", "features": {"petal": 1.0, "sepal": 3.0}})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["top_prediction"]["class"], "setosa");
    assert_eq!(body["predictions"].as_array().unwrap().len(), 3);

    let (status, body) = post(&app, "/models/summary", json!({"dataset_id": "mlp"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["method"], "mlp");
    assert_eq!(body["algorithm"], "Multi-Layer Perceptron");
}

#[tokio::test]
async fn test_retrain_replaces_entry() {
    let (app, state) = test_app();
    let (status, _) = post(
        &app,
        "/api/analyze/classification",
        json!({"data": flower_rows(10), "config": {"target": "species", "methods": ["knn"]}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state.registry.lookup("default").unwrap().method, "knn");

    let (status, _) = post(
        &app,
        "/api/analyze/regression",
        json!({"data": housing_rows(30), "config": {"target": "price"}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state.registry.len(), 1);

    let (status, body) = post(
        &app,
        "/api/predict",
        json!({"dataset_id": "default", "features": {"size": 70, "city": "south", "petal": 4.0}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("predictions").is_none());
    assert!((body["prediction"].as_f64().unwrap() - 215.0).abs() < 1.0);
}
