//! API route definitions

use std::sync::Arc;
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::warn;

use super::{handlers, state::AppState, ServerConfig};

async fn handle_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": true,
            "message": "Not found. Visit /api/health to check API status.",
        })),
    )
}

async fn handle_405() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({
            "error": true,
            "message": "Method not allowed. Check the API documentation for supported methods.",
        })),
    )
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    match config.cors_origin.as_deref() {
        Some(origin) if origin != "*" => match origin.parse::<HeaderValue>() {
            Ok(value) => CorsLayer::new()
                .allow_origin(value)
                .allow_methods(Any)
                .allow_headers(Any),
            Err(_) => {
                warn!(origin, "Invalid CORS_ORIGIN, allowing any origin");
                CorsLayer::permissive()
            }
        },
        _ => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    }
}

/// Every endpoint, relative to its mount point
fn routes() -> Router<Arc<AppState>> {
    Router::new()
        // System
        .route("/health", get(handlers::health_check))
        .route("/system/status", get(handlers::get_system_status))
        // Analyses
        .route("/analyze/symptom-matching/train", post(handlers::train_symptom_matching))
        .route("/analyze/:family", post(handlers::run_analysis))
        // Inference
        .route("/predict", post(handlers::predict))
        // Models
        .route("/models", get(handlers::list_models))
        .route("/models/summary", post(handlers::model_summary))
        .route("/models/plots/:family", post(handlers::model_plots))
}

/// Create the main application router.
///
/// Endpoints answer both at the root and under `/api`.
pub fn create_router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    let api_routes = routes()
        .fallback(handle_404)
        .method_not_allowed_fallback(handle_405);

    Router::new()
        .nest("/api", api_routes)
        .merge(routes())
        .fallback(handle_404)
        .method_not_allowed_fallback(handle_405)
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_upload_size))
        .layer(CompressionLayer::new())
        .layer(cors_layer(config))
        .layer(TraceLayer::new_for_http())
}
