//! Error types for the server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::error::StudioError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Studio(#[from] StudioError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) | ServerError::Json(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Studio(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ServerError::Studio(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ServerError::BadRequest(msg) | ServerError::NotFound(msg) => msg.clone(),
            ServerError::Internal(msg) => {
                tracing::error!(detail = %msg, "Internal server error");
                "An internal error occurred".to_string()
            }
            ServerError::Json(e) => format!("Invalid JSON: {}", e),
            ServerError::Studio(e) if status.is_server_error() => {
                tracing::error!(error = %e, "Internal consistency fault");
                e.to_string()
            }
            ServerError::Studio(e) => e.to_string(),
        };

        let body = Json(json!({
            "error": true,
            "message": message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let missing = ServerError::from(StudioError::NoTrainedModel("d1".to_string()));
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let shape = ServerError::from(StudioError::EncodingShapeMismatch { expected: 3, actual: 2 });
        assert_eq!(shape.status(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(ServerError::NotFound("x".to_string()).status(), StatusCode::NOT_FOUND);
    }
}
