//! HTTP mapping for domain errors: status code plus `{"error": "..."}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::types::GameError;

impl GameError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GameError::AccountNotFound(_) => StatusCode::NOT_FOUND,
            GameError::WagerNotFound(_)
            | GameError::InsufficientEnergy { .. }
            | GameError::InsufficientBalance { .. }
            | GameError::InvalidState { .. }
            | GameError::InvalidRequest(_)
            | GameError::SignatureInvalid(_) => StatusCode::BAD_REQUEST,
            GameError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            GameError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GameError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
