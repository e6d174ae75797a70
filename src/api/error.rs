use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::warn;

use crate::engine::EngineError;

/// Boundary error: an HTTP status plus the `{error, description}` body every
/// failure is rendered as.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    description: String,
}

impl ApiError {
    pub fn bad_request(description: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: "Bad Request",
            description: description.into(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        let (status, error) = match &e {
            EngineError::NotFound { .. } => (StatusCode::NOT_FOUND, "Not Found"),
            EngineError::Forbidden(_) => (StatusCode::FORBIDDEN, "Forbidden"),
            EngineError::EmailTaken(_) | EngineError::TimeConflict(_) => {
                (StatusCode::CONFLICT, "Conflict")
            }
            EngineError::InvalidRange { .. }
            | EngineError::NotAvailable(_)
            | EngineError::SelfBooking(_)
            | EngineError::AlreadyDecided(_)
            | EngineError::NotEligible { .. }
            | EngineError::UnknownFilter(_)
            | EngineError::LimitExceeded(_) => (StatusCode::BAD_REQUEST, "Bad Request"),
            EngineError::WalError(_) => {
                // Log the full failure; the client body stays empty of detail.
                tracing::error!("storage failure: {e}");
                return Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    error: "Internal Server Error",
                    description: String::new(),
                };
            }
        };
        Self {
            status,
            error,
            description: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_client_error() {
            warn!("{}: {}", self.error, self.description);
        }
        (
            self.status,
            Json(json!({
                "error": self.error,
                "description": self.description,
            })),
        )
            .into_response()
    }
}
