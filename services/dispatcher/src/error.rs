//! HTTP error mapping
//!
//! Every handler returns `Result<_, ApiError>`; the `IntoResponse` impl
//! renders the JSON envelope `{"error":{"type":"...","message":"..."}}` with
//! the appropriate status code. Engine and store errors convert via `From`,
//! so handlers can use `?` throughout.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::warn;

/// A request-level failure with its HTTP mapping.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error_type: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error_type: "invalid_request",
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error_type: "not_found",
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error_type: "internal",
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(error_type = self.error_type, message = %self.message, "request failed");
        }
        let body = serde_json::json!({
            "error": {
                "type": self.error_type,
                "message": self.message,
            }
        });
        (
            self.status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}

impl From<social_pool::Error> for ApiError {
    fn from(err: social_pool::Error) -> Self {
        use social_pool::Error;
        let (status, error_type) = match &err {
            Error::PoolNotConfigured { .. } => (StatusCode::NOT_FOUND, "pool_not_configured"),
            Error::PoolExhausted(_) => (StatusCode::SERVICE_UNAVAILABLE, "pool_exhausted"),
            Error::MembershipNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::PoolExists(_) | Error::DuplicateMember(_) => {
                (StatusCode::CONFLICT, "conflict")
            }
            Error::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
        };
        Self {
            status,
            error_type,
            message: err.to_string(),
        }
    }
}

impl From<social_accounts::Error> for ApiError {
    fn from(err: social_accounts::Error) -> Self {
        use social_accounts::Error;
        let (status, error_type) = match &err {
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::Duplicate(_) => (StatusCode::CONFLICT, "conflict"),
            Error::Io(_) | Error::Parse(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error")
            }
        };
        Self {
            status,
            error_type,
            message: err.to_string(),
        }
    }
}
