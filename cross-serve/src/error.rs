//! HTTP error responses
//!
//! Library errors are mapped onto status codes here so handlers can use `?`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use libcrosspost::{CrosspostError, PlatformError};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed or rejected request
    #[error("{0}")]
    BadRequest(String),

    /// Missing caller identity
    #[error("{0}")]
    Unauthorized(String),

    /// Unknown platform, post or missing connection
    #[error("{0}")]
    NotFound(String),

    /// The platform rejected the stored credential
    #[error("{0}")]
    TokenExpired(String),

    /// A vendor API failed
    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) | ApiError::TokenExpired(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::NotFound(_) => "not_found",
            ApiError::TokenExpired(_) => "token_expired",
            ApiError::Upstream(_) => "upstream",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl From<PlatformError> for ApiError {
    fn from(error: PlatformError) -> Self {
        let message = error.to_string();
        match error {
            PlatformError::NotConnected(_) | PlatformError::Unsupported(_) => {
                ApiError::NotFound(message)
            }
            PlatformError::TokenExpired(_) => ApiError::TokenExpired(message),
            PlatformError::Internal(_) => ApiError::Internal(message),
            _ => ApiError::Upstream(message),
        }
    }
}

impl From<CrosspostError> for ApiError {
    fn from(error: CrosspostError) -> Self {
        match error {
            CrosspostError::Validation(message) => ApiError::BadRequest(message),
            CrosspostError::Platform(e) => e.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = %status, "Request rejected");
        }

        let body = json!({
            "success": false,
            "error": self.to_string(),
            "kind": self.kind(),
        });
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
