//! Error types for bookcat-server
//!
//! Every failure leaves the server as `{"ok": false, "error": "<message>"}`,
//! with password-policy failures adding a `details` list.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("{0}")]
    BadRequest(String),

    /// No valid session (401)
    #[error("{0}")]
    Unauthorized(String),

    /// Logged in, but not allowed (403)
    #[error("{0}")]
    Forbidden(String),

    /// Resource not found (404)
    #[error("{0}")]
    NotFound(String),

    /// Conflict (409), e.g. duplicate username or a still-referenced row
    #[error("{0}")]
    Conflict(String),

    /// Upload over the size limit (413)
    #[error("{0}")]
    PayloadTooLarge(String),

    /// Upload of the wrong kind (415)
    #[error("{0}")]
    UnsupportedMediaType(String),

    /// Password rejected by the policy; status is 400 or 422 by endpoint
    #[error("Password does not meet policy")]
    PasswordPolicy {
        status: StatusCode,
        details: Vec<&'static str>,
    },

    /// Internal server error (500)
    #[error("{0}")]
    Internal(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decode/encode error
    #[error("Image processing failed: {0}")]
    Image(#[from] image::ImageError),

    /// ZIP archive error
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// CSV writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// bookcat-common error
    #[error("{0}")]
    Common(#[from] bookcat_common::Error),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::PasswordPolicy { status, .. } => *status,
            ApiError::Common(bookcat_common::Error::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Common(bookcat_common::Error::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_)
            | ApiError::Database(_)
            | ApiError::Io(_)
            | ApiError::Image(_)
            | ApiError::Zip(_)
            | ApiError::Csv(_)
            | ApiError::Common(_)
            | ApiError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = match &self {
            ApiError::PasswordPolicy { details, .. } => json!({
                "ok": false,
                "error": self.to_string(),
                "details": details,
            }),
            _ => json!({
                "ok": false,
                "error": self.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
