//! Error handling for the HTTP boundary
//!
//! Every failure leaves the server as the same envelope:
//! `{"success": false, "code": "<MACHINE_CODE>", "message": "<text>"}`.
//! Controllers pick the variant; the message text is what clients display.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::metrics;

/// Failure envelope sent to clients
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always false
    pub success: bool,

    /// Machine-readable error code
    pub code: String,

    /// Human-readable error message
    pub message: String,
}

/// Application error types
#[derive(Debug)]
pub enum AppError {
    // 400: missing or malformed input, message is endpoint specific
    Validation(String),

    // 401
    SessionRequired,
    InvalidCredentials(String),

    // 403: actor does not own the entity
    Forbidden(String),

    // 404: unknown id or an id of the wrong kind
    NotFound(String),

    // 409
    Conflict(String),

    // 500: gateway or bootstrap failure
    Internal(anyhow::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Get error code for client identification
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::SessionRequired => "SESSION_REQUIRED",
            Self::InvalidCredentials(_) => "INVALID_CREDENTIALS",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::SessionRequired | Self::InvalidCredentials(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client
    pub fn message(&self) -> String {
        match self {
            Self::Validation(msg)
            | Self::InvalidCredentials(msg)
            | Self::Forbidden(msg)
            | Self::NotFound(msg)
            | Self::Conflict(msg) => msg.clone(),
            Self::SessionRequired => "Session required".to_string(),
            Self::Internal(err) => format!("Internal error: {err}"),
        }
    }

    /// Convert to the failure envelope
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            success: false,
            code: self.code().to_string(),
            message: self.message(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for AppError {}

/// Convert from anyhow::Error to AppError
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let Self::Internal(err) = &self {
            tracing::error!(error = ?err, "Request failed with internal error");
        }
        metrics::FAILURES_TOTAL
            .with_label_values(&[self.code()])
            .inc();

        (status, Json(self.to_response())).into_response()
    }
}

/// Map a validator failure onto the endpoint's fixed client message
///
/// The underlying violation is logged at debug level; clients only see
/// `message`.
pub trait ValidationErrorExt<T> {
    fn map_validation_err(self, message: &str) -> Result<T>;
}

impl<T, E: fmt::Display> ValidationErrorExt<T> for std::result::Result<T, E> {
    fn map_validation_err(self, message: &str) -> Result<T> {
        self.map_err(|e| {
            tracing::debug!(violation = %e, "Request rejected");
            AppError::Validation(message.to_string())
        })
    }
}

/// Type alias for Results using AppError
pub type Result<T> = std::result::Result<T, AppError>;
