//! Error types and handling
//!
//! Every handler returns [`AppResult`]. Errors are converted to a consistent
//! JSON body; server-side failures are logged in full while the client only
//! sees a generic message.

use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request - malformed input (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Unauthorized - authentication required (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Forbidden - wrong role or account state (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Conflict - duplicate unique key or state conflict (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Business-rule or schema violation with per-field messages (400)
    #[error("Validation error: {message}")]
    ValidationError {
        message: String,
        fields: BTreeMap<String, Vec<String>>,
    },

    /// Payment declined by the (simulated) processor (402)
    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    /// Rate limit exceeded (429)
    #[error("Too many requests")]
    TooManyRequests,

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Service unavailable (503)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        AppError::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        AppError::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }

    /// Validation failure on a single field
    pub fn invalid_field(field: &str, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        let mut fields = BTreeMap::new();
        fields.insert(field.to_string(), vec![msg.clone()]);
        AppError::ValidationError {
            message: msg,
            fields,
        }
    }

    /// Validation failure collected over several fields
    pub fn invalid_fields(fields: BTreeMap<String, Vec<String>>) -> Self {
        AppError::ValidationError {
            message: "One or more fields are invalid".to_string(),
            fields,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::ValidationError { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PaymentDeclined(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) | AppError::Database(_) | AppError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Error response body
#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    /// Error type identifier
    pub error: String,
    /// Human-readable error message
    pub message: String,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_type = match &self {
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::Conflict(_) => "conflict",
            AppError::ValidationError { .. } => "validation_error",
            AppError::PaymentDeclined(_) => "payment_declined",
            AppError::TooManyRequests => "too_many_requests",
            AppError::Internal(_) => "internal_error",
            AppError::Database(_) => "database_error",
            AppError::Config(_) => "config_error",
            AppError::ServiceUnavailable(_) => "service_unavailable",
        };

        let body = if status.is_server_error() {
            error!(error = %self, error_type = error_type, "Request error");
            ErrorResponse::new(error_type, "An unexpected error occurred. Please try again later.")
        } else {
            match self {
                AppError::ValidationError { message, fields } => {
                    ErrorResponse::new(error_type, message)
                        .with_details(serde_json::json!({ "fields": fields }))
                }
                other => ErrorResponse::new(error_type, other.to_string()),
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        // Repository errors are wrapped in anyhow context; surface unique
        // violations as conflicts instead of 500s.
        if let Some(sqlx_err) = err.downcast_ref::<sqlx::Error>() {
            if is_unique_violation(sqlx_err) {
                return AppError::Conflict("Resource already exists".to_string());
            }
        }
        AppError::Internal(format!("{:#}", err))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if is_unique_violation(&err) {
            return AppError::Conflict("Resource already exists".to_string());
        }
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".to_string()),
            _ => AppError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        let fields = err
            .field_errors()
            .into_iter()
            .map(|(field, errors)| {
                let messages = errors
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| format!("{} is invalid", field))
                    })
                    .collect();
                (field.to_string(), messages)
            })
            .collect();
        AppError::invalid_fields(fields)
    }
}

impl From<crate::models::TransitionError> for AppError {
    fn from(err: crate::models::TransitionError) -> Self {
        AppError::Conflict(err.to_string())
    }
}

/// Whether a sqlx error is a UNIQUE constraint violation
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation() || db_err.message().contains("UNIQUE constraint failed")
        }
        _ => false,
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
