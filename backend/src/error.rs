//! Application error types and result alias.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::cache::CacheError;
use crate::repository::RepositoryError;

/// Application result type alias
pub type Result<T> = std::result::Result<T, AppError>;

/// Stable precondition codes surfaced to clients.
pub mod codes {
    pub const ADMIN_ROLE_PROTECTED: &str = "ADMIN_ROLE_PROTECTED";
    pub const SYSTEM_ROLE_PROTECTED: &str = "SYSTEM_ROLE_PROTECTED";
    pub const ROLE_IN_USE: &str = "ROLE_IN_USE";
    pub const NO_ACTIVE_ROLE: &str = "NO_ACTIVE_ROLE";
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Repository failure other than a uniqueness conflict
    #[error("Repository error: {0}")]
    Repository(#[source] RepositoryError),

    /// Permission cache failure
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Authentication error
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Authorization error
    #[error("Access denied: {0}")]
    Authorization(String),

    /// Not found error
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Conflict error (duplicate slug, name or pair)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Validation error with optional field-level details
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        details: Option<Value>,
    },

    /// Malformed request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Operation refused because of the current state of the data
    #[error("Precondition failed ({code}): {message}")]
    Precondition { code: &'static str, message: String },

    /// Device id header required but absent
    #[error("Missing device id")]
    MissingDeviceId,

    /// Device id header present but not a UUID
    #[error("Invalid device id")]
    InvalidDeviceId,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Address parse error
    #[error("Address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// JWT error
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Validation failure without field details.
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            details: None,
        }
    }

    /// Validation failure for a single field.
    pub fn invalid_field(field: &str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        AppError::Validation {
            message: format!("{} is invalid", field),
            details: Some(json!({ field: reason })),
        }
    }

    pub fn precondition(code: &'static str, message: impl Into<String>) -> Self {
        AppError::Precondition {
            code,
            message: message.into(),
        }
    }

    /// HTTP status and stable code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Authentication(_) | AppError::Jwt(_) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED")
            }
            AppError::Authorization(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            AppError::Validation { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_FAILED"),
            AppError::BadRequest(_) | AppError::Json(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::Precondition { code, .. } => (StatusCode::CONFLICT, *code),
            AppError::MissingDeviceId => (StatusCode::BAD_REQUEST, "MISSING_DEVICE_ID"),
            AppError::InvalidDeviceId => (StatusCode::BAD_REQUEST, "INVALID_DEVICE_ID"),
            AppError::Config(_)
            | AppError::Repository(_)
            | AppError::Cache(_)
            | AppError::Migration(_)
            | AppError::Io(_)
            | AppError::AddrParse(_)
            | AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict { constraint } => {
                AppError::Conflict(format!("unique constraint {} violated", constraint))
            }
            other => AppError::Repository(other),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        RepositoryError::from(err).into()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            AppError::Authentication(_) | AppError::Jwt(_) => "Authentication failed".to_string(),
            AppError::Authorization(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::BadRequest(msg) => msg.clone(),
            AppError::Validation { message, .. } => message.clone(),
            AppError::Precondition { message, .. } => message.clone(),
            AppError::MissingDeviceId => "Device id header is required".to_string(),
            AppError::InvalidDeviceId => "Device id header is malformed".to_string(),
            AppError::Json(_) => "Invalid JSON".to_string(),
            _ => "Internal server error".to_string(),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, code = code, "Request error");
        } else {
            tracing::debug!(error = %self, code = code, "Request rejected");
        }

        let mut body = json!({
            "code": code,
            "message": message,
        });
        if let AppError::Validation {
            details: Some(details),
            ..
        } = &self
        {
            body["details"] = details.clone();
        }

        (status, Json(body)).into_response()
    }
}
