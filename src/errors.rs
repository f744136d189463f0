//! Application-wide error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

impl LedgerError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::DuplicateEntry(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Database(_) | Self::Migrate(_) | Self::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Storage internals stay out of client-facing bodies.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Internal error: {self}");
            "internal error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Map a sqlx error to [`LedgerError::DuplicateEntry`] when it is a unique
/// constraint violation, so the store-level backstop surfaces the same way
/// as the application-level exists check.
pub fn map_unique_violation(err: sqlx::Error, what: &str) -> LedgerError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
            return LedgerError::DuplicateEntry(what.to_string());
        }
    }
    LedgerError::Database(err)
}

/// Map a CHECK constraint violation (e.g. an adjustment that would drive a
/// stored amount negative) to [`LedgerError::Validation`].
pub fn map_check_violation(err: sqlx::Error, what: &str) -> LedgerError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_check_violation() {
            return LedgerError::Validation(what.to_string());
        }
    }
    LedgerError::Database(err)
}
