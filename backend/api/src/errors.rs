//! Application-wide error types and their HTTP mapping.

use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    /// A referenced record does not exist (or is not visible to the caller).
    #[error("{0}")]
    NotFound(String),

    /// A conditional update matched zero rows because the row's version
    /// moved underneath the caller.
    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,

    /// The unique (project, expert) assessment constraint fired.
    #[error("You have already voted for this project")]
    VotedTwice,

    /// One or more request fields failed validation.  The map carries a
    /// message per offending field.
    #[error("one or more fields failed validation")]
    Validation(BTreeMap<String, String>),

    /// The payment gateway rejected or could not complete a call.
    #[error("payment gateway error: {0}")]
    Gateway(String),

    /// A database call exceeded its time budget.
    #[error("the database did not respond in time")]
    Timeout,

    #[error("invalid or missing authentication token")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A stored value violated an invariant the schema cannot express.
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// The stock not-found error.
    pub fn not_found() -> Self {
        Self::NotFound("the requested resource could not be found".to_string())
    }

    /// The stock permission error.
    pub fn forbidden() -> Self {
        Self::Forbidden(
            "your user account doesn't have the necessary permissions to access this resource"
                .to_string(),
        )
    }

    /// A single-field validation failure.
    pub fn validation(field: &str, message: &str) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert(field.to_string(), message.to_string());
        Self::Validation(errors)
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::EditConflict | Self::VotedTwice => StatusCode::CONFLICT,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Gateway(_) => StatusCode::BAD_GATEWAY,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Timeout
            | Self::Database(_)
            | Self::Migrate(_)
            | Self::Json(_)
            | Self::Config(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// The gateway client is the only reqwest consumer, so transport errors fold
// straight into the gateway variant.
impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        Self::Gateway(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            Self::Validation(errors) => json!({ "error": errors }),
            Self::Gateway(_) => {
                error!("{self}");
                json!({ "error": "the payment gateway could not process the request" })
            }
            _ if status == StatusCode::INTERNAL_SERVER_ERROR => {
                error!("{self}");
                json!({ "error": "the server encountered a problem and could not process your request" })
            }
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

/// True when the error is a database unique-constraint violation.
pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => {
            matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation)
        }
        _ => false,
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
