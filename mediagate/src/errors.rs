use crate::{
    db::errors::DbError,
    types::{Operation, Permission},
};
use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or semantically invalid input
    #[error("{message}")]
    BadRequest { message: String },

    /// No credentials, or credentials that do not resolve to a principal
    #[error("{}", message.as_deref().unwrap_or("Authentication required"))]
    Unauthenticated { message: Option<String> },

    /// Authenticated, but the principal may not do this
    #[error("Insufficient permissions to {action} {resource}")]
    InsufficientPermissions {
        required: Permission,
        action: Operation,
        resource: String,
    },

    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    #[error("{message}")]
    Conflict { message: String },

    /// A downstream dependency did not answer in time; safe to retry
    #[error("Timed out while trying to {operation}")]
    Timeout { operation: String },

    #[error(transparent)]
    Database(#[from] DbError),

    #[error("Internal error while trying to {operation}")]
    Internal { operation: String },
}

/// JSON body of every error response
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Stable machine-readable reason, e.g. `insufficient_funds`
    pub error: &'static str,
    pub message: String,
}

impl Error {
    fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            Error::BadRequest { .. } => (StatusCode::BAD_REQUEST, "validation_error"),
            Error::Unauthenticated { .. } => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Error::InsufficientPermissions { .. } => (StatusCode::FORBIDDEN, "forbidden"),
            Error::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            Error::Conflict { .. } => (StatusCode::CONFLICT, "idempotency_conflict"),
            Error::Timeout { .. } => (StatusCode::SERVICE_UNAVAILABLE, "timeout"),
            Error::Database(db) => match db {
                DbError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
                DbError::InsufficientFunds { .. } => (StatusCode::PAYMENT_REQUIRED, "insufficient_funds"),
                DbError::InvalidAmount { .. } => (StatusCode::BAD_REQUEST, "validation_error"),
                DbError::IdempotencyConflict { .. } => (StatusCode::CONFLICT, "idempotency_conflict"),
                // Pool exhausted for longer than the acquire timeout
                DbError::Other(sqlx::Error::PoolTimedOut) => (StatusCode::SERVICE_UNAVAILABLE, "timeout"),
                DbError::UniqueViolation { .. }
                | DbError::CheckViolation { .. }
                | DbError::ForeignKeyViolation { .. }
                | DbError::Other(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            },
            Error::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }

    /// Status code this error renders with
    pub fn status_code(&self) -> StatusCode {
        self.classify().0
    }

    /// Stable reason string this error renders with
    pub fn reason(&self) -> &'static str {
        self.classify().1
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::BadRequest {
            message: rejection.body_text(),
        }
    }
}

impl From<PathRejection> for Error {
    fn from(rejection: PathRejection) -> Self {
        Error::BadRequest {
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, reason) = self.classify();

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            // Keep storage detail in the logs, not on the wire
            error!(error = %self, "Request failed with internal error");
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        (status, Json(ErrorResponse { error: reason, message })).into_response()
    }
}
