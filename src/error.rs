use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{dao::storage::StorageError, state::join_request::InvalidTransition};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Caller identity is missing or malformed.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Caller is not allowed to perform an organizer-only operation.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// The caller already has a pending or approved request for this match.
    #[error("an active join request already exists")]
    DuplicateRequest { existing: Uuid },
    /// Approving one more player would exceed the match capacity.
    #[error("match is full ({occupied} seats occupied)")]
    CapacityExceeded { occupied: usize },
    /// Join request state machine violation.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    /// Malformed input such as a bad level, duration or date.
    #[error("invalid input: {0}")]
    Validation(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    #[error("message is empty")]
    EmptyMessage,
    #[error("message is too long ({len} characters, at most {max})")]
    MessageTooLong { len: usize, max: usize },
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Missing or malformed caller identity.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Caller lacks the required role.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// The caller already has an active request; the body points at it.
    #[error("conflict: an active join request already exists")]
    DuplicateRequest { existing: Uuid },
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::Forbidden(message) => AppError::Forbidden(message),
            ServiceError::Validation(message) => AppError::BadRequest(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            err @ (ServiceError::EmptyMessage | ServiceError::MessageTooLong { .. }) => {
                AppError::BadRequest(err.to_string())
            }
            ServiceError::DuplicateRequest { existing } => AppError::DuplicateRequest { existing },
            err @ (ServiceError::CapacityExceeded { .. } | ServiceError::InvalidTransition(_)) => {
                AppError::Conflict(err.to_string())
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    existing_request_id: Option<Uuid>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::DuplicateRequest { .. } => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let existing_request_id = match &self {
            AppError::DuplicateRequest { existing } => Some(*existing),
            _ => None,
        };
        let payload = Json(ErrorBody {
            message: self.to_string(),
            existing_request_id,
        });

        (status, payload).into_response()
    }
}
