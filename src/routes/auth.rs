use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::{AppError, ServiceError};

/// Header carrying the caller identity, set by the upstream authentication provider.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Identity of the caller, extracted from the `X-User-Id` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActingUser(pub Uuid);

impl<S> FromRequestParts<S> for ActingUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let unauthorized = |message: &str| AppError::from(ServiceError::Unauthorized(message.into()));

        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| unauthorized("missing user header `X-User-Id`"))?;

        Uuid::parse_str(raw.trim())
            .map(ActingUser)
            .map_err(|_| unauthorized("malformed user header `X-User-Id`"))
    }
}
