//! HTTP-facing errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::warn;

use crate::audit::AuditError;
use crate::registry::{RegisterError, StoreError};
use crate::types::ParticipantId;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("participant not found: {0}")]
    ParticipantNotFound(ParticipantId),

    /// The request collides with existing data (duplicate id or token).
    #[error("{0}")]
    Conflict(String),

    /// The registry or audit log can't serve the request right now. Retry.
    #[error("{0}")]
    Unavailable(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UnknownParticipant(id) => ApiError::ParticipantNotFound(id),
            other => ApiError::Unavailable(other.to_string()),
        }
    }
}

impl From<RegisterError> for ApiError {
    fn from(e: RegisterError) -> Self {
        match e {
            RegisterError::DuplicateId(_) | RegisterError::DuplicateToken(_) => {
                ApiError::Conflict(e.to_string())
            }
            RegisterError::UnknownParticipant(id) => ApiError::ParticipantNotFound(id),
            RegisterError::Store(store) => store.into(),
        }
    }
}

impl From<AuditError> for ApiError {
    fn from(e: AuditError) -> Self {
        ApiError::Unavailable(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::ParticipantNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => {
                warn!(error = %self, "Request failed: backing store unavailable");
                StatusCode::SERVICE_UNAVAILABLE
            }
        };

        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::QrToken;

    #[test]
    fn status_codes() {
        let cases = [
            (
                ApiError::ParticipantNotFound(ParticipantId::new("p1")),
                StatusCode::NOT_FOUND,
            ),
            (
                RegisterError::DuplicateToken(QrToken::new("t")).into(),
                StatusCode::CONFLICT,
            ),
            (
                StoreError::Unavailable("down".to_string()).into(),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                RegisterError::Store(StoreError::UnknownParticipant(ParticipantId::new("x")))
                    .into(),
                StatusCode::NOT_FOUND,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
