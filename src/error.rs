//! Error taxonomy for the poll core.
//!
//! Every variant carries a stable string code so callers can branch on
//! errors without parsing messages. Counter clamps are deliberately not
//! represented here: they are logged as inconsistencies by the ledger and
//! never surfaced to callers.

use crate::types::Phase;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum CoreError {
    #[error("{operation} requires {required}, but the room is currently in {current:?}")]
    PhaseViolation {
        operation: &'static str,
        required: &'static str,
        current: Phase,
    },

    #[error("selected {got} options, allowed range is {min}..={max}")]
    InvalidSelection { got: usize, min: usize, max: usize },

    #[error("unknown or unavailable option: {0}")]
    UnknownOption(String),

    #[error("unknown room: {0}")]
    UnknownRoom(String),

    #[error("unknown vote: {0}")]
    UnknownVote(String),

    #[error("unknown comment: {0}")]
    UnknownComment(String),

    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("user {0} is not allowed to perform this operation")]
    NotEligible(String),

    #[error("invalid room configuration: {0}")]
    InvalidConfig(String),

    #[error("concurrent modification: expected version {expected}, found {found}")]
    ConcurrentModification { expected: u64, found: u64 },

    #[error("external service degraded: {0}")]
    ExternalServiceDegraded(String),
}

impl CoreError {
    /// Stable machine-readable code for each error kind
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::PhaseViolation { .. } => "PHASE_VIOLATION",
            CoreError::InvalidSelection { .. } => "INVALID_SELECTION",
            CoreError::UnknownOption(_) => "UNKNOWN_OPTION",
            CoreError::UnknownRoom(_) => "UNKNOWN_ROOM",
            CoreError::UnknownVote(_) => "UNKNOWN_VOTE",
            CoreError::UnknownComment(_) => "UNKNOWN_COMMENT",
            CoreError::UnknownUser(_) => "UNKNOWN_USER",
            CoreError::NotEligible(_) => "NOT_ELIGIBLE",
            CoreError::InvalidConfig(_) => "INVALID_CONFIG",
            CoreError::ConcurrentModification { .. } => "CONCURRENT_MODIFICATION",
            CoreError::ExternalServiceDegraded(_) => "EXTERNAL_SERVICE_DEGRADED",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            CoreError::PhaseViolation { .. } => StatusCode::CONFLICT,
            CoreError::InvalidSelection { .. } | CoreError::InvalidConfig(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            CoreError::UnknownOption(_)
            | CoreError::UnknownRoom(_)
            | CoreError::UnknownVote(_)
            | CoreError::UnknownComment(_)
            | CoreError::UnknownUser(_) => StatusCode::NOT_FOUND,
            CoreError::NotEligible(_) => StatusCode::FORBIDDEN,
            CoreError::ConcurrentModification { .. } => StatusCode::CONFLICT,
            CoreError::ExternalServiceDegraded(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let body = json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        let err = CoreError::PhaseViolation {
            operation: "submit-vote",
            required: "Voting",
            current: Phase::Closed,
        };
        assert_eq!(err.code(), "PHASE_VIOLATION");
        assert!(err.to_string().contains("submit-vote"));
        assert!(err.to_string().contains("Voting"));

        let err = CoreError::InvalidSelection {
            got: 0,
            min: 1,
            max: 3,
        };
        assert_eq!(err.code(), "INVALID_SELECTION");
    }
}
