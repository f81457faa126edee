//! Error taxonomy for the mission engine
//!
//! Every service returns [`EngineError`]. The HTTP layer (not part of this
//! crate) maps errors to responses through [`EngineError::status_code`].

use thiserror::Error;

/// Errors surfaced by mission, validation and notification operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// Malformed input (short duration, bad id format, unknown mission type)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No caller identity was supplied
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Caller lacks the role required by the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Record is already in a terminal state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// User is already a member of the mission's completed set
    #[error("User {user_id} already completed mission {mission_id}")]
    AlreadyCompleted { mission_id: String, user_id: String },

    /// Mission end date has passed relative to the relevant timestamp
    #[error("Mission expired: {0}")]
    Expired(String),

    /// Completion condition not met; carries the verifier diagnostic
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Primary effect persisted, a dependent effect failed
    #[error("Partial failure: {completed} succeeded but {failed}")]
    PartialFailure { completed: String, failed: String },

    #[error("Timed out: {0}")]
    Timeout(String),

    /// Storage or external provider unreachable
    #[error("Unavailable: {0}")]
    Unavailable(String),
}

impl EngineError {
    /// Whether this error reports a state conflict (duplicate completion,
    /// double decision, repeated acknowledgement)
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            EngineError::Conflict(_) | EngineError::AlreadyCompleted { .. }
        )
    }

    /// Status code the HTTP layer should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::InvalidArgument(_) => 400,
            EngineError::Unauthorized(_) => 401,
            EngineError::Forbidden(_) => 403,
            EngineError::NotFound(_) => 404,
            EngineError::Conflict(_) | EngineError::AlreadyCompleted { .. } => 409,
            EngineError::Expired(_) => 410,
            EngineError::PreconditionFailed(_) => 412,
            EngineError::PartialFailure { .. } => 500,
            EngineError::Unavailable(_) => 503,
            EngineError::Timeout(_) => 504,
        }
    }

    pub(crate) fn partial(completed: impl Into<String>, failed: impl Into<String>) -> Self {
        EngineError::PartialFailure {
            completed: completed.into(),
            failed: failed.into(),
        }
    }
}

impl From<mongodb::error::Error> for EngineError {
    fn from(e: mongodb::error::Error) -> Self {
        EngineError::Unavailable(format!("Database error: {}", e))
    }
}

impl From<bson::oid::Error> for EngineError {
    fn from(e: bson::oid::Error) -> Self {
        EngineError::InvalidArgument(format!("Invalid id: {}", e))
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_completed_is_conflict() {
        let err = EngineError::AlreadyCompleted {
            mission_id: "m".into(),
            user_id: "u".into(),
        };
        assert!(err.is_conflict());
        assert_eq!(err.status_code(), 409);
        assert!(!EngineError::Expired("x".into()).is_conflict());
    }

    #[test]
    fn test_partial_failure_message() {
        let err = EngineError::partial("completion recorded", "ledger credit failed");
        assert_eq!(
            err.to_string(),
            "Partial failure: completion recorded succeeded but ledger credit failed"
        );
    }
}
