//! Pipeline error types.

use uuid::Uuid;

use crate::models::{InvalidTransition, ValidationError};
use crate::remote::RemoteError;

/// Errors surfaced by the mood submission pipeline.
///
/// Transient remote failures during `submit` and `flush_queue` are absorbed
/// by the queue and never show up here.
#[derive(Debug)]
pub enum PipelineError {
    /// Bad payload, never retried
    Validation(ValidationError),
    /// Session invalid, never retried
    Auth(String),
    /// Remote failure on a call that is not queued, such as a reconcile read
    Transient(RemoteError),
    /// Gave up after the maximum number of automatic retries
    RetryExhausted {
        id: Uuid,
        attempts: u32,
        last_error: String,
    },
    /// No failed entry with this id to retry
    NotFound(Uuid),
    /// Local persistence failure
    Storage(sqlx::Error),
    /// Bug: a lifecycle step that the state machine forbids
    InvalidTransition(InvalidTransition),
}

impl PipelineError {
    /// Map a remote failure that the queue did not absorb.
    pub(crate) fn from_remote(e: RemoteError) -> Self {
        match e {
            RemoteError::Validation(msg) => {
                PipelineError::Validation(ValidationError::new("entry", msg))
            }
            RemoteError::Decode(msg) => PipelineError::Validation(ValidationError::new(
                "response",
                msg,
            )),
            RemoteError::Unauthorized(msg) => PipelineError::Auth(msg),
            e => PipelineError::Transient(e),
        }
    }

    /// True when the UI should show an error with a retry affordance.
    pub fn needs_user_action(&self) -> bool {
        matches!(
            self,
            PipelineError::Validation(_) | PipelineError::Auth(_) | PipelineError::RetryExhausted { .. }
        )
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Validation(e) => write!(f, "Invalid mood entry: {}", e),
            PipelineError::Auth(e) => write!(f, "Not signed in: {}", e),
            PipelineError::Transient(e) => write!(f, "Temporary failure: {}", e),
            PipelineError::RetryExhausted {
                id,
                attempts,
                last_error,
            } => write!(
                f,
                "Gave up on {} after {} retries (last error: {}). Retry it manually.",
                id, attempts, last_error
            ),
            PipelineError::NotFound(id) => write!(f, "No failed entry with id {}", id),
            PipelineError::Storage(e) => write!(f, "Local storage error: {}", e),
            PipelineError::InvalidTransition(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Validation(e) => Some(e),
            PipelineError::Transient(e) => Some(e),
            PipelineError::Storage(e) => Some(e),
            PipelineError::InvalidTransition(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(e: sqlx::Error) -> Self {
        PipelineError::Storage(e)
    }
}

impl From<InvalidTransition> for PipelineError {
    fn from(e: InvalidTransition) -> Self {
        PipelineError::InvalidTransition(e)
    }
}
