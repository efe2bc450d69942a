/*
[INPUT]:  Validation, transfer, state machine and task-join failures
[OUTPUT]: LifecycleError returned by controllers and the job manager
[POS]:    Error handling layer - lifecycle errors surfaced to callers
[UPDATE]: When controller or manager operations gain new failure modes
*/

use crate::job::JobError;
use crate::state_machine::{LifecycleState, StateError};
use emovid_adapter::{TransferError, ValidationError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Payload refused locally; nothing was sent
    #[error("invalid video: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    InvalidTransition(#[from] StateError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error("no job has been submitted")]
    NotSubmitted,

    #[error("job {task_id} is {state}; no result is available")]
    NotCompleted {
        task_id: String,
        state: LifecycleState,
    },

    #[error("unknown job: {0}")]
    UnknownJob(String),

    #[error("job {0} is already tracked")]
    DuplicateJob(String),

    #[error("job loop failed: {0}")]
    Join(String),

    #[error("timed out after {0:?} waiting for job loops to stop")]
    ShutdownTimedOut(Duration),
}

impl LifecycleError {
    /// The transfer error behind this failure, if any
    pub fn transfer(&self) -> Option<&TransferError> {
        match self {
            LifecycleError::Transfer(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type alias for lifecycle operations
pub type Result<T> = std::result::Result<T, LifecycleError>;
