/*
[INPUT]:  SubmitReceipt from the transfer client, PollSnapshots from polling
[OUTPUT]: JobHandle with a final-once-terminal result or error
[POS]:    Job domain logic - client-side record of one submitted job
[UPDATE]: When snapshot interpretation or terminal outcomes change
*/

use crate::state_machine::{LifecycleEvent, LifecycleState, LifecycleStateMachine, StateError};
use chrono::{DateTime, Utc};
use emovid_adapter::{PollSnapshot, RemoteStatus, SubmitReceipt};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Why a job ended without a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobFailure {
    /// The service reported `status == "failed"`; message is its `error` text
    Remote { message: String },
    /// A status request was refused with a non-retryable HTTP status
    Rejected { status: u16, message: String },
    /// A status request failed in a way retrying cannot fix
    Transfer { message: String },
    /// Consecutive poll faults reached the configured bound
    ClientTimeout {
        consecutive_failures: u32,
        last_error: String,
    },
    /// The caller cancelled; the remote job may still be running
    Cancelled,
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobFailure::Remote { message } => write!(f, "processing failed: {message}"),
            JobFailure::Rejected { status, message } => {
                write!(f, "status request rejected (HTTP {status}): {message}")
            }
            JobFailure::Transfer { message } => write!(f, "status request failed: {message}"),
            JobFailure::ClientTimeout {
                consecutive_failures,
                last_error,
            } => write!(
                f,
                "gave up after {consecutive_failures} consecutive failed status checks: {last_error}"
            ),
            JobFailure::Cancelled => f.write_str("cancelled by caller"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("job {task_id} is already {state}; update discarded")]
    AlreadyTerminal {
        task_id: String,
        state: LifecycleState,
    },

    #[error("inconsistent snapshot for job {task_id}: {reason}")]
    InconsistentSnapshot { task_id: String, reason: String },

    #[error(transparent)]
    Transition(#[from] StateError),
}

/// Client-side record of one submitted job.
///
/// Once terminal, exactly one of `result_path` / `error` is set and neither
/// changes again.
#[derive(Debug, Clone)]
pub struct JobHandle {
    task_id: String,
    file_name: String,
    size_bytes: u64,
    machine: LifecycleStateMachine,
    result_path: Option<String>,
    error: Option<JobFailure>,
    last_snapshot: Option<PollSnapshot>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl JobHandle {
    /// A freshly accepted job, in `Queued`.
    pub fn from_receipt(receipt: SubmitReceipt) -> Self {
        let now = Utc::now();
        Self {
            task_id: receipt.task_id,
            file_name: receipt.file_name,
            size_bytes: receipt.size_bytes,
            machine: LifecycleStateMachine::new(LifecycleState::Queued),
            result_path: None,
            error: None,
            last_snapshot: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn state(&self) -> LifecycleState {
        self.machine.state()
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Server-side result reference; set only in `Completed`.
    pub fn result_path(&self) -> Option<&str> {
        self.result_path.as_deref()
    }

    /// Set only in a terminal state other than `Completed`.
    pub fn error(&self) -> Option<&JobFailure> {
        self.error.as_ref()
    }

    pub fn last_snapshot(&self) -> Option<&PollSnapshot> {
        self.last_snapshot.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Apply one service observation.
    ///
    /// Terminal handles refuse every snapshot. A `completed` without
    /// `result_path` or a `failed` without `error` is refused as inconsistent
    /// and leaves the handle untouched.
    pub fn apply_snapshot(&mut self, snapshot: PollSnapshot) -> Result<LifecycleState, JobError> {
        self.ensure_not_terminal()?;

        let event = match snapshot.status {
            RemoteStatus::Queued => LifecycleEvent::ReportedQueued,
            RemoteStatus::Processing => LifecycleEvent::ReportedProcessing,
            RemoteStatus::Completed if snapshot.result_path.is_none() => {
                return Err(self.inconsistent("status is completed but result_path is missing"));
            }
            RemoteStatus::Completed => LifecycleEvent::ReportedCompleted,
            RemoteStatus::Failed if snapshot.error.is_none() => {
                return Err(self.inconsistent("status is failed but error is missing"));
            }
            RemoteStatus::Failed => LifecycleEvent::ReportedFailed,
        };

        let state = self.machine.transition(event)?;
        match state {
            LifecycleState::Completed => self.result_path = snapshot.result_path.clone(),
            LifecycleState::Failed => {
                self.error = snapshot
                    .error
                    .clone()
                    .map(|message| JobFailure::Remote { message });
            }
            _ => {}
        }
        self.last_snapshot = Some(snapshot);
        self.touch();
        Ok(state)
    }

    /// Move to the client-local `Unreachable` state.
    pub fn mark_unreachable(
        &mut self,
        consecutive_failures: u32,
        last_error: impl Into<String>,
    ) -> Result<(), JobError> {
        self.ensure_not_terminal()?;
        self.machine.transition(LifecycleEvent::RetriesExhausted)?;
        self.error = Some(JobFailure::ClientTimeout {
            consecutive_failures,
            last_error: last_error.into(),
        });
        self.touch();
        Ok(())
    }

    /// End the job as `Failed` because polling hit a non-retryable error.
    pub fn fail_locally(&mut self, failure: JobFailure) -> Result<(), JobError> {
        self.ensure_not_terminal()?;
        self.machine.transition(LifecycleEvent::ReportedFailed)?;
        self.error = Some(failure);
        self.touch();
        Ok(())
    }

    /// Move to `Cancelled`. The remote job is not notified.
    pub fn cancel(&mut self) -> Result<(), JobError> {
        self.ensure_not_terminal()?;
        self.machine.transition(LifecycleEvent::Cancel)?;
        self.error = Some(JobFailure::Cancelled);
        self.touch();
        Ok(())
    }

    fn ensure_not_terminal(&self) -> Result<(), JobError> {
        if self.is_terminal() {
            return Err(JobError::AlreadyTerminal {
                task_id: self.task_id.clone(),
                state: self.state(),
            });
        }
        Ok(())
    }

    fn inconsistent(&self, reason: &str) -> JobError {
        JobError::InconsistentSnapshot {
            task_id: self.task_id.clone(),
            reason: reason.to_string(),
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
