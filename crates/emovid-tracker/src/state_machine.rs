/*
[INPUT]:  LifecycleState, LifecycleEvent
[OUTPUT]: Validated state transitions for submitted jobs
[POS]:    Job domain logic - state machine for lifecycle management
[UPDATE]: When lifecycle states or transition rules change
*/

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Lifecycle of one job as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    Submitting,
    /// Submission failed before a task id was obtained
    SubmissionError,
    Queued,
    Processing,
    Completed,
    /// The service reported a failure
    Failed,
    /// Client-local: too many consecutive poll faults
    Unreachable,
    /// Client-local: the caller gave up on the job
    Cancelled,
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecycleState::SubmissionError
                | LifecycleState::Completed
                | LifecycleState::Failed
                | LifecycleState::Unreachable
                | LifecycleState::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Submitting => "submitting",
            LifecycleState::SubmissionError => "submission_error",
            LifecycleState::Queued => "queued",
            LifecycleState::Processing => "processing",
            LifecycleState::Completed => "completed",
            LifecycleState::Failed => "failed",
            LifecycleState::Unreachable => "unreachable",
            LifecycleState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events that can trigger lifecycle transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Submit,
    Accepted,
    Rejected,
    ReportedQueued,
    ReportedProcessing,
    ReportedCompleted,
    ReportedFailed,
    RetriesExhausted,
    Cancel,
}

/// Errors occurring during state transitions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("Invalid transition: {from:?} -> {event:?}")]
    InvalidTransition {
        from: LifecycleState,
        event: LifecycleEvent,
    },
}

/// State machine managing job lifecycle transitions
#[derive(Debug, Clone)]
pub struct LifecycleStateMachine {
    current_state: LifecycleState,
}

impl LifecycleStateMachine {
    /// Create a new state machine with an initial state
    pub fn new(initial: LifecycleState) -> Self {
        Self {
            current_state: initial,
        }
    }

    /// Check if the given event is valid from the current state
    pub fn can_transition(&self, event: LifecycleEvent) -> bool {
        next_state(self.current_state, event).is_some()
    }

    /// Perform a state transition, returning the new state
    pub fn transition(&mut self, event: LifecycleEvent) -> Result<LifecycleState, StateError> {
        let next = next_state(self.current_state, event).ok_or(StateError::InvalidTransition {
            from: self.current_state,
            event,
        })?;
        self.current_state = next;
        Ok(next)
    }

    /// Get the current state
    pub fn state(&self) -> LifecycleState {
        self.current_state
    }
}

impl Default for LifecycleStateMachine {
    fn default() -> Self {
        Self::new(LifecycleState::Idle)
    }
}

fn next_state(from: LifecycleState, event: LifecycleEvent) -> Option<LifecycleState> {
    use LifecycleEvent as E;
    use LifecycleState as S;

    match (from, event) {
        (S::Idle, E::Submit) => Some(S::Submitting),
        (S::Submitting, E::Accepted) => Some(S::Queued),
        (S::Submitting, E::Rejected) => Some(S::SubmissionError),
        // a late "queued" never moves a job backwards
        (S::Queued | S::Processing, E::ReportedQueued) => Some(from),
        (S::Queued | S::Processing, E::ReportedProcessing) => Some(S::Processing),
        (S::Queued | S::Processing, E::ReportedCompleted) => Some(S::Completed),
        (S::Queued | S::Processing, E::ReportedFailed) => Some(S::Failed),
        (S::Queued | S::Processing, E::RetriesExhausted) => Some(S::Unreachable),
        (state, E::Cancel) if !state.is_terminal() => Some(S::Cancelled),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [LifecycleState; 9] = [
        LifecycleState::Idle,
        LifecycleState::Submitting,
        LifecycleState::SubmissionError,
        LifecycleState::Queued,
        LifecycleState::Processing,
        LifecycleState::Completed,
        LifecycleState::Failed,
        LifecycleState::Unreachable,
        LifecycleState::Cancelled,
    ];

    const ALL_EVENTS: [LifecycleEvent; 9] = [
        LifecycleEvent::Submit,
        LifecycleEvent::Accepted,
        LifecycleEvent::Rejected,
        LifecycleEvent::ReportedQueued,
        LifecycleEvent::ReportedProcessing,
        LifecycleEvent::ReportedCompleted,
        LifecycleEvent::ReportedFailed,
        LifecycleEvent::RetriesExhausted,
        LifecycleEvent::Cancel,
    ];

    #[test]
    fn test_initial_state() {
        let machine = LifecycleStateMachine::default();
        assert_eq!(machine.state(), LifecycleState::Idle);
    }

    #[test]
    fn test_happy_path() {
        let mut machine = LifecycleStateMachine::default();
        assert_eq!(
            machine.transition(LifecycleEvent::Submit),
            Ok(LifecycleState::Submitting)
        );
        assert_eq!(
            machine.transition(LifecycleEvent::Accepted),
            Ok(LifecycleState::Queued)
        );
        assert_eq!(
            machine.transition(LifecycleEvent::ReportedProcessing),
            Ok(LifecycleState::Processing)
        );
        assert_eq!(
            machine.transition(LifecycleEvent::ReportedProcessing),
            Ok(LifecycleState::Processing)
        );
        assert_eq!(
            machine.transition(LifecycleEvent::ReportedCompleted),
            Ok(LifecycleState::Completed)
        );
    }

    #[test]
    fn test_submission_failure_is_terminal() {
        let mut machine = LifecycleStateMachine::new(LifecycleState::Submitting);
        assert!(machine.transition(LifecycleEvent::Rejected).is_ok());
        assert_eq!(machine.state(), LifecycleState::SubmissionError);
        assert!(machine.state().is_terminal());
    }

    #[test]
    fn test_queued_report_does_not_regress_processing() {
        let mut machine = LifecycleStateMachine::new(LifecycleState::Processing);
        assert_eq!(
            machine.transition(LifecycleEvent::ReportedQueued),
            Ok(LifecycleState::Processing)
        );
    }

    #[test]
    fn test_cancel_from_any_non_terminal_state() {
        for initial in ALL_STATES.into_iter().filter(|state| !state.is_terminal()) {
            let mut machine = LifecycleStateMachine::new(initial);
            assert_eq!(
                machine.transition(LifecycleEvent::Cancel),
                Ok(LifecycleState::Cancelled)
            );
        }
    }

    #[test]
    fn test_terminal_states_accept_no_event() {
        for initial in ALL_STATES.into_iter().filter(LifecycleState::is_terminal) {
            for event in ALL_EVENTS {
                let mut machine = LifecycleStateMachine::new(initial);
                assert!(!machine.can_transition(event));
                assert_eq!(
                    machine.transition(event),
                    Err(StateError::InvalidTransition {
                        from: initial,
                        event,
                    })
                );
                assert_eq!(machine.state(), initial);
            }
        }
    }

    #[test]
    fn test_invalid_transition() {
        let mut machine = LifecycleStateMachine::new(LifecycleState::Idle);
        let result = machine.transition(LifecycleEvent::ReportedCompleted);
        assert!(result.is_err());
        if let Err(StateError::InvalidTransition { from, event }) = result {
            assert_eq!(from, LifecycleState::Idle);
            assert_eq!(event, LifecycleEvent::ReportedCompleted);
        }
    }
}
