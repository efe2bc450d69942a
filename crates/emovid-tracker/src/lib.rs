/*
[INPUT]:  Public API exports for emovid-tracker crate
[OUTPUT]: Module declarations and public re-exports
[POS]:    Crate root - library entry point
[UPDATE]: When adding new modules or public exports
*/

pub mod artifact;
pub mod config;
pub mod controller;
pub mod error;
pub mod job;
pub mod manager;
pub mod state_machine;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use artifact::save_artifact;
pub use config::TrackerConfig;
pub use controller::{
    Advisory, ControllerHandle, ControllerStatus, LifecycleConfig, LifecycleController,
    PollOutcome,
};
pub use error::{LifecycleError, Result};
pub use job::{JobError, JobFailure, JobHandle};
pub use manager::{JobManager, JobRuntimeStatus};
pub use state_machine::{LifecycleEvent, LifecycleState, LifecycleStateMachine, StateError};
