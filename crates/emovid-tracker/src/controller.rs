/*
[INPUT]:  VideoPayload, shared TransferApi client, CancellationToken, poll commands
[OUTPUT]: One job driven submit -> poll loop -> terminal state, published via `watch`
[POS]:    Execution layer - per-job lifecycle orchestration
[UPDATE]: When changing poll cadence, retry bound, or cancellation guarantees
[UPDATE]: 2026-10-12 Abort in-flight polls on cancellation instead of waiting them out
*/

use crate::artifact::save_artifact;
use crate::error::{LifecycleError, Result};
use crate::job::{JobError, JobFailure, JobHandle};
use crate::state_machine::{LifecycleEvent, LifecycleState, LifecycleStateMachine, StateError};
use emovid_adapter::{
    EmovidClient, PayloadPolicy, PollSnapshot, TransferApi, TransferError, VideoPayload,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use url::Url;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// Policy knobs for one controller
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub poll_interval: Duration,
    pub max_consecutive_failures: u32,
    pub payload_policy: PayloadPolicy,
    /// Probe the service before submitting
    pub require_liveness: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            payload_policy: PayloadPolicy::default(),
            require_liveness: true,
        }
    }
}

/// Non-terminal notice for the caller; the job is still being tracked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory {
    Retrying {
        attempt: u32,
        max_attempts: u32,
        message: String,
    },
}

/// Caller-facing view of a controller, published on every change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerStatus {
    pub state: LifecycleState,
    pub task_id: Option<String>,
    pub result_path: Option<String>,
    /// Where the artifact can be fetched; set only in `Completed`
    pub download_url: Option<Url>,
    /// Renderable failure text; set in every terminal state except `Completed`
    pub error: Option<String>,
    pub advisory: Option<Advisory>,
}

impl ControllerStatus {
    fn idle() -> Self {
        Self {
            state: LifecycleState::Idle,
            task_id: None,
            result_path: None,
            download_url: None,
            error: None,
            advisory: None,
        }
    }
}

/// Result of one poll attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// A snapshot was applied (or a terminal rejection recorded)
    Updated(LifecycleState),
    /// Transient fault, will retry on the next tick
    Retrying { attempt: u32, max_attempts: u32 },
    /// The consecutive-failure bound was reached; job is now `Unreachable`
    GaveUp,
    /// Already terminal; no request was made
    AlreadyTerminal(LifecycleState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControllerCommand {
    PollNow,
}

/// Owns one job from submission to a terminal state.
///
/// Dropping the controller disposes of the job; nothing is persisted.
#[derive(Debug)]
pub struct LifecycleController<C: TransferApi + ?Sized = EmovidClient> {
    client: Arc<C>,
    config: LifecycleConfig,
    machine: LifecycleStateMachine,
    job: Option<JobHandle>,
    submission_error: Option<TransferError>,
    consecutive_failures: u32,
    advisory: Option<Advisory>,
    status_tx: watch::Sender<ControllerStatus>,
}

impl<C: TransferApi + ?Sized> LifecycleController<C> {
    pub fn new(client: Arc<C>, config: LifecycleConfig) -> Self {
        let (status_tx, _) = watch::channel(ControllerStatus::idle());
        Self {
            client,
            config,
            machine: LifecycleStateMachine::default(),
            job: None,
            submission_error: None,
            consecutive_failures: 0,
            advisory: None,
            status_tx,
        }
    }

    pub fn state(&self) -> LifecycleState {
        match &self.job {
            Some(job) => job.state(),
            None => self.machine.state(),
        }
    }

    pub fn job(&self) -> Option<&JobHandle> {
        self.job.as_ref()
    }

    pub fn submission_error(&self) -> Option<&TransferError> {
        self.submission_error.as_ref()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Current caller-facing view
    pub fn status(&self) -> ControllerStatus {
        let state = self.state();
        let Some(job) = &self.job else {
            return ControllerStatus {
                state,
                error: self.submission_error.as_ref().map(ToString::to_string),
                ..ControllerStatus::idle()
            };
        };

        let download_url = if state == LifecycleState::Completed {
            match self.client.result_location(job.task_id()) {
                Ok(url) => Some(url),
                Err(err) => {
                    tracing::warn!(
                        task_id = %job.task_id(),
                        error = %err,
                        "no download location for completed job"
                    );
                    None
                }
            }
        } else {
            None
        };

        ControllerStatus {
            state,
            task_id: Some(job.task_id().to_string()),
            result_path: job.result_path().map(str::to_string),
            download_url,
            error: job.error().map(ToString::to_string),
            advisory: self.advisory.clone(),
        }
    }

    /// Receiver that observes every published status
    pub fn subscribe(&self) -> watch::Receiver<ControllerStatus> {
        self.status_tx.subscribe()
    }

    /// Validate and submit a payload.
    ///
    /// Invalid payloads fail with `Validation` before any network call and
    /// leave the controller `Idle`, as does a failed liveness probe. A failed
    /// upload ends in `SubmissionError`.
    pub async fn submit(&mut self, payload: VideoPayload) -> Result<&JobHandle> {
        if !self.machine.can_transition(LifecycleEvent::Submit) || self.job.is_some() {
            return Err(LifecycleError::InvalidTransition(StateError::InvalidTransition {
                from: self.state(),
                event: LifecycleEvent::Submit,
            }));
        }

        let container = payload.validate(&self.config.payload_policy)?;

        if self.config.require_liveness {
            if let Err(err) = self.client.probe().await {
                tracing::warn!(error = %err, "liveness probe failed; submission not attempted");
                return Err(err.into());
            }
        }

        self.machine.transition(LifecycleEvent::Submit)?;
        self.publish();
        tracing::info!(
            file_name = %payload.file_name(),
            size_bytes = payload.len(),
            %container,
            "submitting video"
        );

        match self.client.submit(payload).await {
            Ok(receipt) => {
                self.machine.transition(LifecycleEvent::Accepted)?;
                tracing::info!(task_id = %receipt.task_id, "job queued");
                self.job = Some(JobHandle::from_receipt(receipt));
                self.publish();
                self.job.as_ref().ok_or(LifecycleError::NotSubmitted)
            }
            Err(err) => {
                self.machine.transition(LifecycleEvent::Rejected)?;
                tracing::error!(error = %err, "submission failed");
                self.submission_error = Some(err.clone());
                self.publish();
                Err(err.into())
            }
        }
    }

    /// Poll once, right now.
    ///
    /// Makes no request once the job is terminal.
    pub async fn poll_once(&mut self) -> Result<PollOutcome> {
        let task_id = match &self.job {
            None => return Err(LifecycleError::NotSubmitted),
            Some(job) if job.is_terminal() => {
                return Ok(PollOutcome::AlreadyTerminal(job.state()));
            }
            Some(job) => job.task_id().to_string(),
        };

        tracing::debug!(task_id = %task_id, "polling job status");
        let outcome = match self.client.poll(&task_id).await {
            Ok(snapshot) => self.apply_snapshot(snapshot)?,
            Err(err) if err.is_transient() => self.record_transient_fault(err.to_string())?,
            Err(err) => self.fail_on_poll_error(err)?,
        };
        self.publish();
        Ok(outcome)
    }

    /// Cancel locally. Returns `false` if already terminal.
    pub fn cancel(&mut self) -> bool {
        let cancelled = match self.job.as_mut() {
            Some(job) => job.cancel().is_ok(),
            None => self.machine.transition(LifecycleEvent::Cancel).is_ok(),
        };
        if cancelled {
            tracing::info!(task_id = ?self.job.as_ref().map(JobHandle::task_id), "job cancelled");
            self.advisory = None;
            self.publish();
        }
        cancelled
    }

    /// Download location of the artifact; only for `Completed` jobs
    pub fn result_location(&self) -> Result<Url> {
        let job = self.completed_job()?;
        Ok(self.client.result_location(job.task_id())?)
    }

    /// Stream the artifact of a `Completed` job into `writer`
    pub async fn download_to(&self, writer: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<u64> {
        let job = self.completed_job()?;
        Ok(self.client.download_to(job.task_id(), writer).await?)
    }

    /// Save the artifact of a `Completed` job to `output`; a failed download
    /// leaves `output` untouched.
    pub async fn save_result(&self, output: &Path) -> Result<u64> {
        let job = self.completed_job()?;
        Ok(save_artifact(self.client.as_ref(), job.task_id(), output).await?)
    }

    fn completed_job(&self) -> Result<&JobHandle> {
        let job = self.job.as_ref().ok_or(LifecycleError::NotSubmitted)?;
        if job.state() != LifecycleState::Completed {
            return Err(LifecycleError::NotCompleted {
                task_id: job.task_id().to_string(),
                state: job.state(),
            });
        }
        Ok(job)
    }

    fn apply_snapshot(&mut self, snapshot: PollSnapshot) -> Result<PollOutcome> {
        let job = self.job.as_mut().ok_or(LifecycleError::NotSubmitted)?;
        match job.apply_snapshot(snapshot) {
            Ok(state) => {
                self.consecutive_failures = 0;
                self.advisory = None;
                if state.is_terminal() {
                    tracing::info!(task_id = %job.task_id(), %state, "job reached terminal state");
                } else {
                    tracing::debug!(task_id = %job.task_id(), %state, "job still running");
                }
                Ok(PollOutcome::Updated(state))
            }
            Err(JobError::AlreadyTerminal { state, .. }) => Ok(PollOutcome::AlreadyTerminal(state)),
            Err(err) => self.record_transient_fault(err.to_string()),
        }
    }

    fn record_transient_fault(&mut self, message: String) -> Result<PollOutcome> {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let attempt = self.consecutive_failures;
        let max_attempts = self.config.max_consecutive_failures;
        let job = self.job.as_mut().ok_or(LifecycleError::NotSubmitted)?;

        if attempt >= max_attempts {
            tracing::warn!(
                task_id = %job.task_id(),
                attempt,
                max_attempts,
                error = %message,
                "giving up on job after consecutive poll failures"
            );
            job.mark_unreachable(attempt, message)?;
            self.advisory = None;
            return Ok(PollOutcome::GaveUp);
        }

        tracing::warn!(
            task_id = %job.task_id(),
            attempt,
            max_attempts,
            error = %message,
            "poll failed; retrying on next tick"
        );
        self.advisory = Some(Advisory::Retrying {
            attempt,
            max_attempts,
            message,
        });
        Ok(PollOutcome::Retrying {
            attempt,
            max_attempts,
        })
    }

    fn fail_on_poll_error(&mut self, err: TransferError) -> Result<PollOutcome> {
        let job = self.job.as_mut().ok_or(LifecycleError::NotSubmitted)?;
        let failure = match err {
            TransferError::ServerRejected { status, message } => {
                JobFailure::Rejected { status, message }
            }
            other => JobFailure::Transfer {
                message: other.to_string(),
            },
        };
        tracing::error!(task_id = %job.task_id(), error = %failure, "poll failed permanently");
        job.fail_locally(failure)?;
        self.consecutive_failures = 0;
        self.advisory = None;
        Ok(PollOutcome::Updated(LifecycleState::Failed))
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status());
    }
}

impl<C: TransferApi + ?Sized + 'static> LifecycleController<C> {
    /// Spawn the poll loop on the tokio runtime.
    ///
    /// Cancelling `shutdown` cancels the job. The loop ends on any terminal
    /// state and hands the controller back through [`ControllerHandle::join`].
    pub fn spawn(self, shutdown: CancellationToken) -> ControllerHandle<C> {
        // one pending request is enough; further ones coalesce into it
        let (commands_tx, commands_rx) = mpsc::channel(1);
        let status_rx = self.subscribe();
        let task_id = self.job.as_ref().map(|job| job.task_id().to_string());
        let loop_shutdown = shutdown.clone();
        let join = tokio::spawn(async move { self.run(commands_rx, loop_shutdown).await });

        ControllerHandle {
            task_id,
            commands: commands_tx,
            status_rx,
            shutdown,
            join,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<ControllerCommand>,
        shutdown: CancellationToken,
    ) -> Self {
        if self.job.is_none() {
            return self;
        }

        let period = self.config.poll_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut commands_open = true;

        while !self.state().is_terminal() {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    self.cancel();
                }
                _ = ticker.tick() => {
                    self.poll_or_cancel(&shutdown).await;
                }
                command = commands.recv(), if commands_open => match command {
                    // served immediately; the ticker keeps its own schedule
                    Some(ControllerCommand::PollNow) => self.poll_or_cancel(&shutdown).await,
                    None => commands_open = false,
                },
            }
        }

        self
    }

    /// Poll, dropping the in-flight request if cancellation wins the race.
    async fn poll_or_cancel(&mut self, shutdown: &CancellationToken) {
        let result = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            result = self.poll_once() => Some(result),
        };

        match result {
            None => {
                self.cancel();
            }
            Some(Err(err)) => {
                tracing::warn!(error = %err, "poll attempt failed");
            }
            Some(Ok(_)) => {}
        }
    }
}

/// Handle to a spawned controller loop
#[derive(Debug)]
pub struct ControllerHandle<C: TransferApi + ?Sized + 'static = EmovidClient> {
    task_id: Option<String>,
    commands: mpsc::Sender<ControllerCommand>,
    status_rx: watch::Receiver<ControllerStatus>,
    shutdown: CancellationToken,
    join: JoinHandle<LifecycleController<C>>,
}

impl<C: TransferApi + ?Sized + 'static> ControllerHandle<C> {
    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    /// Request an out-of-band poll. Returns `false` if the loop has ended.
    ///
    /// Requests made while one is already pending are merged into it.
    pub fn poll_now(&self) -> bool {
        match self.commands.try_send(ControllerCommand::PollNow) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Cancel the job locally; the loop stops without further requests.
    pub fn cancel(&self) {
        self.shutdown.cancel();
    }

    pub fn status(&self) -> ControllerStatus {
        self.status_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ControllerStatus> {
        self.status_rx.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub(crate) fn abort(&self) {
        self.join.abort();
    }

    pub(crate) fn join_handle_mut(&mut self) -> &mut JoinHandle<LifecycleController<C>> {
        &mut self.join
    }

    /// Wait for the loop to reach a terminal state and take the controller back
    pub async fn join(self) -> Result<LifecycleController<C>> {
        self.join.await.map_err(join_error)
    }
}

pub(crate) fn join_error(err: tokio::task::JoinError) -> LifecycleError {
    if err.is_panic() {
        LifecycleError::Join(format!("job loop panicked: {err}"))
    } else {
        LifecycleError::Join(err.to_string())
    }
}
