/*
[INPUT]:  VideoPayloads + one shared TransferApi client, parent CancellationToken
[OUTPUT]: Independent controller loops per job with bounded shutdown
[POS]:    Execution layer - multi-job supervision
[UPDATE]: When changing startup/shutdown guarantees or supervision semantics
*/

use crate::controller::{
    ControllerHandle, ControllerStatus, LifecycleConfig, LifecycleController, join_error,
};
use crate::error::{LifecycleError, Result};
use emovid_adapter::{EmovidClient, TransferApi, VideoPayload};
use futures_util::future::select_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobRuntimeStatus {
    Running,
    Finished,
}

/// Job manager that runs several independent jobs over one shared client.
#[derive(Debug)]
pub struct JobManager<C: TransferApi + ?Sized + 'static = EmovidClient> {
    client: Arc<C>,
    config: LifecycleConfig,
    jobs: HashMap<String, ControllerHandle<C>>,
    shutdown: CancellationToken,
    shutdown_timeout: Duration,
}

impl<C: TransferApi + ?Sized + 'static> JobManager<C> {
    /// Create a new job manager.
    pub fn new(client: Arc<C>, config: LifecycleConfig) -> Self {
        Self {
            client,
            config,
            jobs: HashMap::new(),
            shutdown: CancellationToken::new(),
            shutdown_timeout: SHUTDOWN_TIMEOUT,
        }
    }

    /// Override the 30s bound used by `cancel` and `shutdown_and_wait`.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn task_ids(&self) -> Vec<String> {
        self.jobs.keys().cloned().collect()
    }

    /// Submit a payload through a fresh controller and start its poll loop.
    ///
    /// Returns the service-assigned task id.
    pub async fn start(&mut self, payload: VideoPayload) -> Result<String> {
        let mut controller = LifecycleController::new(Arc::clone(&self.client), self.config.clone());
        let task_id = controller.submit(payload).await?.task_id().to_string();

        if self.jobs.contains_key(&task_id) {
            controller.cancel();
            return Err(LifecycleError::DuplicateJob(task_id));
        }

        let handle = controller.spawn(self.shutdown.child_token());
        tracing::info!(task_id = %task_id, running = self.jobs.len() + 1, "job loop started");
        self.jobs.insert(task_id.clone(), handle);
        Ok(task_id)
    }

    pub fn subscribe(&self, task_id: &str) -> Option<watch::Receiver<ControllerStatus>> {
        self.jobs.get(task_id).map(ControllerHandle::subscribe)
    }

    pub fn status(&self, task_id: &str) -> Option<ControllerStatus> {
        self.jobs.get(task_id).map(ControllerHandle::status)
    }

    /// Request an out-of-band poll for one job
    pub fn poll_now(&self, task_id: &str) -> Result<bool> {
        self.jobs
            .get(task_id)
            .map(ControllerHandle::poll_now)
            .ok_or_else(|| LifecycleError::UnknownJob(task_id.to_string()))
    }

    pub fn runtime_status(&self, task_id: &str) -> Option<JobRuntimeStatus> {
        self.jobs.get(task_id).map(runtime_status_of)
    }

    pub fn runtime_status_snapshot(&self) -> HashMap<String, JobRuntimeStatus> {
        self.jobs
            .iter()
            .map(|(task_id, handle)| (task_id.clone(), runtime_status_of(handle)))
            .collect()
    }

    /// Cancel one job and wait for its loop to hand the controller back.
    pub async fn cancel(&mut self, task_id: &str) -> Result<LifecycleController<C>> {
        let Some(mut handle) = self.jobs.remove(task_id) else {
            return Err(LifecycleError::UnknownJob(task_id.to_string()));
        };

        handle.cancel();
        let deadline = Instant::now() + self.shutdown_timeout;

        tokio::select! {
            res = handle.join_handle_mut() => res.map_err(join_error),
            _ = sleep_until(deadline) => {
                handle.abort();
                Err(LifecycleError::ShutdownTimedOut(self.shutdown_timeout))
            }
        }
    }

    /// Wait for every job to reach a terminal state on its own.
    ///
    /// Loops are joined in completion order; if one fails, the rest are aborted.
    pub async fn wait_all(&mut self) -> Result<Vec<LifecycleController<C>>> {
        let mut handles: Vec<(String, ControllerHandle<C>)> =
            std::mem::take(&mut self.jobs).into_iter().collect();
        let mut finished = Vec::with_capacity(handles.len());

        while !handles.is_empty() {
            let (res, index, pending) =
                select_all(handles.iter_mut().map(|(_, handle)| handle.join_handle_mut())).await;
            drop(pending);
            let (task_id, _) = handles.swap_remove(index);

            match res {
                Ok(controller) => finished.push(controller),
                Err(join_err) => {
                    abort_all(handles);
                    tracing::error!(task_id = %task_id, error = %join_err, "job loop failed");
                    return Err(join_error(join_err));
                }
            }
        }

        Ok(finished)
    }

    /// Request graceful shutdown and wait for all job loops to exit.
    ///
    /// Guarantees a bounded shutdown time and aborts remaining loops on timeout.
    pub async fn shutdown_and_wait(&mut self) -> Result<Vec<LifecycleController<C>>> {
        self.shutdown.cancel();
        self.join_all_with_deadline(self.shutdown_timeout).await
    }

    async fn join_all_with_deadline(
        &mut self,
        timeout: Duration,
    ) -> Result<Vec<LifecycleController<C>>> {
        let deadline = Instant::now() + timeout;

        // Drain handles so we can abort remaining ones on timeout.
        let mut handles: Vec<(String, ControllerHandle<C>)> =
            std::mem::take(&mut self.jobs).into_iter().collect();
        let mut finished = Vec::with_capacity(handles.len());

        while let Some((task_id, mut handle)) = handles.pop() {
            tokio::select! {
                res = handle.join_handle_mut() => {
                    match res {
                        Ok(controller) => finished.push(controller),
                        Err(join_err) => {
                            abort_all(handles);
                            tracing::error!(task_id = %task_id, error = %join_err, "job loop failed");
                            return Err(join_error(join_err));
                        }
                    }
                }
                _ = sleep_until(deadline) => {
                    handle.abort();
                    abort_all(handles);
                    return Err(LifecycleError::ShutdownTimedOut(timeout));
                }
            }
        }

        Ok(finished)
    }
}

fn runtime_status_of<C: TransferApi + ?Sized + 'static>(
    handle: &ControllerHandle<C>,
) -> JobRuntimeStatus {
    if handle.is_finished() {
        JobRuntimeStatus::Finished
    } else {
        JobRuntimeStatus::Running
    }
}

fn abort_all<C: TransferApi + ?Sized + 'static>(handles: Vec<(String, ControllerHandle<C>)>) {
    for (_, handle) in handles {
        handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::LifecycleState;
    use crate::testing::{FakeTransfer, mp4};
    use emovid_adapter::PollSnapshot;
    use tokio::time::sleep;
    use tokio_test::{assert_err, assert_ok};

    fn manager(fake: FakeTransfer) -> (Arc<FakeTransfer>, JobManager<FakeTransfer>) {
        let fake = Arc::new(fake);
        let manager = JobManager::new(Arc::clone(&fake), LifecycleConfig::default());
        (fake, manager)
    }

    #[tokio::test(start_paused = true)]
    async fn test_jobs_share_one_client() {
        let (fake, mut manager) = manager(FakeTransfer::new().with_polls([
            Ok(PollSnapshot::completed("results/task-0.mp4")),
            Ok(PollSnapshot::completed("results/task-1.mp4")),
        ]));

        let first = assert_ok!(manager.start(mp4(8)).await);
        let second = assert_ok!(manager.start(mp4(8)).await);
        assert_ne!(first, second);
        assert_eq!(manager.len(), 2);
        assert_eq!(fake.submits(), 2);

        let finished = assert_ok!(manager.wait_all().await);
        assert_eq!(finished.len(), 2);
        assert!(
            finished
                .iter()
                .all(|controller| controller.state() == LifecycleState::Completed)
        );
        assert!(manager.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_failure_tracks_nothing() {
        let (fake, mut manager) = manager(FakeTransfer::new());

        assert_err!(manager.start(mp4(0)).await);
        assert!(manager.is_empty());
        assert_eq!(fake.submits(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_one_leaves_others_running() {
        let (_fake, mut manager) = manager(FakeTransfer::new());
        let first = assert_ok!(manager.start(mp4(8)).await);
        let second = assert_ok!(manager.start(mp4(8)).await);

        sleep(Duration::from_secs(3)).await;
        let cancelled = assert_ok!(manager.cancel(&first).await);
        assert_eq!(cancelled.state(), LifecycleState::Cancelled);

        assert_eq!(manager.task_ids(), vec![second.clone()]);
        assert_eq!(
            manager.runtime_status(&second),
            Some(JobRuntimeStatus::Running)
        );
        assert!(!manager.status(&second).is_some_and(|s| s.state.is_terminal()));

        assert!(matches!(
            manager.cancel(&first).await,
            Err(LifecycleError::UnknownJob(_))
        ));
        assert_ok!(manager.shutdown_and_wait().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_every_job() {
        let (fake, mut manager) = manager(FakeTransfer::new());
        for _ in 0..3 {
            assert_ok!(manager.start(mp4(8)).await);
        }
        sleep(Duration::from_millis(2_500)).await;
        let polls_before = fake.polls();
        assert_eq!(polls_before, 3);

        let finished = assert_ok!(manager.shutdown_and_wait().await);
        assert_eq!(finished.len(), 3);
        assert!(
            finished
                .iter()
                .all(|controller| controller.state() == LifecycleState::Cancelled)
        );

        sleep(Duration::from_secs(10)).await;
        assert_eq!(fake.polls(), polls_before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_is_bounded_by_timeout() {
        let (_fake, manager) =
            manager(FakeTransfer::new().with_poll_delay(Duration::from_secs(120)));
        let mut manager = manager.with_shutdown_timeout(Duration::from_secs(5));
        assert_ok!(manager.start(mp4(8)).await);

        sleep(Duration::from_secs(3)).await;
        // in-flight polls are dropped on cancellation, so shutdown is prompt
        let started = Instant::now();
        assert_ok!(manager.shutdown_and_wait().await);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_loop_aborts_remaining_on_wait_all() {
        let (fake, mut manager) = manager(FakeTransfer::new().with_poll_panic_for("task-0"));
        assert_ok!(manager.start(mp4(8)).await);
        let survivor = assert_ok!(manager.start(mp4(8)).await);
        assert_eq!(survivor, "task-1");

        let err = assert_err!(manager.wait_all().await);
        assert!(matches!(err, LifecycleError::Join(_)));
        assert!(manager.is_empty());

        let polls = fake.polls();
        sleep(Duration::from_secs(20)).await;
        assert_eq!(fake.polls(), polls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_now_unknown_job() {
        let (_fake, manager) = manager(FakeTransfer::new());
        assert!(matches!(
            manager.poll_now("missing"),
            Err(LifecycleError::UnknownJob(_))
        ));
        assert!(manager.subscribe("missing").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_sees_terminal_state() {
        let (_fake, mut manager) = manager(
            FakeTransfer::new().with_polls([Ok(PollSnapshot::failed("no faces detected"))]),
        );
        let task_id = assert_ok!(manager.start(mp4(8)).await);
        let mut status_rx = manager.subscribe(&task_id).expect("subscribed");

        assert_ok!(
            status_rx
                .wait_for(|status| status.state.is_terminal())
                .await
        );
        let status = status_rx.borrow().clone();
        assert_eq!(status.state, LifecycleState::Failed);
        assert_eq!(
            status.error.as_deref(),
            Some("processing failed: no faces detected")
        );

        let snapshot = manager.runtime_status_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_ok!(manager.wait_all().await);
    }
}
