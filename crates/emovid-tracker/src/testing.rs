/*
[INPUT]:  Scripted poll results, injected faults and delays
[OUTPUT]: In-memory TransferApi with call counters for unit tests
[POS]:    Test infrastructure - shared by controller and manager tests
[UPDATE]: When TransferApi gains operations or tests need new fault modes
*/

use async_trait::async_trait;
use emovid_adapter::{PollSnapshot, SubmitReceipt, TransferApi, TransferError, VideoPayload};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use url::Url;

pub const ARTIFACT: &[u8] = b"annotated-video-bytes";

/// Replays queued poll results; an empty queue reports `processing`.
#[derive(Debug, Default)]
pub struct FakeTransfer {
    polls: Mutex<VecDeque<emovid_adapter::Result<PollSnapshot>>>,
    poll_delay: Option<Duration>,
    poll_panic_for: Option<String>,
    location_error: Option<TransferError>,
    probe_error: Option<TransferError>,
    submit_error: Option<TransferError>,
    next_task: AtomicUsize,
    poll_count: AtomicUsize,
    submit_count: AtomicUsize,
    probe_count: AtomicUsize,
}

impl FakeTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_polls(
        self,
        polls: impl IntoIterator<Item = emovid_adapter::Result<PollSnapshot>>,
    ) -> Self {
        if let Ok(mut queue) = self.polls.lock() {
            queue.extend(polls);
        }
        self
    }

    pub fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = Some(delay);
        self
    }

    /// Panic inside `poll` for one task id, failing that job's loop
    pub fn with_poll_panic_for(mut self, task_id: &str) -> Self {
        self.poll_panic_for = Some(task_id.to_string());
        self
    }

    pub fn with_location_error(mut self, err: TransferError) -> Self {
        self.location_error = Some(err);
        self
    }

    pub fn with_probe_error(mut self, err: TransferError) -> Self {
        self.probe_error = Some(err);
        self
    }

    pub fn with_submit_error(mut self, err: TransferError) -> Self {
        self.submit_error = Some(err);
        self
    }

    pub fn polls(&self) -> usize {
        self.poll_count.load(Ordering::SeqCst)
    }

    pub fn submits(&self) -> usize {
        self.submit_count.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probe_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransferApi for FakeTransfer {
    async fn submit(&self, payload: VideoPayload) -> emovid_adapter::Result<SubmitReceipt> {
        self.submit_count.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.submit_error {
            return Err(err.clone());
        }
        let n = self.next_task.fetch_add(1, Ordering::SeqCst);
        Ok(SubmitReceipt {
            task_id: format!("task-{n}"),
            file_name: payload.file_name().to_string(),
            size_bytes: payload.len(),
        })
    }

    async fn poll(&self, task_id: &str) -> emovid_adapter::Result<PollSnapshot> {
        self.poll_count.fetch_add(1, Ordering::SeqCst);
        if self.poll_panic_for.as_deref() == Some(task_id) {
            panic!("scripted poll panic for {task_id}");
        }
        if let Some(delay) = self.poll_delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.polls.lock().ok().and_then(|mut queue| queue.pop_front());
        next.unwrap_or_else(|| Ok(PollSnapshot::processing()))
    }

    fn result_location(&self, task_id: &str) -> emovid_adapter::Result<Url> {
        if let Some(err) = &self.location_error {
            return Err(err.clone());
        }
        Url::parse(&format!("http://fake.local/download/{task_id}"))
            .map_err(|err| TransferError::InvalidUrl(err.to_string()))
    }

    async fn download_to(
        &self,
        _task_id: &str,
        writer: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> emovid_adapter::Result<u64> {
        writer
            .write_all(ARTIFACT)
            .await
            .map_err(|err| TransferError::Io(err.to_string()))?;
        Ok(ARTIFACT.len() as u64)
    }

    async fn probe(&self) -> emovid_adapter::Result<()> {
        self.probe_count.fetch_add(1, Ordering::SeqCst);
        match &self.probe_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

pub fn mp4(size: usize) -> VideoPayload {
    VideoPayload::from_bytes("clip.mp4", vec![7u8; size])
}
