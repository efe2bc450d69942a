/*
[INPUT]:  HTTP client configuration and service endpoints
[OUTPUT]: HTTP responses and typed service results
[POS]:    HTTP layer - processing service communication
[UPDATE]: When adding new endpoints or changing client behavior
*/

pub mod client;
pub mod error;
pub mod status;
pub mod upload;

pub use error::{Result, TransferError};

pub use client::{ClientConfig, DEFAULT_BASE_URL, DEFAULT_PROBE_PATH, EmovidClient};

use crate::types::{PollSnapshot, SubmitReceipt, VideoPayload};
use async_trait::async_trait;
use reqwest::Url;
use tokio::io::AsyncWrite;

/// The remote operations a job lifecycle needs.
///
/// Implementations must be safe to share between concurrently running
/// controllers.
#[async_trait]
pub trait TransferApi: Send + Sync {
    /// POST /upload
    async fn submit(&self, payload: VideoPayload) -> Result<SubmitReceipt>;

    /// GET /status/{task_id}
    async fn poll(&self, task_id: &str) -> Result<PollSnapshot>;

    /// Download location for a completed job (no network I/O)
    fn result_location(&self, task_id: &str) -> Result<Url>;

    /// GET /download/{task_id}, streamed into `writer`
    async fn download_to(
        &self,
        task_id: &str,
        writer: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64>;

    /// Liveness check run before allowing submission
    async fn probe(&self) -> Result<()>;
}

#[async_trait]
impl TransferApi for EmovidClient {
    async fn submit(&self, payload: VideoPayload) -> Result<SubmitReceipt> {
        EmovidClient::submit(self, payload).await
    }

    async fn poll(&self, task_id: &str) -> Result<PollSnapshot> {
        EmovidClient::poll(self, task_id).await
    }

    fn result_location(&self, task_id: &str) -> Result<Url> {
        EmovidClient::result_location(self, task_id)
    }

    async fn download_to(
        &self,
        task_id: &str,
        writer: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64> {
        EmovidClient::download_to(self, task_id, writer).await
    }

    async fn probe(&self) -> Result<()> {
        EmovidClient::probe(self).await
    }
}
