/*
[INPUT]:  Task identifiers returned by submit
[OUTPUT]: Poll snapshots, result locations, artifact bytes, liveness
[POS]:    HTTP layer - job status, result and liveness endpoints
[UPDATE]: When adding new endpoints or changing response format
*/

use crate::http::client::ensure_success;
use crate::http::{EmovidClient, Result, TransferError};
use crate::types::PollSnapshot;
use futures_util::StreamExt;
use reqwest::{Method, StatusCode, Url};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

impl EmovidClient {
    /// Query job status
    ///
    /// GET /status/{task_id}
    pub async fn poll(&self, task_id: &str) -> Result<PollSnapshot> {
        let builder = self.request(Method::GET, &["status", task_id])?;
        let response = self.send(builder).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(TransferError::NotFound {
                task_id: task_id.to_string(),
            });
        }
        let response = ensure_success(response).await?;
        let body = response.text().await?;
        let snapshot: PollSnapshot = serde_json::from_str(&body)?;
        debug!(task_id = %task_id, status = %snapshot.status, "status polled");
        Ok(snapshot)
    }

    /// Download location of a job's artifact
    ///
    /// {base}/download/{task_id}; no request is made.
    pub fn result_location(&self, task_id: &str) -> Result<Url> {
        self.endpoint_url(&["download", task_id])
    }

    /// Stream a completed job's artifact into `writer`, returning the byte count
    ///
    /// GET /download/{task_id}
    pub async fn download_to<W>(&self, task_id: &str, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let builder = self.request(Method::GET, &["download", task_id])?;
        let response = self.send(builder).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(TransferError::NotFound {
                task_id: task_id.to_string(),
            });
        }
        let response = ensure_success(response).await?;

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;

        info!(task_id = %task_id, bytes = written, "artifact downloaded");
        Ok(written)
    }

    /// Check that the service answers before submitting work
    ///
    /// GET {probe_path} (default /docs) with a short timeout
    pub async fn probe(&self) -> Result<()> {
        let segments = self.probe_segments();
        let builder = self
            .request(Method::GET, &segments)?
            .timeout(self.probe_timeout());
        let response = self.send(builder).await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TransferError::unreachable(format!(
                "liveness probe returned HTTP {}",
                status.as_u16()
            )))
        }
    }
}
