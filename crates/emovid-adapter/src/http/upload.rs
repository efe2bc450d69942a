/*
[INPUT]:  VideoPayload (content, file name, media type)
[OUTPUT]: SubmitReceipt carrying the service-assigned task id
[POS]:    HTTP layer - job creation endpoint
[UPDATE]: When the upload form or its response changes
*/

use crate::http::{EmovidClient, Result, TransferError};
use crate::types::{SubmitReceipt, UploadResponse, VideoPayload};
use reqwest::Method;
use reqwest::multipart::{Form, Part};
use tracing::info;

/// Multipart field the service reads the video from
const VIDEO_FIELD: &str = "video";

impl EmovidClient {
    /// Submit a video for processing
    ///
    /// POST /upload (multipart field `video`)
    pub async fn submit(&self, payload: VideoPayload) -> Result<SubmitReceipt> {
        let size_bytes = payload.len();
        let (file_name, media_type, content) = payload.into_parts();

        let part = Part::bytes(content)
            .file_name(file_name.clone())
            .mime_str(&media_type)
            .map_err(|err| {
                TransferError::Config(format!("invalid media type '{media_type}': {err}"))
            })?;
        let form = Form::new().part(VIDEO_FIELD, part);

        let builder = self.request(Method::POST, &["upload"])?.multipart(form);
        let response: UploadResponse = self.send_json(builder).await?;

        let task_id = response.task_id;
        if task_id.trim().is_empty() {
            return Err(TransferError::InvalidResponse(
                "upload response carried an empty task_id".to_string(),
            ));
        }

        info!(task_id = %task_id, file_name = %file_name, size_bytes, "video submitted");
        Ok(SubmitReceipt {
            task_id,
            file_name,
            size_bytes,
        })
    }
}
