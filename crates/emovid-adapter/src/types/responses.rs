/*
[INPUT]:  JSON bodies returned by /upload and /status/{task_id}
[OUTPUT]: Typed response structs and the PollSnapshot observation
[POS]:    Data layer - response types for service communication
[UPDATE]: When service response format changes
*/

use crate::types::RemoteStatus;
use serde::{Deserialize, Serialize};

/// Body of a successful `POST /upload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub task_id: String,
}

/// What `submit` hands back: the service-assigned id bound to the payload it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub task_id: String,
    pub file_name: String,
    pub size_bytes: u64,
}

/// A single observation of job state, as returned by `GET /status/{task_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSnapshot {
    pub status: RemoteStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PollSnapshot {
    pub fn processing() -> Self {
        Self {
            status: RemoteStatus::Processing,
            result_path: None,
            error: None,
        }
    }

    pub fn completed(result_path: impl Into<String>) -> Self {
        Self {
            status: RemoteStatus::Completed,
            result_path: Some(result_path.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: RemoteStatus::Failed,
            result_path: None,
            error: Some(error.into()),
        }
    }
}
