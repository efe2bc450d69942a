/*
[INPUT]:  Service status vocabulary and accepted video containers
[OUTPUT]: Typed Rust enums with serialization support
[POS]:    Data layer - type definitions for service communication
[UPDATE]: When status labels or accepted containers change
*/

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status label reported by `GET /status/{task_id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    /// Not part of the documented vocabulary, tolerated for services that report it.
    Queued,
    Processing,
    Completed,
    Failed,
}

impl RemoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteStatus::Queued => "queued",
            RemoteStatus::Processing => "processing",
            RemoteStatus::Completed => "completed",
            RemoteStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RemoteStatus::Completed | RemoteStatus::Failed)
    }
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Video containers the processing service accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoContainer {
    Mp4,
    Avi,
    Mov,
    Mkv,
}

impl VideoContainer {
    pub const ALL: [VideoContainer; 4] = [
        VideoContainer::Mp4,
        VideoContainer::Avi,
        VideoContainer::Mov,
        VideoContainer::Mkv,
    ];

    /// Match a file extension, case-insensitively and with or without the leading dot.
    pub fn from_extension(extension: &str) -> Option<Self> {
        let extension = extension.trim_start_matches('.');
        Self::ALL
            .into_iter()
            .find(|container| container.extension().eq_ignore_ascii_case(extension))
    }

    /// Match a declared MIME type, ignoring parameters such as `; codecs=...`.
    pub fn from_mime(media_type: &str) -> Option<Self> {
        let essence = media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "video/mp4" => Some(VideoContainer::Mp4),
            "video/x-msvideo" | "video/avi" | "video/msvideo" => Some(VideoContainer::Avi),
            "video/quicktime" => Some(VideoContainer::Mov),
            "video/x-matroska" => Some(VideoContainer::Mkv),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            VideoContainer::Mp4 => "mp4",
            VideoContainer::Avi => "avi",
            VideoContainer::Mov => "mov",
            VideoContainer::Mkv => "mkv",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            VideoContainer::Mp4 => "video/mp4",
            VideoContainer::Avi => "video/x-msvideo",
            VideoContainer::Mov => "video/quicktime",
            VideoContainer::Mkv => "video/x-matroska",
        }
    }
}

impl fmt::Display for VideoContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
