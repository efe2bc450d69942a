/*
[INPUT]:  Video bytes, file name, declared media type, size policy
[OUTPUT]: Immutable VideoPayload and local validation results
[POS]:    Data layer - upload payload rules (checked before any network call)
[UPDATE]: When accepted containers or size limits change
*/

use crate::types::VideoContainer;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Largest upload the service advertises (100 MiB).
pub const DEFAULT_MAX_PAYLOAD_BYTES: u64 = 100 * 1024 * 1024;

const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

/// Reasons a payload is refused locally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("video file is empty")]
    Empty,

    #[error("video file is {size} bytes, limit is {max} bytes")]
    TooLarge { size: u64, max: u64 },

    #[error("unsupported video type '{0}', expected one of: mp4, avi, mov, mkv")]
    UnsupportedType(String),
}

/// Size policy applied by [`VideoPayload::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadPolicy {
    pub max_bytes: u64,
}

impl Default for PayloadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}

/// Video content plus the metadata sent with it in the `video` multipart field.
///
/// Fields are private so a payload cannot change after construction; `submit`
/// takes it by value.
#[derive(Clone, PartialEq, Eq)]
pub struct VideoPayload {
    file_name: String,
    media_type: String,
    content: Vec<u8>,
}

impl VideoPayload {
    pub fn new(
        file_name: impl Into<String>,
        media_type: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            media_type: media_type.into(),
            content: content.into(),
        }
    }

    /// Build a payload whose media type is inferred from the file extension.
    pub fn from_bytes(file_name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        let file_name = file_name.into();
        let media_type = extension_of(&file_name)
            .and_then(VideoContainer::from_extension)
            .map(|container| container.mime_type())
            .unwrap_or(FALLBACK_MEDIA_TYPE)
            .to_string();
        Self::new(file_name, media_type, content)
    }

    /// Read a payload from disk.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());
        Ok(Self::from_bytes(file_name, content))
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn len(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Container implied by the file extension, or by the declared media type
    /// when the name has no extension.
    pub fn container(&self) -> Option<VideoContainer> {
        match extension_of(&self.file_name) {
            Some(extension) => VideoContainer::from_extension(extension),
            None => VideoContainer::from_mime(&self.media_type),
        }
    }

    /// Check emptiness, size and container type.
    pub fn validate(&self, policy: &PayloadPolicy) -> Result<VideoContainer, ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::Empty);
        }
        if self.len() > policy.max_bytes {
            return Err(ValidationError::TooLarge {
                size: self.len(),
                max: policy.max_bytes,
            });
        }
        self.container().ok_or_else(|| {
            let declared = extension_of(&self.file_name).unwrap_or(&self.media_type);
            ValidationError::UnsupportedType(declared.to_string())
        })
    }

    pub(crate) fn into_parts(self) -> (String, String, Vec<u8>) {
        (self.file_name, self.media_type, self.content)
    }
}

impl fmt::Debug for VideoPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoPayload")
            .field("file_name", &self.file_name)
            .field("media_type", &self.media_type)
            .field("len", &self.content.len())
            .finish()
    }
}

fn extension_of(file_name: &str) -> Option<&str> {
    Path::new(file_name)
        .extension()
        .and_then(|extension| extension.to_str())
}
