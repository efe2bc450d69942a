/*
[INPUT]:  Error sources (network, HTTP status, serialization, URL, local IO)
[OUTPUT]: TransferError with a uniform classification and retry hint
[POS]:    Error handling layer - unified error type for the transfer client
[UPDATE]: When adding new error sources or changing transient classification
*/

use reqwest::StatusCode;
use std::error::Error as _;
use thiserror::Error;

/// Failure of a single transfer operation.
///
/// Carries owned strings rather than source errors so results can be cloned
/// into caller-visible state and compared in tests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// Network failure: timeout, connection refused, DNS, failed liveness probe
    #[error("processing service unreachable: {message}")]
    Unreachable { message: String },

    /// The service does not know the task id (404)
    #[error("task '{task_id}' not found on the processing service")]
    NotFound { task_id: String },

    /// Non-success status with the service-provided body
    #[error("processing service rejected the request (HTTP {status}): {message}")]
    ServerRejected { status: u16, message: String },

    /// Success status but a body that does not match the protocol
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// URL building failed
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Client configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Writing a downloaded artifact failed
    #[error("failed to write artifact: {0}")]
    Io(String),
}

impl TransferError {
    /// Check if a retry on the next poll tick may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            TransferError::Unreachable { .. }
            | TransferError::NotFound { .. }
            | TransferError::InvalidResponse(_) => true,
            TransferError::ServerRejected { status, .. } => {
                *status >= 500
                    || *status == StatusCode::REQUEST_TIMEOUT.as_u16()
                    || *status == StatusCode::TOO_MANY_REQUESTS.as_u16()
            }
            TransferError::InvalidUrl(_) | TransferError::Config(_) | TransferError::Io(_) => {
                false
            }
        }
    }

    /// HTTP status associated with the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransferError::NotFound { .. } => Some(StatusCode::NOT_FOUND.as_u16()),
            TransferError::ServerRejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Create a rejection from a status code and the response body.
    ///
    /// An empty body falls back to the canonical reason phrase.
    pub fn server_rejected(status: StatusCode, body: impl Into<String>) -> Self {
        let body = body.into();
        let message = if body.trim().is_empty() {
            status
                .canonical_reason()
                .unwrap_or("no error message")
                .to_string()
        } else {
            body
        };
        TransferError::ServerRejected {
            status: status.as_u16(),
            message,
        }
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        TransferError::Unreachable {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for TransferError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            return TransferError::Config(error_chain(&err));
        }
        if err.is_decode() {
            return TransferError::InvalidResponse(error_chain(&err));
        }
        // connect, timeout, request and body failures all mean the service could not be reached
        TransferError::Unreachable {
            message: error_chain(&err),
        }
    }
}

impl From<serde_json::Error> for TransferError {
    fn from(err: serde_json::Error) -> Self {
        TransferError::InvalidResponse(err.to_string())
    }
}

impl From<url::ParseError> for TransferError {
    fn from(err: url::ParseError) -> Self {
        TransferError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for TransferError {
    fn from(err: std::io::Error) -> Self {
        TransferError::Io(err.to_string())
    }
}

/// Render an error with its sources, e.g. "error sending request: ... : Connection refused".
fn error_chain(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

/// Result type alias for transfer operations
pub type Result<T> = std::result::Result<T, TransferError>;
