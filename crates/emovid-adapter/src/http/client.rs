/*
[INPUT]:  HTTP configuration (base URL, timeouts, probe endpoint)
[OUTPUT]: Configured reqwest client ready for service calls
[POS]:    HTTP layer - core client implementation
[UPDATE]: When adding connection options or changing client behavior
*/

use crate::http::{Result, TransferError};
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Base URL used when none is configured
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Lightweight endpoint used for the liveness probe
pub const DEFAULT_PROBE_PATH: &str = "/docs";

const REQUEST_ID_HEADER: &str = "x-request-id";

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub probe_timeout: Duration,
    pub probe_path: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(5),
            probe_path: DEFAULT_PROBE_PATH.to_string(),
        }
    }
}

/// HTTP client for the processing service.
///
/// Cheap to share: the inner `reqwest::Client` pools connections, so one
/// instance behind an `Arc` serves any number of controllers.
#[derive(Debug, Clone)]
pub struct EmovidClient {
    http_client: Client,
    base_url: Url,
    probe_timeout: Duration,
    probe_path: String,
}

impl EmovidClient {
    /// Create a new client against the default base URL
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Create a new client with default configuration
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        Self::with_config_and_base_url(ClientConfig::default(), base_url)
    }

    /// Create a new client with custom configuration and base URL
    pub fn with_config_and_base_url(config: ClientConfig, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url.trim())?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(TransferError::InvalidUrl(format!(
                "{base_url} is not an http(s) base address"
            )));
        }

        let http_client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url,
            probe_timeout: config.probe_timeout,
            probe_path: config.probe_path,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    pub(crate) fn probe_segments(&self) -> Vec<&str> {
        self.probe_path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect()
    }

    /// Build full URL by appending path segments to the base URL.
    ///
    /// Segments are percent-encoded and any path prefix on the base is kept.
    pub(crate) fn endpoint_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                TransferError::InvalidUrl(format!("{} cannot be a base URL", self.base_url))
            })?;
            path.pop_if_empty();
            path.extend(segments);
        }
        url.set_query(None);
        Ok(url)
    }

    /// Build request builder tagged with a fresh request id
    pub(crate) fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        let url = self.endpoint_url(segments)?;
        let request_id = Uuid::new_v4().to_string();
        debug!(%method, %url, %request_id, "building request");
        Ok(self
            .http_client
            .request(method, url)
            .header(REQUEST_ID_HEADER, request_id))
    }

    /// Send a request, mapping transport failures to `TransferError`
    pub(crate) async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send().await?;
        debug!(status = %response.status(), url = %response.url(), "response received");
        Ok(response)
    }

    /// Send a request and decode a JSON success body
    pub(crate) async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = self.send(builder).await?;
        let response = ensure_success(response).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Turn a non-success response into `ServerRejected`, keeping the body verbatim
pub(crate) async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransferError::server_rejected(status, body))
}
