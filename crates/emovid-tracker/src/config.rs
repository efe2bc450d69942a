/*
[INPUT]:  YAML configuration file, BACKEND_URL override
[OUTPUT]: Parsed tracker configuration and derived client/controller settings
[POS]:    Configuration layer - service address, poll cadence, payload limits
[UPDATE]: When adding new configuration options
*/

use crate::controller::LifecycleConfig;
use anyhow::{Context, bail};
use emovid_adapter::http::{DEFAULT_BASE_URL, DEFAULT_PROBE_PATH};
use emovid_adapter::{ClientConfig, DEFAULT_MAX_PAYLOAD_BYTES, EmovidClient, PayloadPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Top-level configuration for the tracker
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TrackerConfig {
    /// Base address of the processing service
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    /// Delay between scheduled status polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Consecutive poll faults tolerated before giving up
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    /// Largest video accepted for upload
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: u64,
    /// Probe the service before each submission
    #[serde(default = "default_require_liveness")]
    pub require_liveness: bool,
    /// Endpoint used by the liveness probe
    #[serde(default = "default_probe_path")]
    pub probe_path: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            poll_interval_ms: default_poll_interval_ms(),
            max_consecutive_failures: default_max_consecutive_failures(),
            max_payload_bytes: default_max_payload_bytes(),
            require_liveness: default_require_liveness(),
            probe_path: default_probe_path(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

fn default_backend_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_max_consecutive_failures() -> u32 {
    5
}

fn default_max_payload_bytes() -> u64 {
    DEFAULT_MAX_PAYLOAD_BYTES
}

fn default_require_liveness() -> bool {
    true
}

fn default_probe_path() -> String {
    DEFAULT_PROBE_PATH.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_probe_timeout_secs() -> u64 {
    5
}

impl TrackerConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(content).context("parse tracker config")?;
        config.validate()?;
        Ok(config)
    }

    /// Replace the backend address, e.g. from `BACKEND_URL`
    pub fn with_backend_url(mut self, backend_url: impl Into<String>) -> Self {
        self.backend_url = backend_url.into();
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let url = Url::parse(&self.backend_url)
            .with_context(|| format!("backend_url '{}' is not a valid URL", self.backend_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("backend_url must use http or https, got '{}'", url.scheme());
        }
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than zero");
        }
        if self.max_consecutive_failures == 0 {
            bail!("max_consecutive_failures must be greater than zero");
        }
        if self.max_payload_bytes == 0 {
            bail!("max_payload_bytes must be greater than zero");
        }
        if self.request_timeout_secs == 0 || self.probe_timeout_secs == 0 {
            bail!("timeouts must be greater than zero");
        }
        Ok(())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            probe_path: self.probe_path.clone(),
        }
    }

    pub fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_consecutive_failures: self.max_consecutive_failures,
            payload_policy: PayloadPolicy {
                max_bytes: self.max_payload_bytes,
            },
            require_liveness: self.require_liveness,
        }
    }

    pub fn build_client(&self) -> anyhow::Result<EmovidClient> {
        EmovidClient::with_config_and_base_url(self.client_config(), &self.backend_url)
            .with_context(|| format!("create client for {}", self.backend_url))
    }
}
