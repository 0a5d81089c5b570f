//! Connection configuration.
//!
//! Loaded once at startup from a YAML document:
//!
//! ```yaml
//! tokenEndpoint: https://login.example.com/oauth2/token
//! clientId: odfs-mount
//! clientSecret: s3cret
//! odfsEndpoint: https://odfs.example.com/api
//! # optional
//! requestTimeout: 30s
//! maxRetries: 2
//! ```

use crate::error::{OdfsError, OdfsResult};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;

/// Default per-request HTTP timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on a single remote call, including the token request.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Default number of retries for idempotent reads.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default backoff step between retries (multiplied by the attempt number).
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// OAuth scope requested when none is configured.
pub const DEFAULT_SCOPE: &str = "Files.Read";

/// Credentials and endpoints for one ODFS deployment.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OdfsConfig {
    /// OAuth2 token endpoint for the client-credentials exchange.
    pub token_endpoint: String,

    pub client_id: String,

    #[serde(deserialize_with = "deserialize_secret")]
    pub client_secret: SecretString,

    /// Base URL of the ODFS API (paths like `/containers` are appended).
    pub odfs_endpoint: String,

    #[serde(default = "default_scope")]
    pub scope: String,

    /// Timeout applied to each HTTP request.
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Timeout applied to each remote call as it crosses into the async
    /// runtime. Every retry attempt gets its own budget.
    #[serde(default = "default_operation_timeout", with = "humantime_serde")]
    pub operation_timeout: Duration,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_backoff", with = "humantime_serde")]
    pub retry_backoff: Duration,

    /// Skip TLS certificate verification (self-signed test deployments).
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_operation_timeout() -> Duration {
    DEFAULT_OPERATION_TIMEOUT
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_backoff() -> Duration {
    DEFAULT_RETRY_BACKOFF
}

impl OdfsConfig {
    /// Reads and validates a configuration file.
    pub fn load(path: &Path) -> OdfsResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| OdfsError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_yaml(&text)
    }

    /// Parses and validates a YAML configuration document.
    pub fn from_yaml(text: &str) -> OdfsResult<Self> {
        let config: Self =
            serde_yaml::from_str(text).map_err(|e| OdfsError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> OdfsResult<()> {
        for (key, value) in [
            ("tokenEndpoint", &self.token_endpoint),
            ("odfsEndpoint", &self.odfs_endpoint),
        ] {
            reqwest::Url::parse(value)
                .map_err(|e| OdfsError::Config(format!("{key} is not a valid URL: {e}")))?;
        }
        if self.client_id.trim().is_empty() {
            return Err(OdfsError::Config("clientId must not be empty".into()));
        }
        Ok(())
    }

    /// The API base URL without a trailing slash.
    pub fn api_base(&self) -> &str {
        self.odfs_endpoint.trim_end_matches('/')
    }
}
