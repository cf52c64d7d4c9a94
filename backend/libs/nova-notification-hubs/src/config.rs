use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;
use validator::Validate;

use crate::errors::{HubError, Result};
use crate::validation::DEFAULT_MAX_PAYLOAD_BYTES;

/// Environment prefix, e.g. `AZURE_NOTIFICATION_HUB_CONNECTION_STRING`
pub const ENV_PREFIX: &str = "AZURE_NOTIFICATION_HUB_";

/// Notification hub client configuration
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct HubConfig {
    /// `Endpoint=sb://...;SharedAccessKeyName=...;SharedAccessKey=...`
    pub connection_string: SecretString,

    /// Hub name within the namespace (`AZURE_NOTIFICATION_HUB_PATH`)
    #[serde(rename = "path")]
    #[validate(length(min = 1, max = 260))]
    pub hub_path: String,

    /// Validity window of each signed token
    #[validate(range(min = 60, max = 86400))]
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,

    /// Upper bound for a single request/response round trip
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Upper bound for a whole fan-out send
    #[validate(range(min = 1, max = 3600))]
    #[serde(default = "default_batch_timeout_secs")]
    pub batch_timeout_secs: u64,

    #[validate(range(min = 1, max = 256))]
    #[serde(default = "default_max_concurrent_sends")]
    pub max_concurrent_sends: usize,

    #[validate(range(min = 1, max = 65536))]
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

fn default_token_ttl_secs() -> u64 {
    3600
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_batch_timeout_secs() -> u64 {
    120
}

fn default_max_concurrent_sends() -> usize {
    16
}

fn default_max_payload_bytes() -> usize {
    DEFAULT_MAX_PAYLOAD_BYTES
}

impl HubConfig {
    pub fn new(connection_string: impl Into<String>, hub_path: impl Into<String>) -> Self {
        Self {
            connection_string: SecretString::from(connection_string.into()),
            hub_path: hub_path.into(),
            token_ttl_secs: default_token_ttl_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            batch_timeout_secs: default_batch_timeout_secs(),
            max_concurrent_sends: default_max_concurrent_sends(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }

    /// Load from `AZURE_NOTIFICATION_HUB_*` variables, reading `.env` first if present
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config: HubConfig = envy::prefixed(ENV_PREFIX)
            .from_env()
            .map_err(|e| HubError::Configuration(format!("Failed to load hub config: {}", e)))?;

        config.check()?;
        Ok(config)
    }

    /// Run the range checks and turn violations into a configuration error
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| HubError::Configuration(format!("Invalid hub config: {}", e)))
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.token_ttl_secs as i64)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }
}
