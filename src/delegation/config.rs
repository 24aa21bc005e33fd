use std::time::Duration;

use serde::Deserialize;

use crate::config::deserialize_duration;
use crate::delegation::error::DelegationError;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DelegationConfig {
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout", deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Pass summaries waiting for submission; more are dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_retries() -> u32 {
    3
}

fn default_queue_capacity() -> usize {
    32
}

impl DelegationConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            timeout: default_timeout(),
            max_retries: default_max_retries(),
            queue_capacity: default_queue_capacity(),
        }
    }

    pub fn validate(&self) -> Result<(), DelegationError> {
        if self.endpoint.trim().is_empty() {
            return Err(DelegationError::InvalidConfig(
                "endpoint must be provided".into(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(DelegationError::InvalidConfig(
                "timeout must be positive".into(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(DelegationError::InvalidConfig(
                "queue capacity must be positive".into(),
            ));
        }
        Ok(())
    }
}
