//! Stream session configuration

use crate::errors::{StreamError, StreamResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_ENDPOINT_URL: &str = "http://127.0.0.1:8000/api/chat/stream";
const DEFAULT_MAX_TOKENS: u32 = 2048;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Stream endpoint the request body is posted to.
    pub endpoint_url: String,
    pub default_max_tokens: u32,
    pub include_reasoning: bool,
    pub connect_timeout_secs: u64,
    /// Longest silence tolerated between two chunks.
    pub idle_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            endpoint_url: DEFAULT_ENDPOINT_URL.to_string(),
            default_max_tokens: DEFAULT_MAX_TOKENS,
            include_reasoning: true,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            user_agent: format!("Parley-Stream/{}", crate::VERSION),
        }
    }
}

impl StreamConfig {
    pub fn with_endpoint(endpoint_url: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            ..Default::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn validate(&self) -> StreamResult<()> {
        if self.endpoint_url.trim().is_empty() {
            return Err(StreamError::Config("endpoint_url must not be empty".to_string()));
        }
        if self.default_max_tokens == 0 {
            return Err(StreamError::Config(
                "default_max_tokens must be greater than 0".to_string(),
            ));
        }
        if self.connect_timeout_secs == 0 || self.idle_timeout_secs == 0 {
            return Err(StreamError::Config("timeouts must be greater than 0".to_string()));
        }
        Ok(())
    }
}
