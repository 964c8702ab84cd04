//! CLI configuration: config file, then environment, then flags

use anyhow::{Context, Result};
use parley_stream::StreamConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const ENDPOINT_ENV: &str = "PARLEY_ENDPOINT";
const TOKEN_ENV: &str = "PARLEY_TOKEN";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub stream: StreamConfig,
    /// Bearer token for the stream endpoint.
    pub token: Option<String>,
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("parley").join("config.toml"))
}

impl CliConfig {
    /// Read `path`, or the default location when `None`. A missing default
    /// file yields defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match default_config_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            if explicit {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn apply_env(&mut self) {
        if let Ok(endpoint) = std::env::var(ENDPOINT_ENV) {
            if !endpoint.trim().is_empty() {
                self.stream.endpoint_url = endpoint;
            }
        }
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            self.token = Some(token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CliConfig;

    #[test]
    fn parses_stream_section_and_token() {
        let config = CliConfig::parse(
            r#"
token = "abc"

[stream]
endpoint_url = "https://chat.example/api/chat/stream"
idle_timeout_secs = 30
"#,
        )
        .expect("valid config");
        assert_eq!(config.token.as_deref(), Some("abc"));
        assert_eq!(config.stream.endpoint_url, "https://chat.example/api/chat/stream");
        assert_eq!(config.stream.idle_timeout_secs, 30);
        assert_eq!(config.stream.default_max_tokens, 2048);
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config = CliConfig::parse("").expect("valid config");
        assert!(config.token.is_none());
        assert!(config.stream.validate().is_ok());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let missing = std::env::temp_dir().join("parley-missing-config-test.toml");
        assert!(CliConfig::load(Some(&missing)).is_err());
    }
}
