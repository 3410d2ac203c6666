//! Parser limits and driver configuration.
//!
//! Both types deserialize from JSON with every field optional, so a config
//! file only needs to name what it overrides:
//!
//! ```
//! use rttp_ingest::config::Config;
//!
//! let config = Config::from_json_str(r#"{ "limits": { "max_body_size": 1024 } }"#).unwrap();
//! assert_eq!(config.limits.max_body_size, 1024);
//! assert_eq!(config.limits.max_headers, 64);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::MAX_BODY_SIZE;

/// Errors raised while loading a [`Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Resource bounds enforced while ingesting a single request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Largest declared or decoded body, in bytes.
    pub max_body_size: u64,
    /// Longest start line (and request target) before a CRLF must appear.
    pub max_line_len: usize,
    /// Maximum number of header fields.
    pub max_headers: usize,
    /// Maximum size of the header block including its terminator.
    pub max_header_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_body_size: MAX_BODY_SIZE,
            max_line_len: 8 * 1024,
            max_headers: 64,
            max_header_bytes: 64 * 1024,
        }
    }
}

/// Configuration of the connection driver in [`crate::server`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    /// Seconds a connection may stay silent mid-request before it gets a 408.
    pub read_timeout_secs: u64,
    pub limits: Limits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_owned(),
            read_timeout_secs: 30,
            limits: Limits::default(),
        }
    }
}

impl Config {
    /// Parses a JSON document; absent fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Builds the config from the environment.
    ///
    /// `RTTP_CONFIG` names a JSON file to start from; `RTTP_LISTEN`
    /// overrides the listen address.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("RTTP_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        if let Ok(addr) = std::env::var("RTTP_LISTEN") {
            config.listen_addr = addr;
        }
        Ok(config)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        let config = Config::from_json_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.limits.max_body_size, MAX_BODY_SIZE);
    }

    #[test]
    fn partial_override() {
        let config = Config::from_json_str(
            r#"{ "listen_addr": "0.0.0.0:9000", "read_timeout_secs": 5, "limits": { "max_headers": 8 } }"#,
        )
        .unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.read_timeout(), Duration::from_secs(5));
        assert_eq!(config.limits.max_headers, 8);
        assert_eq!(config.limits.max_line_len, 8 * 1024);
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(matches!(
            Config::from_json_str("{ not json"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn missing_file() {
        let err = Config::from_file("/nonexistent/rttp.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
