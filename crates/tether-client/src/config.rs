//! Connection configuration.
//!
//! Configuration can be built in code, loaded from a TOML file, or take its
//! URL from the `TETHER_URL` environment variable. Session parameters are
//! appended to the connect URL as a query string, the way the handshake
//! step hands back a URL that still needs per-session parameters.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the file failed.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The file was not valid TOML for this config.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Connection descriptor plus engine knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketConfig {
    /// WebSocket URL to connect to.
    #[serde(default = "default_url")]
    pub url: String,

    /// Session parameters appended to the connect URL as a query string.
    #[serde(default)]
    pub params: Vec<(String, String)>,

    /// Optional reply timeout in milliseconds. When set, a request whose
    /// reply never arrives is dropped from the correlation table after this
    /// long and reported as a handling error. When unset, unanswered
    /// requests live until teardown.
    #[serde(default)]
    pub reply_timeout_ms: Option<u64>,
}

fn default_url() -> String {
    std::env::var("TETHER_URL").unwrap_or_else(|_| "ws://127.0.0.1:8080/socket".to_string())
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            params: Vec::new(),
            reply_timeout_ms: None,
        }
    }
}

impl SocketConfig {
    /// A config pointing at `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Append a session parameter.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// Set the reply timeout.
    #[must_use]
    pub fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub(crate) fn reply_timeout_duration(&self) -> Option<Duration> {
        self.reply_timeout_ms.map(Duration::from_millis)
    }

    /// The final URL handed to the transport.
    #[must_use]
    pub fn connect_url(&self) -> String {
        if self.params.is_empty() {
            return self.url.clone();
        }
        let mut url = self.url.clone();
        for (i, (name, value)) in self.params.iter().enumerate() {
            let separator = if i == 0 && !url.contains('?') { '?' } else { '&' };
            url.push(separator);
            url.push_str(name);
            url.push('=');
            url.push_str(value);
        }
        url
    }
}
