//! Client configuration.
//!
//! Configuration is loaded once by the composition root and passed explicitly
//! into every constructor; nothing in the workspace reads ambient globals.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::RetryPolicy;

/// Default maximum number of sub-requests in one batch request.
pub const DEFAULT_BATCH_LIMIT: usize = 50;

/// Problems found while validating a [`ClientConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A field holds a value outside its permitted range.
    #[error("invalid configuration: {message}")]
    Invalid {
        /// Description of the problem.
        message: String,
    },
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// Settings shared by the dispatcher and the live-query client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the REST endpoint, including any mount path
    /// (e.g. `https://example.com/store`).
    pub server_url: Url,

    /// Socket URL for live queries. Derived from `server_url` (ws/wss) when absent.
    #[serde(default)]
    pub live_query_url: Option<Url>,

    /// Maximum sub-requests per batch request.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,

    /// Per-attempt HTTP deadline.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Retry ceiling and backoff for dispatched commands.
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Live-query connection settings.
    #[serde(default)]
    pub live: LiveQueryConfig,
}

fn default_batch_limit() -> usize {
    DEFAULT_BATCH_LIMIT
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl ClientConfig {
    /// A configuration with defaults for everything except the server URL.
    pub fn new(server_url: Url) -> Self {
        Self {
            server_url,
            live_query_url: None,
            batch_limit: DEFAULT_BATCH_LIMIT,
            request_timeout_ms: default_request_timeout_ms(),
            retry: RetryPolicy::default(),
            live: LiveQueryConfig::default(),
        }
    }

    /// Rejects configurations the client cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.server_url.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(format!(
                "server_url must be http or https, got {}",
                self.server_url.scheme()
            )));
        }
        if let Some(live) = &self.live_query_url {
            if !matches!(live.scheme(), "ws" | "wss") {
                return Err(ConfigError::invalid(format!(
                    "live_query_url must be ws or wss, got {}",
                    live.scheme()
                )));
            }
        }
        if self.batch_limit == 0 {
            return Err(ConfigError::invalid("batch_limit must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::invalid("retry.max_attempts must be at least 1"));
        }
        Ok(())
    }

    /// The socket URL, explicit or derived from `server_url`.
    pub fn live_query_url(&self) -> Result<Url, ConfigError> {
        if let Some(url) = &self.live_query_url {
            return Ok(url.clone());
        }
        let mut url = self.server_url.clone();
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|()| ConfigError::invalid("cannot derive live_query_url from server_url"))?;
        Ok(url)
    }

    /// Per-attempt HTTP deadline.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Mount path of the server URL without a trailing slash (`""` at the root).
    ///
    /// Sub-requests inside a batch are addressed by this prefix plus their path.
    pub fn mount_path(&self) -> &str {
        self.server_url.path().trim_end_matches('/')
    }
}

/// Live-query connection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveQueryConfig {
    /// Deadline for establishing the socket.
    pub connect_timeout_ms: u64,
    /// Interval between keep-alive pings while the socket is established.
    pub ping_interval_ms: u64,
    /// Deadline for a pong after a ping.
    pub ping_timeout_ms: u64,
    /// Reconnect with backoff after unexpected disconnects and failed opens.
    pub auto_reconnect: bool,
    /// Upper bound of the reconnect delay.
    pub max_reconnect_delay_ms: u64,
}

impl Default for LiveQueryConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            ping_interval_ms: 20_000,
            ping_timeout_ms: 10_000,
            auto_reconnect: true,
            max_reconnect_delay_ms: 30_000,
        }
    }
}

impl LiveQueryConfig {
    /// Socket connect deadline.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Keep-alive interval.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Pong deadline.
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    /// Reconnect delay ceiling.
    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> ClientConfig {
        ClientConfig::new(Url::parse(url).unwrap())
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let parsed: ClientConfig =
            serde_json::from_str(r#"{"server_url":"https://example.com/store"}"#).unwrap();
        assert_eq!(parsed.batch_limit, DEFAULT_BATCH_LIMIT);
        assert_eq!(parsed.retry, RetryPolicy::default());
        assert!(parsed.live.auto_reconnect);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn live_url_is_derived_from_server_url() {
        let cfg = config("https://example.com/store");
        assert_eq!(cfg.live_query_url().unwrap().as_str(), "wss://example.com/store");
        let plain = config("http://localhost:1337/");
        assert_eq!(plain.live_query_url().unwrap().scheme(), "ws");
    }

    #[test]
    fn mount_path_is_the_server_url_path() {
        let cfg = config("https://example.com/store/");
        assert_eq!(cfg.mount_path(), "/store");
        assert_eq!(config("https://example.com").mount_path(), "");
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cfg = config("https://example.com");
        cfg.batch_limit = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = config("ftp://example.com");
        cfg.batch_limit = 1;
        assert!(cfg.validate().is_err());
    }
}
