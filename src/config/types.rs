//! Configuration types
//!
//! The bridge configuration is read once at startup and shared read-only
//! behind an `Arc` afterwards.

use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::Identity;
use crate::error::Result;

/// Default reconnect interval between session attempts
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(3);

/// Main bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Gateway host
    #[serde(default = "default_host", alias = "mirai_host")]
    pub host: String,

    /// Gateway port
    #[serde(default = "default_port", alias = "mirai_port")]
    pub port: u16,

    /// Shared secret sent as `verifyKey` during the handshake
    #[serde(skip_serializing, default = "empty_secret")]
    pub verify_key: SecretString,

    /// Identities to bring up, one session each
    #[serde(default, alias = "mirai_qq")]
    pub identities: Vec<Identity>,

    /// Per-call response timeout
    #[serde(default = "default_api_timeout", with = "humantime_serde")]
    pub api_timeout: Duration,

    /// Fixed delay before reconnecting a dropped session
    #[serde(default = "default_reconnect_interval", with = "humantime_serde")]
    pub reconnect_interval: Duration,

    /// Upper bound on opening the websocket
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            host: default_host(),
            port: default_port(),
            verify_key: empty_secret(),
            identities: Vec::new(),
            api_timeout: default_api_timeout(),
            reconnect_interval: default_reconnect_interval(),
            connect_timeout: default_connect_timeout(),
            log: LogConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Websocket endpoint carrying both events and calls
    pub fn endpoint_url(&self) -> Result<Url> {
        Ok(Url::parse(&format!("ws://{}:{}/all", self.host, self.port))?)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level filter
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn empty_secret() -> SecretString {
    SecretString::from(String::new())
}

fn default_api_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_reconnect_interval() -> Duration {
    DEFAULT_RECONNECT_INTERVAL
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
