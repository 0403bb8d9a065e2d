//! Configuration management for whep-player

use crate::whep::retry::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_MS};
use crate::whep::{RetryPolicy, StreamTarget};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Stream endpoint configuration
    #[serde(default)]
    pub target: TargetConfig,

    /// Reconnect policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// WebRTC configuration
    #[serde(default)]
    pub webrtc: WebRtcConfig,

    /// Stream flow probing
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Base URL of the WHEP server
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Stream path under the base URL
    #[serde(default)]
    pub stream_path: String,

    /// Basic auth username
    pub username: Option<String>,

    /// Basic auth password
    pub password: Option<String>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            stream_path: String::new(),
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum reconnect attempts per play request
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay in milliseconds before a scheduled reconnect fires
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WebRtcConfig {
    /// STUN/TURN servers used for ICE
    #[serde(default)]
    pub ice_servers: Vec<IceServerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceServerConfig {
    /// Server URLs, e.g. "stun:stun.l.google.com:19302"
    pub urls: Vec<String>,

    /// TURN username
    pub username: Option<String>,

    /// TURN credential
    pub credential: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Silence on a track longer than this counts as a stall
    #[serde(default = "default_stall_timeout_ms")]
    pub stall_timeout_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            stall_timeout_ms: default_stall_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        Url::parse(&self.target.base_url)
            .map_err(|e| format!("Invalid target.base_url: {}", e))?;

        if self.retry.retry_delay_ms == 0 {
            return Err("Retry delay must be non-zero".into());
        }

        if self.probe.stall_timeout_ms == 0 {
            return Err("Probe stall timeout must be non-zero".into());
        }

        for server in &self.webrtc.ice_servers {
            if server.urls.is_empty() {
                return Err("ICE server entry has no urls".into());
            }
        }

        Ok(())
    }

    pub fn target(&self) -> StreamTarget {
        StreamTarget {
            base_url: self.target.base_url.clone(),
            stream_path: self.target.stream_path.clone(),
            username: self.target.username.clone(),
            password: self.target.password.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry.max_retries,
            delay: Duration::from_millis(self.retry.retry_delay_ms),
        }
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.probe.stall_timeout_ms)
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8889".to_string()
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

fn default_stall_timeout_ms() -> u64 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy_constants() {
        let cfg = Config::default();
        assert_eq!(cfg.retry.max_retries, 4);
        assert_eq!(cfg.retry.retry_delay_ms, 4000);
        assert_eq!(cfg.target.base_url, "http://127.0.0.1:8889");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn parses_partial_toml() {
        let cfg: Config = toml::from_str(
            r#"
            [target]
            base_url = "https://media.example.com"
            stream_path = "cam1"
            username = "viewer"

            [retry]
            max_retries = 2

            [[webrtc.ice_servers]]
            urls = ["stun:stun.example.com:3478"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.target.base_url, "https://media.example.com");
        assert_eq!(cfg.target.stream_path, "cam1");
        assert_eq!(cfg.target.username.as_deref(), Some("viewer"));
        assert_eq!(cfg.retry.max_retries, 2);
        assert_eq!(cfg.retry.retry_delay_ms, 4000);
        assert_eq!(cfg.webrtc.ice_servers.len(), 1);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_base_url() {
        let mut cfg = Config::default();
        cfg.target.base_url = "not a url".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_delay() {
        let mut cfg = Config::default();
        cfg.retry.retry_delay_ms = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_ice_server() {
        let mut cfg = Config::default();
        cfg.webrtc.ice_servers.push(IceServerConfig {
            urls: Vec::new(),
            username: None,
            credential: None,
        });
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn retry_policy_reflects_config() {
        let mut cfg = Config::default();
        cfg.retry.max_retries = 7;
        cfg.retry.retry_delay_ms = 250;
        let policy = cfg.retry_policy();
        assert_eq!(policy.max_retries, 7);
        assert_eq!(policy.delay, Duration::from_millis(250));
    }
}
