//! Appliance connection configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ClientError, Result};
use crate::frame::DEFAULT_MAX_FRAME_BYTES;
use crate::subscription::DEFAULT_EVENT_BUFFER;
use crate::topics::DEFAULT_TOPICS;

/// Path of the statistics WebSocket on the appliance.
pub const STATS_PATH: &str = "/ws/stats";

/// Path of the session heartbeat endpoint.
pub const HEARTBEAT_PATH: &str = "/api/edge/heartbeat.json";

/// Connection settings for a single appliance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplianceConfig {
    /// Base URL of the appliance web UI (e.g., "https://192.168.0.1")
    #[serde(default = "default_host")]
    pub host: String,

    /// Login username
    #[serde(default)]
    pub username: String,

    /// Login password
    #[serde(default)]
    pub password: String,

    /// TLS configuration
    #[serde(default)]
    pub tls: TlsConfig,

    /// Topics to subscribe to
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,

    /// Fixed delay between reconnect attempts
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,

    /// Interval between session heartbeats
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_secs: u64,

    /// Largest accepted frame
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    /// Capacity of the event channel between the reader and the aggregator
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

/// TLS configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Skip certificate verification (not recommended for production)
    #[serde(default)]
    pub skip_verify: bool,

    /// Path to a PEM-encoded CA certificate used to verify the appliance
    #[serde(default)]
    pub ca_cert: Option<PathBuf>,
}

fn default_host() -> String {
    "https://192.168.0.1".to_string()
}

fn default_topics() -> Vec<String> {
    DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect()
}

fn default_reconnect_delay() -> u64 {
    5
}

fn default_keepalive_interval() -> u64 {
    300 // 5 minutes
}

fn default_max_frame_bytes() -> usize {
    DEFAULT_MAX_FRAME_BYTES
}

fn default_event_buffer() -> usize {
    DEFAULT_EVENT_BUFFER
}

impl Default for ApplianceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            username: String::new(),
            password: String::new(),
            tls: TlsConfig::default(),
            topics: default_topics(),
            reconnect_delay_secs: default_reconnect_delay(),
            keepalive_interval_secs: default_keepalive_interval(),
            max_frame_bytes: default_max_frame_bytes(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl ApplianceConfig {
    /// Parsed base URL of the appliance.
    pub fn base_url(&self) -> Result<Url> {
        let url = Url::parse(&self.host)?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ClientError::Config(format!(
                    "unsupported scheme '{}' in host '{}'",
                    other, self.host
                )));
            }
        }
        if url.host_str().is_none() {
            return Err(ClientError::Config(format!(
                "host '{}' has no hostname",
                self.host
            )));
        }
        Ok(url)
    }

    /// WebSocket URL of the statistics stream.
    ///
    /// `https` hosts map to `wss`, `http` hosts to `ws`.
    pub fn stats_url(&self) -> Result<Url> {
        let mut url = self.base_url()?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::Config(format!("cannot derive {} URL", scheme)))?;
        url.set_path(STATS_PATH);
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }

    /// Origin header value expected by the appliance.
    pub fn origin(&self) -> Result<String> {
        Ok(self.base_url()?.origin().ascii_serialization())
    }

    /// URL of the heartbeat endpoint.
    pub fn heartbeat_url(&self) -> Result<Url> {
        Ok(self.base_url()?.join(HEARTBEAT_PATH)?)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        self.base_url()?;

        if self.topics.is_empty() {
            return Err(ClientError::Config(
                "at least one topic is required".to_string(),
            ));
        }

        if self.reconnect_delay_secs == 0 {
            return Err(ClientError::Config(
                "reconnect_delay_secs must be > 0".to_string(),
            ));
        }

        if self.keepalive_interval_secs == 0 {
            return Err(ClientError::Config(
                "keepalive_interval_secs must be > 0".to_string(),
            ));
        }

        if self.max_frame_bytes == 0 {
            return Err(ClientError::Config(
                "max_frame_bytes must be > 0".to_string(),
            ));
        }

        if self.event_buffer == 0 {
            return Err(ClientError::Config(
                "event_buffer must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(host: &str) -> ApplianceConfig {
        ApplianceConfig {
            host: host.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = ApplianceConfig::default();

        assert_eq!(config.host, "https://192.168.0.1");
        assert_eq!(config.topics, vec!["interfaces", "system-stats"]);
        assert_eq!(config.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(config.keepalive_interval(), Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_stats_url() {
        assert_eq!(
            config("https://192.168.0.1").stats_url().unwrap().as_str(),
            "wss://192.168.0.1/ws/stats"
        );
        assert_eq!(
            config("http://router.lan:8080/some/path?x=1")
                .stats_url()
                .unwrap()
                .as_str(),
            "ws://router.lan:8080/ws/stats"
        );
    }

    #[test]
    fn test_origin() {
        assert_eq!(
            config("https://192.168.0.1/").origin().unwrap(),
            "https://192.168.0.1"
        );
        assert_eq!(
            config("http://router.lan:8080").origin().unwrap(),
            "http://router.lan:8080"
        );
    }

    #[test]
    fn test_heartbeat_url() {
        assert_eq!(
            config("https://192.168.0.1").heartbeat_url().unwrap().as_str(),
            "https://192.168.0.1/api/edge/heartbeat.json"
        );
    }

    #[test]
    fn test_validate_rejects_bad_host() {
        assert!(config("ftp://192.168.0.1").validate().is_err());
        assert!(config("not a url").validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut c = ApplianceConfig::default();
        c.reconnect_delay_secs = 0;
        assert!(c.validate().is_err());

        let mut c = ApplianceConfig::default();
        c.topics.clear();
        assert!(c.validate().is_err());

        let mut c = ApplianceConfig::default();
        c.max_frame_bytes = 0;
        assert!(c.validate().is_err());
    }
}
