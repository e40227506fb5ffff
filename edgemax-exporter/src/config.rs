//! Configuration for the EdgeMAX exporter.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use edgemax_client::ApplianceConfig;
use edgemax_common::LoggingConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] edgemax_common::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Appliance connection settings.
    #[serde(default)]
    pub appliance: ApplianceConfig,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Prometheus HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// Address to listen on (default: "0.0.0.0:9745").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,

    /// Default labels to add to all metrics.
    #[serde(default)]
    pub default_labels: HashMap<String, String>,

    /// Metric name prefix (default: "edgemax").
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_listen() -> String {
    "0.0.0.0:9745".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

fn default_prefix() -> String {
    "edgemax".to_string()
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            default_labels: HashMap::new(),
            prefix: default_prefix(),
        }
    }
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    ///
    /// Only parses. Call [`ExporterConfig::validate`] once overrides are applied.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Ok(edgemax_common::load_config(path)?)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(edgemax_common::parse_config(content)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.appliance
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        // Validate listen address format
        if self
            .prometheus
            .listen
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.prometheus.listen
            )));
        }

        // Validate path starts with /
        if !self.prometheus.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        if self.prometheus.prefix.is_empty() {
            return Err(ConfigError::Validation(
                "Metric prefix must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgemax_common::LogFormat;
    use std::io::Write;

    #[test]
    fn test_parse_minimal_config() {
        let json = "{}";
        let config = ExporterConfig::parse(json).unwrap();

        assert_eq!(config.appliance.host, "https://192.168.0.1");
        assert_eq!(config.appliance.reconnect_delay_secs, 5);
        assert_eq!(config.prometheus.listen, "0.0.0.0:9745");
        assert_eq!(config.prometheus.path, "/metrics");
        assert_eq!(config.prometheus.prefix, "edgemax");
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            appliance: {
                host: "https://10.0.0.1",
                username: "ubnt",
                password: "ubnt",
                tls: { skip_verify: true },
                topics: ["system-stats"],
                reconnect_delay_secs: 10,
                keepalive_interval_secs: 60,
                max_frame_bytes: 1048576,
                event_buffer: 64,
            },
            prometheus: {
                listen: "127.0.0.1:9091",
                path: "/prometheus/metrics",
                prefix: "router",
                default_labels: {
                    site: "home",
                }
            },
            logging: {
                level: "debug",
                format: "json"
            }
        }"#;

        let config = ExporterConfig::parse(json).unwrap();

        assert_eq!(config.appliance.host, "https://10.0.0.1");
        assert_eq!(config.appliance.username, "ubnt");
        assert!(config.appliance.tls.skip_verify);
        assert_eq!(config.appliance.topics, vec!["system-stats"]);
        assert_eq!(config.appliance.reconnect_delay_secs, 10);
        assert_eq!(config.appliance.keepalive_interval_secs, 60);
        assert_eq!(config.appliance.max_frame_bytes, 1_048_576);
        assert_eq!(config.appliance.event_buffer, 64);
        assert_eq!(config.prometheus.listen, "127.0.0.1:9091");
        assert_eq!(config.prometheus.path, "/prometheus/metrics");
        assert_eq!(config.prometheus.prefix, "router");
        assert_eq!(
            config.prometheus.default_labels.get("site"),
            Some(&"home".to_string())
        );
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ appliance: {{ host: "http://router.lan" }} }}"#).unwrap();

        let config = ExporterConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.appliance.host, "http://router.lan");
    }

    #[test]
    fn test_load_missing_file() {
        let result = ExporterConfig::load_from_file("/nonexistent/edgemax.json5");
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
        assert!(err.to_string().contains("/nonexistent/edgemax.json5"));
    }

    #[test]
    fn test_parse_error() {
        let result = ExporterConfig::parse("{ prometheus: ");
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_load_defers_validation_to_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ prometheus: {{ listen: "" }} }}"#).unwrap();

        let mut config = ExporterConfig::load_from_file(file.path()).unwrap();
        assert!(config.validate().is_err());

        config.prometheus.listen = "0.0.0.0:9745".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_listen() {
        let json = r#"{
            prometheus: { listen: "not-an-address" }
        }"#;

        let result = ExporterConfig::parse(json).unwrap().validate();
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid listen address")
        );
    }

    #[test]
    fn test_validate_invalid_path() {
        let json = r#"{
            prometheus: { path: "no-leading-slash" }
        }"#;

        let result = ExporterConfig::parse(json).unwrap().validate();
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("must start with /")
        );
    }

    #[test]
    fn test_validate_invalid_host() {
        let json = r#"{
            appliance: { host: "ftp://10.0.0.1" }
        }"#;

        let result = ExporterConfig::parse(json).unwrap().validate();
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validate_zero_reconnect_delay() {
        let json = r#"{
            appliance: { reconnect_delay_secs: 0 }
        }"#;

        let result = ExporterConfig::parse(json).unwrap().validate();
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_empty_topics() {
        let json = r#"{
            appliance: { topics: [] }
        }"#;

        let result = ExporterConfig::parse(json).unwrap().validate();
        assert!(result.is_err());
    }
}
