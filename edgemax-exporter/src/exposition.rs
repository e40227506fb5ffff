//! Prometheus text exposition of the aggregated telemetry.

use std::collections::HashMap;
use std::fmt::Write;

use edgemax_common::InterfaceStats;

use crate::collector::{AggregatorSnapshot, AggregatorStats};
use crate::config::PrometheusConfig;

/// Label carrying the configured appliance host on every series.
pub const HOST_LABEL: &str = "edgemax_host";

/// Prometheus metric type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrometheusType {
    Counter,
    Gauge,
}

impl PrometheusType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrometheusType::Counter => "counter",
            PrometheusType::Gauge => "gauge",
        }
    }
}

struct InterfaceMetric {
    suffix: &'static str,
    help: &'static str,
    metric_type: PrometheusType,
    value: fn(&InterfaceStats) -> f64,
}

const INTERFACE_METRICS: &[InterfaceMetric] = &[
    InterfaceMetric {
        suffix: "interface_up",
        help: "Interface is UP.",
        metric_type: PrometheusType::Gauge,
        value: |i| bool_value(i.up),
    },
    InterfaceMetric {
        suffix: "interface_l1_up",
        help: "Interface L1 is UP.",
        metric_type: PrometheusType::Gauge,
        value: |i| bool_value(i.l1_up),
    },
    InterfaceMetric {
        suffix: "interface_rx_packets_total",
        help: "Interface received packets.",
        metric_type: PrometheusType::Counter,
        value: |i| i.rx_packets as f64,
    },
    InterfaceMetric {
        suffix: "interface_tx_packets_total",
        help: "Interface transmitted packets.",
        metric_type: PrometheusType::Counter,
        value: |i| i.tx_packets as f64,
    },
    InterfaceMetric {
        suffix: "interface_rx_bytes_total",
        help: "Interface received bytes.",
        metric_type: PrometheusType::Counter,
        value: |i| i.rx_bytes as f64,
    },
    InterfaceMetric {
        suffix: "interface_tx_bytes_total",
        help: "Interface transmitted bytes.",
        metric_type: PrometheusType::Counter,
        value: |i| i.tx_bytes as f64,
    },
    InterfaceMetric {
        suffix: "interface_rx_errors_total",
        help: "Interface received packet errors.",
        metric_type: PrometheusType::Counter,
        value: |i| i.rx_errors as f64,
    },
    InterfaceMetric {
        suffix: "interface_tx_errors_total",
        help: "Interface transmitted packet errors.",
        metric_type: PrometheusType::Counter,
        value: |i| i.tx_errors as f64,
    },
    InterfaceMetric {
        suffix: "interface_rx_dropped_total",
        help: "Interface received packets dropped.",
        metric_type: PrometheusType::Counter,
        value: |i| i.rx_dropped as f64,
    },
    InterfaceMetric {
        suffix: "interface_tx_dropped_total",
        help: "Interface transmitted packets dropped.",
        metric_type: PrometheusType::Counter,
        value: |i| i.tx_dropped as f64,
    },
    InterfaceMetric {
        suffix: "interface_multicast_total",
        help: "Interface multicast packets.",
        metric_type: PrometheusType::Counter,
        value: |i| i.multicast as f64,
    },
    InterfaceMetric {
        suffix: "interface_rx_bytes_per_second",
        help: "Interface receive rate (bytes per second).",
        metric_type: PrometheusType::Gauge,
        value: |i| i.rx_bytes_per_sec as f64,
    },
    InterfaceMetric {
        suffix: "interface_tx_bytes_per_second",
        help: "Interface transmit rate (bytes per second).",
        metric_type: PrometheusType::Gauge,
        value: |i| i.tx_bytes_per_sec as f64,
    },
];

fn bool_value(flag: bool) -> f64 {
    if flag { 1.0 } else { 0.0 }
}

/// Renders snapshots in the Prometheus text format.
#[derive(Debug, Clone)]
pub struct Exposition {
    prefix: String,
    base_labels: Vec<(String, String)>,
}

impl Exposition {
    /// Create a renderer for one appliance.
    ///
    /// Default labels never override the host label.
    pub fn new(config: &PrometheusConfig, host: &str) -> Self {
        Self {
            prefix: sanitize_metric_name(&config.prefix),
            base_labels: base_labels(host, &config.default_labels),
        }
    }

    /// Render a snapshot and the exporter's own statistics.
    pub fn render(&self, snapshot: &AggregatorSnapshot, stats: &AggregatorStats) -> String {
        let mut out = String::with_capacity(4096);

        if let Some(system) = &snapshot.system {
            self.single(
                &mut out,
                "cpu_usage_percent",
                "System CPU usage (percent).",
                PrometheusType::Gauge,
                system.cpu as f64,
            );
            self.single(
                &mut out,
                "mem_usage_mb",
                "System memory usage (megabytes).",
                PrometheusType::Gauge,
                system.mem_mb as f64,
            );
            self.single(
                &mut out,
                "uptime_seconds_total",
                "System uptime (seconds).",
                PrometheusType::Counter,
                system.uptime_seconds as f64,
            );
        }

        let interfaces = snapshot.sorted_interfaces();
        if !interfaces.is_empty() {
            let name = self.name("interface_labels");
            self.header(&mut out, &name, "Interface labels.", PrometheusType::Gauge);
            for iface in &interfaces {
                let labels = self.labels(&[
                    ("interface", iface.name.as_str()),
                    ("mac", iface.mac.as_str()),
                ]);
                writeln!(out, "{}{} 1", name, labels).ok();
            }

            for metric in INTERFACE_METRICS {
                let name = self.name(metric.suffix);
                self.header(&mut out, &name, metric.help, metric.metric_type);
                for iface in &interfaces {
                    let labels = self.labels(&[("interface", iface.name.as_str())]);
                    writeln!(
                        out,
                        "{}{} {}",
                        name,
                        labels,
                        format_value((metric.value)(iface))
                    )
                    .ok();
                }
            }
        }

        self.single(
            &mut out,
            "exporter_events_total",
            "Telemetry events applied.",
            PrometheusType::Counter,
            stats.events_applied as f64,
        );
        self.single(
            &mut out,
            "exporter_sessions_total",
            "Streaming sessions started.",
            PrometheusType::Counter,
            stats.sessions_started as f64,
        );
        self.single(
            &mut out,
            "exporter_session_failures_total",
            "Streaming sessions that ended with an error.",
            PrometheusType::Counter,
            stats.session_failures as f64,
        );
        self.single(
            &mut out,
            "exporter_connected",
            "Whether a streaming session is currently active.",
            PrometheusType::Gauge,
            bool_value(stats.connected),
        );

        out
    }

    fn name(&self, suffix: &str) -> String {
        format!("{}_{}", self.prefix, suffix)
    }

    fn header(&self, out: &mut String, name: &str, help: &str, metric_type: PrometheusType) {
        writeln!(out, "# HELP {} {}", name, help).ok();
        writeln!(out, "# TYPE {} {}", name, metric_type.as_str()).ok();
    }

    fn single(
        &self,
        out: &mut String,
        suffix: &str,
        help: &str,
        metric_type: PrometheusType,
        value: f64,
    ) {
        let name = self.name(suffix);
        self.header(out, &name, help, metric_type);
        writeln!(out, "{}{} {}", name, self.labels(&[]), format_value(value)).ok();
    }

    fn labels(&self, extra: &[(&str, &str)]) -> String {
        let mut labels: Vec<(&str, &str)> = self
            .base_labels
            .iter()
            .filter(|(k, _)| !extra.iter().any(|(ek, _)| *ek == k.as_str()))
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        labels.extend_from_slice(extra);
        labels.sort_by(|a, b| a.0.cmp(b.0));
        format_labels(&labels)
    }
}

fn base_labels(host: &str, default_labels: &HashMap<String, String>) -> Vec<(String, String)> {
    let mut labels = vec![(HOST_LABEL.to_string(), host.to_string())];

    for (k, v) in default_labels {
        let key = sanitize_label_name(k);
        if !labels.iter().any(|(lk, _)| lk == &key) {
            labels.push((key, v.clone()));
        }
    }

    labels.sort_by(|a, b| a.0.cmp(&b.0));
    labels
}

/// Replace characters that are invalid in a label name.
pub fn sanitize_label_name(name: &str) -> String {
    let mut result: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    if result.starts_with(|c: char| c.is_ascii_digit()) {
        result.insert(0, '_');
    }
    result
}

/// Replace characters that are invalid in a metric name.
pub fn sanitize_metric_name(name: &str) -> String {
    let mut result: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == ':' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if result.starts_with(|c: char| c.is_ascii_digit()) {
        result.insert(0, '_');
    }
    result
}

/// Escape special characters in label values.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// Format a floating point value for Prometheus.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

fn format_labels(labels: &[(&str, &str)]) -> String {
    if labels.is_empty() {
        return String::new();
    }

    let parts: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();

    format!("{{{}}}", parts.join(","))
}
