use serde::{Deserialize, Serialize};

/// Appliance-wide system statistics.
///
/// There is exactly one of these per appliance; each new sample replaces the previous.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStats {
    /// CPU usage (percent).
    pub cpu: i64,

    /// System uptime in seconds.
    pub uptime_seconds: i64,

    /// Memory usage in megabytes.
    pub mem_mb: i64,
}

/// Statistics for a single network interface, keyed by [`InterfaceStats::name`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceStats {
    /// Interface name (e.g., "eth0", "switch0.10").
    pub name: String,

    /// Administrative/link state.
    pub up: bool,

    /// Physical layer state.
    pub l1_up: bool,

    /// Hardware address.
    pub mac: String,

    /// Configured addresses in CIDR notation.
    #[serde(default)]
    pub addresses: Vec<String>,

    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
    pub rx_dropped: u64,
    pub tx_dropped: u64,
    pub rx_bytes_per_sec: u64,
    pub tx_bytes_per_sec: u64,
    pub multicast: u64,
}

impl InterfaceStats {
    /// Create an empty record for the named interface.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// A typed telemetry event decoded from the appliance stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// A new system stats sample.
    SystemStats(SystemStats),

    /// A new sample for one interface.
    InterfaceStats(InterfaceStats),
}

impl TelemetryEvent {
    /// Short name of the topic this event came from, for logging.
    pub fn topic(&self) -> &'static str {
        match self {
            TelemetryEvent::SystemStats(_) => "system-stats",
            TelemetryEvent::InterfaceStats(_) => "interfaces",
        }
    }
}

impl From<SystemStats> for TelemetryEvent {
    fn from(stats: SystemStats) -> Self {
        TelemetryEvent::SystemStats(stats)
    }
}

impl From<InterfaceStats> for TelemetryEvent {
    fn from(stats: InterfaceStats) -> Self {
        TelemetryEvent::InterfaceStats(stats)
    }
}
