//! Latest-value store for appliance telemetry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;
use tracing::trace;

use edgemax_common::{InterfaceStats, SystemStats, TelemetryEvent};

/// Point-in-time copy of the aggregated telemetry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatorSnapshot {
    /// Latest system stats, absent until the first update.
    pub system: Option<SystemStats>,
    /// Latest stats per interface name.
    pub interfaces: HashMap<String, InterfaceStats>,
}

impl AggregatorSnapshot {
    /// Interfaces sorted by name.
    pub fn sorted_interfaces(&self) -> Vec<&InterfaceStats> {
        let mut interfaces: Vec<_> = self.interfaces.values().collect();
        interfaces.sort_by(|a, b| a.name.cmp(&b.name));
        interfaces
    }
}

/// Aggregator statistics.
#[derive(Debug, Clone, Default)]
pub struct AggregatorStats {
    /// Total events applied.
    pub events_applied: u64,
    /// Sessions that reached the receiving state.
    pub sessions_started: u64,
    /// Sessions that ended with an error, including failed logins.
    pub session_failures: u64,
    /// Whether a session is currently receiving.
    pub connected: bool,
    /// When the last event was applied.
    pub last_update: Option<SystemTime>,
}

/// Thread-safe telemetry aggregator.
///
/// Writers take the exclusive lock for a single map update; readers take the
/// shared lock for the duration of a copy.
#[derive(Default)]
pub struct StatsAggregator {
    state: RwLock<AggregatorSnapshot>,
    stats: RwLock<AggregatorStats>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event, replacing the previous value for its key.
    pub fn apply(&self, event: TelemetryEvent) {
        {
            let mut state = self.state.write();
            match event {
                TelemetryEvent::SystemStats(system) => {
                    trace!(cpu = system.cpu, mem_mb = system.mem_mb, "System stats updated");
                    state.system = Some(system);
                }
                TelemetryEvent::InterfaceStats(iface) => {
                    trace!(interface = %iface.name, "Interface stats updated");
                    state.interfaces.insert(iface.name.clone(), iface);
                }
            }
        }

        let mut stats = self.stats.write();
        stats.events_applied += 1;
        stats.last_update = Some(SystemTime::now());
    }

    /// Copy of the current telemetry.
    pub fn snapshot(&self) -> AggregatorSnapshot {
        self.state.read().clone()
    }

    /// Record that a session started receiving.
    pub fn session_started(&self) {
        let mut stats = self.stats.write();
        stats.sessions_started += 1;
        stats.connected = true;
    }

    /// Record that the current session ended.
    pub fn session_ended(&self, failed: bool) {
        let mut stats = self.stats.write();
        stats.connected = false;
        if failed {
            stats.session_failures += 1;
        }
    }

    /// Number of interfaces seen so far.
    pub fn interface_count(&self) -> usize {
        self.state.read().interfaces.len()
    }

    /// Get aggregator statistics.
    pub fn stats(&self) -> AggregatorStats {
        self.stats.read().clone()
    }
}

/// Create a shareable aggregator handle.
pub type SharedAggregator = Arc<StatsAggregator>;
