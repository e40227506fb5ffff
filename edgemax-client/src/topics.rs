//! Topic demultiplexing.
//!
//! Each frame carries a JSON object keyed by topic name. Known topics are
//! decoded into [`TelemetryEvent`]s; anything else is ignored so that new
//! topics pushed by newer firmware never break the stream.

use std::collections::HashMap;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::trace;

use edgemax_common::{InterfaceStats, SystemStats, TelemetryEvent};

use crate::error::{ClientError, Result};

/// Topic carrying appliance-wide CPU, memory and uptime.
pub const SYSTEM_STATS: &str = "system-stats";

/// Topic carrying per-interface state and counters.
pub const INTERFACES: &str = "interfaces";

/// Topics subscribed by default.
pub const DEFAULT_TOPICS: [&str; 2] = [INTERFACES, SYSTEM_STATS];

/// Decode a raw frame into telemetry events.
pub fn decode_frame(frame: &[u8]) -> Result<Vec<TelemetryEvent>> {
    let payload: Map<String, Value> = serde_json::from_slice(frame)
        .map_err(|e| ClientError::decode(format!("frame is not a topic object: {}", e)))?;
    decode_payload(payload)
}

/// Decode a topic-keyed payload into telemetry events.
///
/// Fails as a whole if any known topic is malformed.
pub fn decode_payload(payload: Map<String, Value>) -> Result<Vec<TelemetryEvent>> {
    let mut events = Vec::new();

    for (topic, body) in payload {
        match topic.as_str() {
            SYSTEM_STATS => events.push(TelemetryEvent::SystemStats(decode_system_stats(body)?)),
            INTERFACES => events.extend(
                decode_interfaces(body)?
                    .into_iter()
                    .map(TelemetryEvent::InterfaceStats),
            ),
            other => trace!(topic = other, "Ignoring unsupported topic"),
        }
    }

    Ok(events)
}

/// Decode the body of a `system-stats` topic.
pub fn decode_system_stats(body: Value) -> Result<SystemStats> {
    let fields: HashMap<String, Value> = serde_json::from_value(body)
        .map_err(|e| ClientError::decode(format!("{}: {}", SYSTEM_STATS, e)))?;

    Ok(SystemStats {
        cpu: numeric_field(&fields, "cpu", SYSTEM_STATS)?,
        uptime_seconds: numeric_field(&fields, "uptime", SYSTEM_STATS)?,
        mem_mb: numeric_field(&fields, "mem", SYSTEM_STATS)?,
    })
}

#[derive(Debug, Deserialize)]
struct RawInterface {
    #[serde(default)]
    up: Option<String>,
    #[serde(default)]
    l1up: Option<String>,
    #[serde(default)]
    mac: Option<String>,
    #[serde(default)]
    addresses: Option<Vec<String>>,
    #[serde(default)]
    stats: Option<HashMap<String, Value>>,
}

/// Decode the body of an `interfaces` topic, one record per interface.
///
/// Records are returned sorted by interface name.
pub fn decode_interfaces(body: Value) -> Result<Vec<InterfaceStats>> {
    let raw: HashMap<String, RawInterface> = serde_json::from_value(body)
        .map_err(|e| ClientError::decode(format!("{}: {}", INTERFACES, e)))?;

    let mut interfaces = raw
        .into_iter()
        .map(|(name, iface)| interface_from_raw(name, iface))
        .collect::<Result<Vec<_>>>()?;

    interfaces.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(interfaces)
}

fn interface_from_raw(name: String, raw: RawInterface) -> Result<InterfaceStats> {
    let stats = raw.stats.unwrap_or_default();
    let context = format!("{}[{}]", INTERFACES, name);
    let counter = |key: &str| numeric_field::<u64>(&stats, key, &context);

    Ok(InterfaceStats {
        up: raw.up.as_deref() == Some("true"),
        l1_up: raw.l1up.as_deref() == Some("true"),
        mac: raw.mac.unwrap_or_default(),
        addresses: raw.addresses.unwrap_or_default(),
        rx_packets: counter("rx_packets")?,
        tx_packets: counter("tx_packets")?,
        rx_bytes: counter("rx_bytes")?,
        tx_bytes: counter("tx_bytes")?,
        rx_errors: counter("rx_errors")?,
        tx_errors: counter("tx_errors")?,
        rx_dropped: counter("rx_dropped")?,
        tx_dropped: counter("tx_dropped")?,
        rx_bytes_per_sec: counter("rx_bps")?,
        tx_bytes_per_sec: counter("tx_bps")?,
        multicast: counter("multicast")?,
        name,
    })
}

/// Parse a field that the appliance sends as a decimal string.
///
/// Plain JSON numbers are accepted as well.
fn numeric_field<T: FromStr>(
    fields: &HashMap<String, Value>,
    key: &str,
    context: &str,
) -> Result<T> {
    let text = match fields.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => {
            return Err(ClientError::decode(format!(
                "{}: field '{}' is not numeric: {}",
                context, key, other
            )));
        }
        None => {
            return Err(ClientError::decode(format!(
                "{}: missing field '{}'",
                context, key
            )));
        }
    };

    text.parse().map_err(|_| {
        ClientError::decode(format!(
            "{}: field '{}' is not numeric: {:?}",
            context, key, text
        ))
    })
}
