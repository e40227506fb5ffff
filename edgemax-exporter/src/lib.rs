//! Prometheus exporter for EdgeMAX appliances.
//!
//! Keeps a streaming session to the appliance alive, folds every event into an
//! in-memory aggregator, and serves the latest values over HTTP.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │   Supervisor    │────>│   Aggregator    │────>│   HTTP Server   │
//! │ (login, stream) │     │ (latest values) │     │   (/metrics)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```bash
//! edgemax-exporter --host https://192.168.1.1 --user ubnt --password ubnt
//! edgemax-exporter --config config.json5
//! ```
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod collector;
pub mod config;
pub mod exposition;
pub mod http;
pub mod supervisor;

pub use collector::{AggregatorSnapshot, AggregatorStats, SharedAggregator, StatsAggregator};
pub use config::{ConfigError, ExporterConfig, PrometheusConfig};
pub use exposition::Exposition;
pub use http::HttpServer;
pub use supervisor::ReconnectSupervisor;
