//! EdgeMAX Streaming Client
//!
//! Connects to the statistics stream of an EdgeMAX appliance and turns it into
//! typed [`TelemetryEvent`](edgemax_common::TelemetryEvent)s.
//!
//! The pieces, bottom-up:
//!
//! - [`transport`] - Message transport abstraction plus an in-memory pair
//! - [`websocket`] - The WebSocket transport to `/ws/stats`
//! - [`frame`] - `<length>\n<payload>` framing over any transport
//! - [`topics`] - Demultiplexing topic payloads into events
//! - [`subscription`] - Subscribe handshake and the background read loop
//! - [`auth`] - Form login and session keepalive
//! - [`tls`] - Certificate handling shared by HTTP and WebSocket

pub mod auth;
pub mod config;
pub mod error;
pub mod frame;
pub mod subscription;
pub mod tls;
pub mod topics;
pub mod transport;
pub mod websocket;

pub use auth::{ApplianceAuthenticator, AuthSession, Authenticator};
pub use config::{ApplianceConfig, TlsConfig};
pub use error::{ClientError, ErrorKind, Result};
pub use frame::FrameCodec;
pub use subscription::{SessionState, Subscription, SubscriptionRequest, SubscriptionSession};
pub use transport::{ChannelPeer, ChannelTransport, Connector, Transport, TransportMessage};
pub use websocket::{WebSocketConnector, WebSocketTransport};
