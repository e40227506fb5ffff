//! Message-oriented transport abstraction.
//!
//! The frame codec only needs three operations from the underlying connection:
//! send a message, wait for the next message, and close. [`Transport`] captures
//! exactly that, so the codec and the subscription session can run over the
//! real WebSocket (see [`crate::websocket`]) or over the in-memory
//! [`ChannelTransport`] used in tests.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{ClientError, Result};

/// A single raw message exchanged over a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMessage {
    /// Text message; the only kind that may carry frame data.
    Text(Bytes),
    /// Binary message.
    Binary(Bytes),
}

impl TransportMessage {
    /// Build a text message from anything byte-like.
    pub fn text(data: impl Into<Bytes>) -> Self {
        Self::Text(data.into())
    }

    /// Build a binary message from anything byte-like.
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::Binary(data.into())
    }

    /// Message kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Binary(_) => "binary",
        }
    }
}

/// A duplex, message-oriented connection.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one message.
    async fn send(&mut self, message: TransportMessage) -> Result<()>;

    /// Wait for the next data message.
    ///
    /// Fails with [`ClientError::Transport`] once the connection is closed.
    async fn next_message(&mut self) -> Result<TransportMessage>;

    /// Close the connection.
    async fn close(&mut self) -> Result<()>;
}

/// Opens new transports to the appliance.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    /// Establish a fresh connection.
    async fn connect(&self) -> Result<Self::Transport>;
}

type Incoming = std::result::Result<TransportMessage, ClientError>;

/// In-memory [`Transport`] backed by unbounded channels.
///
/// Created in pairs with [`ChannelPeer`]; the peer plays the appliance side.
pub struct ChannelTransport {
    incoming: mpsc::UnboundedReceiver<Incoming>,
    outgoing: mpsc::UnboundedSender<TransportMessage>,
    closed: bool,
}

/// The remote end of a [`ChannelTransport`].
pub struct ChannelPeer {
    incoming: mpsc::UnboundedSender<Incoming>,
    outgoing: mpsc::UnboundedReceiver<TransportMessage>,
}

/// Create a connected transport/peer pair.
pub fn channel_pair() -> (ChannelTransport, ChannelPeer) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();

    (
        ChannelTransport {
            incoming: in_rx,
            outgoing: out_tx,
            closed: false,
        },
        ChannelPeer {
            incoming: in_tx,
            outgoing: out_rx,
        },
    )
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, message: TransportMessage) -> Result<()> {
        if self.closed {
            return Err(ClientError::transport("transport already closed"));
        }
        self.outgoing
            .send(message)
            .map_err(|_| ClientError::transport("peer hung up"))
    }

    async fn next_message(&mut self) -> Result<TransportMessage> {
        if self.closed {
            return Err(ClientError::transport("transport already closed"));
        }
        match self.incoming.recv().await {
            Some(message) => message,
            None => Err(ClientError::transport("connection closed")),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.incoming.close();
        Ok(())
    }
}

impl ChannelPeer {
    /// Deliver a text message to the transport.
    pub fn send_text(&self, data: impl Into<Bytes>) -> bool {
        self.incoming
            .send(Ok(TransportMessage::text(data)))
            .is_ok()
    }

    /// Deliver a binary message to the transport.
    pub fn send_binary(&self, data: impl Into<Bytes>) -> bool {
        self.incoming
            .send(Ok(TransportMessage::binary(data)))
            .is_ok()
    }

    /// Make the transport's next read fail with `error`.
    pub fn fail(&self, error: ClientError) -> bool {
        self.incoming.send(Err(error)).is_ok()
    }

    /// Wait for the next message sent by the transport.
    pub async fn recv(&mut self) -> Option<TransportMessage> {
        self.outgoing.recv().await
    }

    /// Whether the transport side has been closed or dropped.
    pub fn is_closed(&self) -> bool {
        self.incoming.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_round_trip() {
        let (mut transport, mut peer) = channel_pair();

        transport
            .send(TransportMessage::text("hello"))
            .await
            .unwrap();
        assert_eq!(peer.recv().await, Some(TransportMessage::text("hello")));

        assert!(peer.send_binary(vec![1u8, 2, 3]));
        let message = transport.next_message().await.unwrap();
        assert_eq!(message.kind(), "binary");
        assert_eq!(message, TransportMessage::binary(vec![1u8, 2, 3]));
    }

    #[tokio::test]
    async fn test_peer_drop_closes_transport() {
        let (mut transport, peer) = channel_pair();
        drop(peer);

        let err = transport.next_message().await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let (mut transport, peer) = channel_pair();
        peer.fail(ClientError::transport("reset by peer"));

        let err = transport.next_message().await.unwrap_err();
        assert!(err.to_string().contains("reset by peer"));
    }

    #[tokio::test]
    async fn test_close_is_visible_to_peer() {
        let (mut transport, peer) = channel_pair();
        transport.close().await.unwrap();

        assert!(peer.is_closed());
        assert!(transport.next_message().await.is_err());
        assert!(transport.send(TransportMessage::text("x")).await.is_err());
    }
}
