//! WebSocket transport to the appliance statistics endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async_tls_with_config};
use tracing::{debug, info, trace};
use url::Url;

use crate::config::ApplianceConfig;
use crate::error::{ClientError, Result};
use crate::tls;
use crate::transport::{Connector, Transport, TransportMessage};

/// Dials `wss://<host>/ws/stats` with the appliance's origin.
pub struct WebSocketConnector {
    url: Url,
    origin: String,
    tls: Option<Arc<rustls::ClientConfig>>,
}

impl WebSocketConnector {
    /// Create a connector from the appliance configuration.
    pub fn new(config: &ApplianceConfig) -> Result<Self> {
        Ok(Self {
            url: config.stats_url()?,
            origin: config.origin()?,
            tls: tls::websocket_config(&config.tls)?,
        })
    }

    /// Target WebSocket URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Origin header sent on the upgrade request.
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn connect(&self) -> Result<WebSocketTransport> {
        let mut request = self.url.as_str().into_client_request()?;
        let origin = HeaderValue::from_str(&self.origin)
            .map_err(|e| ClientError::Config(format!("invalid origin '{}': {}", self.origin, e)))?;
        request.headers_mut().insert("Origin", origin);

        let connector = self
            .tls
            .clone()
            .map(tokio_tungstenite::Connector::Rustls);

        debug!(url = %self.url, "Connecting to statistics stream");
        let (stream, response) =
            connect_async_tls_with_config(request, None, false, connector).await?;
        info!(url = %self.url, status = %response.status(), "Statistics stream connected");

        Ok(WebSocketTransport { stream })
    }
}

/// [`Transport`] over a live WebSocket.
///
/// Control frames are handled here and never surface to the codec.
pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: TransportMessage) -> Result<()> {
        let message = match message {
            TransportMessage::Text(data) => Message::Text(
                String::from_utf8(data.to_vec())
                    .map_err(|_| ClientError::protocol("text message is not valid UTF-8"))?,
            ),
            TransportMessage::Binary(data) => Message::Binary(data.to_vec()),
        };
        self.stream.send(message).await?;
        Ok(())
    }

    async fn next_message(&mut self) -> Result<TransportMessage> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(TransportMessage::Text(Bytes::from(text)));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(TransportMessage::Binary(Bytes::from(data)));
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| format!("{} {}", u16::from(f.code), f.reason))
                        .unwrap_or_else(|| "no close frame".to_string());
                    return Err(ClientError::transport(format!(
                        "connection closed by appliance: {}",
                        reason
                    )));
                }
                Some(Ok(other)) => trace!(?other, "Skipping control frame"),
                Some(Err(e)) => return Err(e.into()),
                None => return Err(ClientError::transport("connection closed")),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        };
        match self.stream.close(Some(frame)).await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
