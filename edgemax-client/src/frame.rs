//! Length-prefixed framing over a message transport.
//!
//! Every frame is written as `<decimal length>\n<payload>`. Frame boundaries are
//! independent of transport message boundaries: a header may be split across
//! messages, a body may span many messages, and a single message may carry
//! several complete frames. [`FrameCodec`] keeps whatever it has not consumed
//! yet in an internal buffer so the next [`FrameCodec::decode_next`] call picks
//! up where the previous one stopped.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::error::{ClientError, Result};
use crate::transport::{Transport, TransportMessage};

/// Largest frame accepted by default (16 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Longest length header accepted, excluding the newline.
///
/// Twenty digits is enough for any `u64`.
pub const MAX_HEADER_LEN: usize = 20;

/// Encode a payload as a single frame.
pub fn encode(payload: &[u8]) -> Bytes {
    let header = format!("{}\n", payload.len());
    let mut buf = BytesMut::with_capacity(header.len() + payload.len());
    buf.put_slice(header.as_bytes());
    buf.put_slice(payload);
    buf.freeze()
}

/// Frame encoder/decoder bound to one transport.
pub struct FrameCodec<T> {
    transport: T,
    buffer: BytesMut,
    pending: Option<usize>,
    max_frame_bytes: usize,
}

impl<T: Transport> FrameCodec<T> {
    /// Create a codec with the default frame size limit.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            buffer: BytesMut::new(),
            pending: None,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }

    /// Override the maximum accepted frame size.
    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    /// Send `payload` as one frame in a single text message.
    pub async fn send_frame(&mut self, payload: &[u8]) -> Result<()> {
        self.transport
            .send(TransportMessage::Text(encode(payload)))
            .await
    }

    /// Serialize `value` to JSON and send it as one frame.
    pub async fn send_json<S: Serialize>(&mut self, value: &S) -> Result<()> {
        let body = serde_json::to_vec(value)
            .map_err(|e| ClientError::protocol(format!("failed to encode frame: {}", e)))?;
        self.send_frame(&body).await
    }

    /// Return the next complete frame, reading from the transport as needed.
    pub async fn decode_next(&mut self) -> Result<Bytes> {
        loop {
            if let Some(frame) = self.try_take_frame()? {
                return Ok(frame);
            }
            self.fill_buffer().await?;
        }
    }

    /// Decode the next frame as JSON.
    pub async fn read_json<D: DeserializeOwned>(&mut self) -> Result<D> {
        let frame = self.decode_next().await?;
        Ok(serde_json::from_slice(&frame)?)
    }

    /// Take a complete frame out of the buffer without touching the transport.
    pub fn try_take_frame(&mut self) -> Result<Option<Bytes>> {
        loop {
            if let Some(len) = self.pending {
                if self.buffer.len() < len {
                    return Ok(None);
                }
                self.pending = None;
                let frame = self.buffer.split_to(len).freeze();
                trace!(len, remaining = self.buffer.len(), "Decoded frame");
                return Ok(Some(frame));
            }

            match self.take_header()? {
                Some(len) => self.pending = Some(len),
                None => return Ok(None),
            }
        }
    }

    /// Number of bytes received but not yet returned as frames.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Declared length of the frame currently being assembled, if any.
    pub fn pending_len(&self) -> Option<usize> {
        self.pending
    }

    /// Access the underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn take_header(&mut self) -> Result<Option<usize>> {
        let newline = self
            .buffer
            .iter()
            .take(MAX_HEADER_LEN + 1)
            .position(|&b| b == b'\n');

        let Some(pos) = newline else {
            if self.buffer.len() > MAX_HEADER_LEN {
                return Err(ClientError::protocol(format!(
                    "no length header terminator within {} bytes",
                    MAX_HEADER_LEN
                )));
            }
            return Ok(None);
        };

        let line = self.buffer.split_to(pos + 1);
        let len = parse_length(&line[..pos])?;

        if len > self.max_frame_bytes {
            return Err(ClientError::protocol(format!(
                "frame length {} exceeds limit of {} bytes",
                len, self.max_frame_bytes
            )));
        }

        Ok(Some(len))
    }

    async fn fill_buffer(&mut self) -> Result<()> {
        match self.transport.next_message().await? {
            TransportMessage::Text(data) => {
                trace!(
                    received = data.len(),
                    buffered = self.buffer.len(),
                    "Transport message"
                );
                self.buffer.extend_from_slice(&data);
                Ok(())
            }
            other => Err(ClientError::protocol(format!(
                "unexpected {} message on frame stream",
                other.kind()
            ))),
        }
    }
}

fn parse_length(digits: &[u8]) -> Result<usize> {
    let invalid = || {
        ClientError::protocol(format!(
            "invalid length header: {:?}",
            String::from_utf8_lossy(digits)
        ))
    };

    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }

    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ChannelPeer, ChannelTransport, channel_pair};

    fn new_codec() -> (FrameCodec<ChannelTransport>, ChannelPeer) {
        let (transport, peer) = channel_pair();
        (FrameCodec::new(transport), peer)
    }

    #[test]
    fn test_encode() {
        assert_eq!(&encode(b"hello")[..], b"5\nhello");
        assert_eq!(&encode(b"")[..], b"0\n");
    }

    #[tokio::test]
    async fn test_round_trip_arbitrary_bytes() {
        let payloads: Vec<Vec<u8>> = vec![
            vec![],
            b"{}".to_vec(),
            (0u8..=255).collect(),
            vec![b'\n'; 17],
            b"12\nnot-a-header".to_vec(),
        ];

        for payload in payloads {
            let (mut codec, peer) = new_codec();
            peer.send_text(encode(&payload));

            let frame = codec.decode_next().await.unwrap();
            assert_eq!(&frame[..], &payload[..]);
            assert_eq!(codec.buffered(), 0);
        }
    }

    #[tokio::test]
    async fn test_header_split_across_messages() {
        let (mut codec, peer) = new_codec();
        peer.send_text("5");
        peer.send_text("\n");
        peer.send_text("hello");

        let frame = codec.decode_next().await.unwrap();
        assert_eq!(&frame[..], b"hello");
    }

    #[tokio::test]
    async fn test_body_split_across_messages() {
        let (mut codec, peer) = new_codec();
        peer.send_text("11\nhel");
        peer.send_text("lo ");
        peer.send_text("world");

        let frame = codec.decode_next().await.unwrap();
        assert_eq!(&frame[..], b"hello world");
        assert_eq!(codec.pending_len(), None);
    }

    #[tokio::test]
    async fn test_multiple_frames_in_one_message() {
        let (mut codec, peer) = new_codec();
        peer.send_text("3\nabc4\ndefg");

        assert_eq!(&codec.decode_next().await.unwrap()[..], b"abc");
        assert_eq!(codec.buffered(), 6);
        assert_eq!(&codec.decode_next().await.unwrap()[..], b"defg");
        assert_eq!(codec.buffered(), 0);
    }

    #[tokio::test]
    async fn test_arbitrary_chunking() {
        let payloads: [&[u8]; 4] = [b"first", b"", b"{\"a\":\"b\"}", b"last frame"];
        let mut stream = Vec::new();
        for p in payloads {
            stream.extend_from_slice(&encode(p));
        }

        for chunk_size in 1..=7 {
            let (mut codec, peer) = new_codec();
            for chunk in stream.chunks(chunk_size) {
                peer.send_text(chunk.to_vec());
            }

            for expected in payloads {
                let frame = codec.decode_next().await.unwrap();
                assert_eq!(&frame[..], expected, "chunk size {}", chunk_size);
            }
        }
    }

    #[tokio::test]
    async fn test_binary_message_is_protocol_error() {
        let (mut codec, peer) = new_codec();
        peer.send_binary(b"5\nhello".to_vec());

        let err = codec.decode_next().await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_invalid_headers() {
        for header in ["abc\n", "-5\n", "+5\n", "\n", "5 \n"] {
            let (mut codec, peer) = new_codec();
            peer.send_text(header);

            let err = codec.decode_next().await.unwrap_err();
            assert!(
                matches!(err, ClientError::Protocol(_)),
                "header {:?} should be rejected",
                header
            );
        }
    }

    #[tokio::test]
    async fn test_oversize_frame_rejected() {
        let (transport, peer) = channel_pair();
        let mut codec = FrameCodec::new(transport).with_max_frame_bytes(8);
        peer.send_text("9\n");

        let err = codec.decode_next().await.unwrap_err();
        assert!(err.to_string().contains("exceeds limit"));
    }

    #[tokio::test]
    async fn test_unterminated_header_rejected() {
        let (mut codec, peer) = new_codec();
        peer.send_text("1".repeat(MAX_HEADER_LEN + 1));

        let err = codec.decode_next().await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_transport_failure_mid_frame() {
        let (mut codec, peer) = new_codec();
        peer.send_text("10\nabc");
        drop(peer);

        let err = codec.decode_next().await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
        assert_eq!(codec.pending_len(), Some(10));
    }

    #[tokio::test]
    async fn test_send_json() {
        let (mut codec, mut peer) = new_codec();
        codec
            .send_json(&serde_json::json!({"k": "v"}))
            .await
            .unwrap();

        let message = peer.recv().await.unwrap();
        assert_eq!(message, TransportMessage::text("9\n{\"k\":\"v\"}"));
    }

    #[tokio::test]
    async fn test_read_json() {
        let (mut codec, peer) = new_codec();
        peer.send_text(encode(br#"{"x":1}"#));

        let value: serde_json::Value = codec.read_json().await.unwrap();
        assert_eq!(value["x"], 1);
    }
}
