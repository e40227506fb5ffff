//! End-to-end stream tests over the in-memory transport.

use edgemax_client::frame::encode;
use edgemax_client::transport::channel_pair;
use edgemax_client::{
    ClientError, ErrorKind, FrameCodec, SessionState, SubscriptionRequest, SubscriptionSession,
    TransportMessage,
};
use edgemax_common::TelemetryEvent;

fn interfaces_frame() -> String {
    serde_json::json!({
        "interfaces": {
            "eth0": {
                "up": "true",
                "l1up": "true",
                "mac": "aa:bb:cc:dd:ee:ff",
                "addresses": ["10.0.0.1/24"],
                "stats": {
                    "rx_packets": "100", "tx_packets": "200",
                    "rx_bytes": "1000", "tx_bytes": "2000",
                    "rx_errors": "0", "tx_errors": "0",
                    "rx_dropped": "1", "tx_dropped": "2",
                    "rx_bps": "50", "tx_bps": "60",
                    "multicast": "3"
                }
            }
        },
        "system-stats": {"cpu": "7", "uptime": "3600", "mem": "42"}
    })
    .to_string()
}

#[tokio::test]
async fn test_full_stream() {
    let (transport, mut peer) = channel_pair();
    let request = SubscriptionRequest::new("cafebabe", ["interfaces", "system-stats"]);
    let session = SubscriptionSession::open(FrameCodec::new(transport), &request)
        .await
        .unwrap();

    // The appliance sees exactly one framed subscription request.
    let TransportMessage::Text(sent) = peer.recv().await.unwrap() else {
        panic!("expected a text message");
    };
    let text = std::str::from_utf8(&sent).unwrap();
    let (len, body) = text.split_once('\n').unwrap();
    assert_eq!(len.parse::<usize>().unwrap(), body.len());
    let body: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(body["SESSION_ID"], "cafebabe");

    let mut subscription = session.run(16);

    // One frame delivered in awkward pieces.
    let frame = encode(interfaces_frame().as_bytes());
    for chunk in frame.chunks(13) {
        peer.send_text(chunk.to_vec());
    }

    let mut events = Vec::new();
    for _ in 0..2 {
        events.push(subscription.next_event().await.unwrap());
    }

    let topics: Vec<&str> = events.iter().map(|e| e.topic()).collect();
    assert!(topics.contains(&"interfaces"));
    assert!(topics.contains(&"system-stats"));

    let iface = events
        .iter()
        .find_map(|e| match e {
            TelemetryEvent::InterfaceStats(i) => Some(i),
            _ => None,
        })
        .unwrap();
    assert_eq!(iface.name, "eth0");
    assert_eq!(iface.rx_bytes, 1000);
    assert_eq!(iface.addresses, vec!["10.0.0.1/24"]);

    // Appliance drops the connection.
    peer.fail(ClientError::transport("connection reset"));

    assert!(subscription.next_event().await.is_none());
    let err = subscription.terminal_error().await.unwrap();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(subscription.state(), SessionState::Failed);
    assert!(subscription.terminal_error().await.is_none());
}

#[tokio::test]
async fn test_stop_mid_stream() {
    let (transport, peer) = channel_pair();
    let request = SubscriptionRequest::new("cafebabe", ["system-stats"]);
    let session = SubscriptionSession::open(FrameCodec::new(transport), &request)
        .await
        .unwrap();
    let mut subscription = session.run(1);

    let frame = encode(br#"{"system-stats":{"cpu":"1","uptime":"2","mem":"3"}}"#);
    peer.send_text(frame.clone());
    peer.send_text(frame);

    assert!(subscription.next_event().await.is_some());

    subscription.stop();
    assert_eq!(
        subscription.wait_for_state(SessionState::Stopped).await,
        SessionState::Stopped
    );
    assert!(subscription.finish().await.is_ok());
    assert!(peer.is_closed());
}
