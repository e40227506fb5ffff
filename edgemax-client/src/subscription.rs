//! Subscription session: one subscribed connection and its read loop.
//!
//! A session moves through `Created → Subscribed → Receiving → Stopped|Failed`.
//! [`SubscriptionSession::open`] sends the subscription request, and
//! [`SubscriptionSession::run`] spawns the read loop and hands back a
//! [`Subscription`] handle. The handle yields typed events in wire order and
//! then exactly one terminal error, or none when the session was stopped.

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use edgemax_common::TelemetryEvent;

use crate::error::{ClientError, Result};
use crate::frame::FrameCodec;
use crate::topics;
use crate::transport::Transport;

/// Default capacity of the event channel between the read loop and its consumer.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// A topic reference as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicRef {
    pub name: String,
}

/// The request sent once at the start of every session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    #[serde(rename = "SUBSCRIBE")]
    pub subscribe: Vec<TopicRef>,

    #[serde(rename = "UNSUBSCRIBE")]
    pub unsubscribe: Vec<TopicRef>,

    #[serde(rename = "SESSION_ID")]
    pub session_id: String,
}

impl SubscriptionRequest {
    /// Subscribe to `topics` using the given session credential.
    pub fn new<I, S>(session_id: impl Into<String>, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            subscribe: topics
                .into_iter()
                .map(|t| TopicRef { name: t.into() })
                .collect(),
            unsubscribe: Vec::new(),
            session_id: session_id.into(),
        }
    }

    /// Names of the subscribed topics.
    pub fn topic_names(&self) -> Vec<&str> {
        self.subscribe.iter().map(|t| t.name.as_str()).collect()
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Subscribed,
    Receiving,
    Stopped,
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Created => "created",
            SessionState::Subscribed => "subscribed",
            SessionState::Receiving => "receiving",
            SessionState::Stopped => "stopped",
            SessionState::Failed => "failed",
        }
    }

    /// Whether the session can no longer produce events.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Failed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An authenticated connection that has not started reading yet.
pub struct SubscriptionSession<T> {
    codec: FrameCodec<T>,
    state: watch::Sender<SessionState>,
}

impl<T: Transport> SubscriptionSession<T> {
    /// Wrap a codec in a fresh session.
    pub fn new(codec: FrameCodec<T>) -> Self {
        let (state, _) = watch::channel(SessionState::Created);
        Self { codec, state }
    }

    /// Create a session and send the subscription request.
    pub async fn open(codec: FrameCodec<T>, request: &SubscriptionRequest) -> Result<Self> {
        let mut session = Self::new(codec);
        session.subscribe(request).await?;
        Ok(session)
    }

    /// Send the subscription request.
    pub async fn subscribe(&mut self, request: &SubscriptionRequest) -> Result<()> {
        if *self.state.borrow() != SessionState::Created {
            return Err(ClientError::protocol(format!(
                "cannot subscribe in state {}",
                self.state()
            )));
        }

        if let Err(e) = self.codec.send_json(request).await {
            self.state.send_replace(SessionState::Failed);
            if let Err(close_err) = self.codec.transport_mut().close().await {
                debug!(error = %close_err, "Error closing transport");
            }
            return Err(ClientError::protocol(format!(
                "failed to send subscription request: {}",
                e
            )));
        }

        self.state.send_replace(SessionState::Subscribed);
        info!(topics = ?request.topic_names(), "Subscription request sent");
        Ok(())
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Spawn the read loop.
    ///
    /// `capacity` bounds the event channel; a slow consumer applies
    /// backpressure to the network reads.
    pub fn run(self, capacity: usize) -> Subscription {
        let (events_tx, events_rx) = mpsc::channel(capacity.max(1));
        let (error_tx, error_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let state = self.state.subscribe();

        let task = tokio::spawn(self.read_loop(events_tx, error_tx, stop_rx));

        Subscription {
            events: events_rx,
            errors: Some(error_rx),
            stop: stop_tx,
            state,
            task,
        }
    }

    async fn read_loop(
        mut self,
        events: mpsc::Sender<TelemetryEvent>,
        error_tx: oneshot::Sender<ClientError>,
        mut stop: watch::Receiver<bool>,
    ) {
        self.state.send_replace(SessionState::Receiving);
        debug!("Subscription receiving");

        let result = self.receive(&events, &mut stop).await;
        drop(events);

        if let Err(e) = self.codec.transport_mut().close().await {
            debug!(error = %e, "Error closing transport");
        }

        match result {
            Ok(()) => {
                self.state.send_replace(SessionState::Stopped);
                info!("Subscription stopped");
            }
            Err(e) => {
                self.state.send_replace(SessionState::Failed);
                warn!(kind = %e.kind(), error = %e, "Subscription failed");
                let _ = error_tx.send(e);
            }
        }
    }

    async fn receive(
        &mut self,
        events: &mpsc::Sender<TelemetryEvent>,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        loop {
            let frame = tokio::select! {
                biased;
                _ = stop_requested(stop) => return Ok(()),
                frame = self.codec.decode_next() => frame?,
            };

            let batch = topics::decode_frame(&frame)?;
            trace!(bytes = frame.len(), events = batch.len(), "Frame dispatched");

            for event in batch {
                tokio::select! {
                    biased;
                    _ = stop_requested(stop) => return Ok(()),
                    sent = events.send(event) => {
                        if sent.is_err() {
                            debug!("Event consumer went away");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

/// Resolves once a stop was requested or the handle was dropped.
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

/// Handle to a running session.
///
/// Dropping the handle stops the read loop.
pub struct Subscription {
    events: mpsc::Receiver<TelemetryEvent>,
    errors: Option<oneshot::Receiver<ClientError>>,
    stop: watch::Sender<bool>,
    state: watch::Receiver<SessionState>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Next event, or `None` once the session has ended.
    pub async fn next_event(&mut self) -> Option<TelemetryEvent> {
        self.events.recv().await
    }

    /// Ask the read loop to exit at its next check point.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Wait until the session reaches `state` or a terminal state.
    pub async fn wait_for_state(&mut self, state: SessionState) -> SessionState {
        let reached = self
            .state
            .wait_for(|s| *s == state || s.is_terminal())
            .await
            .map(|current| *current);
        reached.unwrap_or_else(|_| *self.state.borrow())
    }

    /// The terminal error of the session, or `None` after a clean stop.
    ///
    /// Waits for the read loop to exit, so drain the events or call
    /// [`Subscription::stop`] first. Only the first call can return an error.
    pub async fn terminal_error(&mut self) -> Option<ClientError> {
        let errors = self.errors.take()?;
        errors.await.ok()
    }

    /// Consume the handle and turn the terminal error into a `Result`.
    ///
    /// Returns once the read loop task has exited and the transport is closed.
    pub async fn finish(mut self) -> Result<()> {
        let error = self.terminal_error().await;
        if let Err(e) = self.task.await {
            warn!(error = %e, "Read loop task failed");
        }
        match error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
