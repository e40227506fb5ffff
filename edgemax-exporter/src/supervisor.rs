//! Login, subscribe, drain, repeat.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use edgemax_client::{
    ApplianceConfig, Authenticator, ClientError, Connector, FrameCodec, SubscriptionRequest,
    SubscriptionSession,
};

use crate::collector::SharedAggregator;

/// How a single session attempt ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionOutcome {
    /// The stream ended cleanly.
    Ended,
    /// Process shutdown was requested.
    Shutdown,
}

/// Keeps one streaming session alive against the appliance.
///
/// Every failure is logged and followed by a fixed delay; the loop only exits
/// on shutdown.
pub struct ReconnectSupervisor<A, C> {
    authenticator: A,
    connector: C,
    aggregator: SharedAggregator,
    topics: Vec<String>,
    reconnect_delay: Duration,
    max_frame_bytes: usize,
    event_buffer: usize,
}

impl<A: Authenticator, C: Connector> ReconnectSupervisor<A, C> {
    pub fn new(
        authenticator: A,
        connector: C,
        aggregator: SharedAggregator,
        config: &ApplianceConfig,
    ) -> Self {
        Self {
            authenticator,
            connector,
            aggregator,
            topics: config.topics.clone(),
            reconnect_delay: config.reconnect_delay(),
            max_frame_bytes: config.max_frame_bytes,
            event_buffer: config.event_buffer,
        }
    }

    /// Override the delay between attempts.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Run until the shutdown signal is received.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            topics = ?self.topics,
            delay_ms = self.reconnect_delay.as_millis() as u64,
            "Starting reconnect supervisor"
        );

        let mut attempt: u64 = 0;
        loop {
            if *shutdown.borrow() {
                break;
            }
            attempt += 1;

            match self.run_session(&mut shutdown).await {
                Ok(SessionOutcome::Shutdown) => break,
                Ok(SessionOutcome::Ended) => {
                    self.aggregator.session_ended(false);
                    info!(attempt, "Session ended");
                }
                Err(e) => {
                    self.aggregator.session_ended(true);
                    error!(attempt, kind = %e.kind(), error = %e, "Session failed");
                }
            }

            info!(
                delay_ms = self.reconnect_delay.as_millis() as u64,
                "Reconnecting after delay"
            );
            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
        }

        info!("Reconnect supervisor stopped");
    }

    async fn run_session(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<SessionOutcome, ClientError> {
        let auth = tokio::select! {
            auth = self.authenticator.authenticate() => auth?,
            _ = wait_for_shutdown(shutdown) => return Ok(SessionOutcome::Shutdown),
        };
        debug!(user = auth.username(), "Authenticated");

        let transport = tokio::select! {
            transport = self.connector.connect() => transport?,
            _ = wait_for_shutdown(shutdown) => return Ok(SessionOutcome::Shutdown),
        };

        let codec = FrameCodec::new(transport).with_max_frame_bytes(self.max_frame_bytes);
        let request = SubscriptionRequest::new(auth.session_id(), self.topics.iter().cloned());
        let session = SubscriptionSession::open(codec, &request).await?;

        let mut subscription = session.run(self.event_buffer);
        self.aggregator.session_started();

        loop {
            tokio::select! {
                event = subscription.next_event() => match event {
                    Some(event) => self.aggregator.apply(event),
                    None => break,
                },
                _ = wait_for_shutdown(shutdown) => {
                    subscription.stop();
                    if let Err(e) = subscription.finish().await {
                        debug!(error = %e, "Session error during shutdown");
                    }
                    self.aggregator.session_ended(false);
                    return Ok(SessionOutcome::Shutdown);
                }
            }
        }

        subscription.finish().await?;
        Ok(SessionOutcome::Ended)
    }
}

/// Resolves once shutdown is signalled or the sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
