//! Push-notification channel used to advertise download progress.
//!
//! The download core only depends on the [`PushChannel`] trait. The host
//! decides how events travel; [`BroadcastChannel`] is the in-process fan-out
//! the bundled server forwards to WebSocket clients.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::trace;

/// Default number of buffered events per subscriber before lagging.
pub const DEFAULT_PUSH_CAPACITY: usize = 256;

/// Failure to hand an event to the push transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The channel has been shut down.
    #[error("push channel closed")]
    Closed,

    /// The transport rejected or failed to deliver the event.
    #[error("push transport failed: {0}")]
    Send(String),
}

/// Publishes named events with a JSON payload.
///
/// Implementations must not block for long: the download loop awaits
/// `publish` between chunks.
#[async_trait]
pub trait PushChannel: Send + Sync {
    /// Publishes one event.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the event could not be handed off.
    async fn publish(
        &self,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), TransportError>;
}

/// One event as forwarded to WebSocket clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushMessage {
    #[serde(rename = "type")]
    pub event: String,
    pub data: serde_json::Value,
}

/// In-process broadcast fan-out backed by `tokio::sync::broadcast`.
#[derive(Debug, Clone)]
pub struct BroadcastChannel {
    sender: broadcast::Sender<PushMessage>,
}

impl Default for BroadcastChannel {
    fn default() -> Self {
        Self::new(DEFAULT_PUSH_CAPACITY)
    }
}

impl BroadcastChannel {
    /// Creates a channel buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribes to all events published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PushMessage> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl PushChannel for BroadcastChannel {
    async fn publish(
        &self,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), TransportError> {
        let message = PushMessage {
            event: event.to_string(),
            data: payload,
        };
        // No subscribers is not a failure; the event simply has no audience.
        match self.sender.send(message) {
            Ok(receivers) => trace!(event, receivers, "push event sent"),
            Err(_) => trace!(event, "push event dropped, no subscribers"),
        }
        Ok(())
    }
}
