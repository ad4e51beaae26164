//! Event bus - pub/sub fan-out for orchestrator events
//!
//! Built on tokio broadcast channels. Workers and agent transports emit
//! events; consumers (dashboard bridges, log sinks) subscribe. Slow
//! subscribers lose old events rather than applying backpressure.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::types::SwarmEvent;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Central event bus for orchestrator activity streaming
///
/// Emission is fire-and-forget: with no subscribers the event is dropped,
/// and a full channel drops its oldest events first.
pub struct EventBus {
    tx: broadcast::Sender<SwarmEvent>,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Create a new event bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: SwarmEvent) {
        debug!(event_type = event.event_type(), "EventBus::emit");
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<SwarmEvent> {
        self.tx.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Create an event bus wrapped in an Arc for shared ownership
pub fn create_event_bus() -> Arc<EventBus> {
    Arc::new(EventBus::with_default_capacity())
}
