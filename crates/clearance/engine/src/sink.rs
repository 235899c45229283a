//! Event sinks
//!
//! The service hands every committed transition's events to an
//! [`EventSink`]. A failing sink is logged and otherwise ignored; it
//! never rolls back the transition.

use async_trait::async_trait;
use clearance_types::ClearanceEventEnvelope;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::broadcast;

/// Sink errors
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Sink unavailable: {0}")]
    Unavailable(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Trait for event sinks
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Announce one event
    async fn publish(&self, envelope: ClearanceEventEnvelope) -> Result<(), SinkError>;
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

#[async_trait]
impl EventSink for NoopSink {
    async fn publish(&self, _envelope: ClearanceEventEnvelope) -> Result<(), SinkError> {
        Ok(())
    }
}

/// In-memory sink for testing
#[derive(Default)]
pub struct RecordingSink {
    envelopes: RwLock<Vec<ClearanceEventEnvelope>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all envelopes
    pub fn envelopes(&self) -> Vec<ClearanceEventEnvelope> {
        self.envelopes.read().clone()
    }

    /// Event names in publication order
    pub fn names(&self) -> Vec<&'static str> {
        self.envelopes.read().iter().map(|e| e.event.name()).collect()
    }

    pub fn clear(&self) {
        self.envelopes.write().clear();
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn publish(&self, envelope: ClearanceEventEnvelope) -> Result<(), SinkError> {
        self.envelopes.write().push(envelope);
        Ok(())
    }
}

/// Fans events out to real-time subscribers
pub struct BroadcastSink {
    sender: broadcast::Sender<ClearanceEventEnvelope>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events (returns a receiver)
    pub fn subscribe(&self) -> broadcast::Receiver<ClearanceEventEnvelope> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl EventSink for BroadcastSink {
    async fn publish(&self, envelope: ClearanceEventEnvelope) -> Result<(), SinkError> {
        // No receivers is not a failure
        let _ = self.sender.send(envelope);
        Ok(())
    }
}
