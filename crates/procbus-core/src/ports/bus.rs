//! BusClient port - the publish/subscribe transport.
//!
//! The transport itself (connect, QoS, reconnect, retained storage) is the
//! adapter's concern. The supervisor only needs three requests plus a stream
//! of [`BusEvent`]s delivered into its event loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::domain::BusError;

/// A message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    /// Set when the broker delivered a stored retained value.
    pub retain: bool,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            retain: false,
        }
    }

    pub fn retained(mut self) -> Self {
        self.retain = true;
        self
    }
}

/// What the transport adapter feeds into the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// Session (re)established; subscriptions must be (re)issued.
    Connected,
    Disconnected { reason: String },
    Message(InboundMessage),
}

#[async_trait]
pub trait BusClient: Send + Sync {
    async fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> Result<(), BusError>;

    async fn subscribe(&self, filter: &str) -> Result<(), BusError>;

    async fn unsubscribe(&self, filter: &str) -> Result<(), BusError>;
}

/// Whether the bus session is currently up.
///
/// Transitions report whether they changed anything, so a burst of close
/// notifications yields a single "closed" log line.
#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    connected: Arc<AtomicBool>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Returns `true` if the state was previously closed.
    pub fn mark_connected(&self) -> bool {
        !self.connected.swap(true, Ordering::AcqRel)
    }

    /// Returns `true` if the state was previously connected.
    pub fn mark_closed(&self) -> bool {
        self.connected.swap(false, Ordering::AcqRel)
    }
}
