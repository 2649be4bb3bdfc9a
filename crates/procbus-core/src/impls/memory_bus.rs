//! RecordingBus - in-memory bus for development and tests.
//!
//! Nothing is delivered anywhere; every request is recorded so callers can
//! assert on what would have gone over the wire.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::domain::BusError;
use crate::ports::BusClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

impl Publication {
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

#[derive(Debug, Default)]
struct Recorded {
    published: Vec<Publication>,
    subscribed: Vec<String>,
    unsubscribed: Vec<String>,
    fail_publish: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingBus {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        // A poisoned lock only means another test thread panicked mid-record.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn published(&self) -> Vec<Publication> {
        self.lock().published.clone()
    }

    pub fn published_to(&self, topic: &str) -> Vec<Publication> {
        self.lock()
            .published
            .iter()
            .filter(|p| p.topic == topic)
            .cloned()
            .collect()
    }

    pub fn last_to(&self, topic: &str) -> Option<Publication> {
        self.published_to(topic).pop()
    }

    /// Drain what was published so far.
    pub fn take(&self) -> Vec<Publication> {
        std::mem::take(&mut self.lock().published)
    }

    pub fn subscribed(&self) -> Vec<String> {
        self.lock().subscribed.clone()
    }

    pub fn unsubscribed(&self) -> Vec<String> {
        self.lock().unsubscribed.clone()
    }

    /// Make every following publish fail with a transport error.
    pub fn fail_publishes(&self, fail: bool) {
        self.lock().fail_publish = fail;
    }
}

#[async_trait]
impl BusClient for RecordingBus {
    async fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> Result<(), BusError> {
        let mut rec = self.lock();
        if rec.fail_publish {
            return Err(BusError::Transport("publish refused".to_string()));
        }
        rec.published.push(Publication {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            retain,
        });
        Ok(())
    }

    async fn subscribe(&self, filter: &str) -> Result<(), BusError> {
        self.lock().subscribed.push(filter.to_string());
        Ok(())
    }

    async fn unsubscribe(&self, filter: &str) -> Result<(), BusError> {
        self.lock().unsubscribed.push(filter.to_string());
        Ok(())
    }
}
