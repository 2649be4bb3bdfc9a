//! RetainedTopicCleaner - temporary watch on legacy retained stream topics.
//!
//! On connect the supervisor subscribes to `<inst>/status/+/{stdout,stderr,output}`
//! so the broker replays any retained values, which the router then
//! self-heals. After `window` the subscriptions are dropped again.
//!
//! Design:
//! - The window runs on its own task; the returned handle is aborted when a
//!   reconnect arms a fresh window or the runtime stops.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::ports::BusClient;

pub struct RetainedTopicCleaner {
    bus: Arc<dyn BusClient>,
    filters: Vec<String>,
    window: Duration,
}

impl RetainedTopicCleaner {
    pub fn new(bus: Arc<dyn BusClient>, filters: Vec<String>, window: Duration) -> Self {
        Self {
            bus,
            filters,
            window,
        }
    }

    pub fn filters(&self) -> &[String] {
        &self.filters
    }

    /// Subscribe now, unsubscribe after the window.
    pub async fn arm(&self) -> JoinHandle<()> {
        for filter in &self.filters {
            info!(filter, "mqtt subscribe");
            if let Err(e) = self.bus.subscribe(filter).await {
                error!(filter, error = %e, "mqtt subscribe failed");
            }
        }

        let bus = Arc::clone(&self.bus);
        let filters = self.filters.clone();
        let window = self.window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            info!("mqtt unsubscribe {}", filters.join(" and "));
            for filter in &filters {
                if let Err(e) = bus.unsubscribe(filter).await {
                    error!(filter, error = %e, "mqtt unsubscribe failed");
                }
            }
        })
    }
}
