//! StatusPublisher - lifecycle events onto status topics.
//!
//! | field                      | payload                  | retained        |
//! |----------------------------|--------------------------|-----------------|
//! | `pid`                      | pid, or empty when idle  | yes             |
//! | `exit`                     | exit code or signal name | yes             |
//! | `error`                    | error text, or empty     | yes             |
//! | `stdout`/`stderr`/`output` | captured bytes           | per handler mode|
//!
//! Publish failures are logged and swallowed: a broken bus must not stall
//! supervision. The transport adapter is responsible for reconnecting.

use std::sync::Arc;

use tracing::{error, info};

use super::aggregator::Delivery;
use crate::domain::topic::{CONNECTED_PAYLOAD, DISCONNECTED_PAYLOAD};
use crate::domain::{ExitReport, ProcessName, StatusField, Topics};
use crate::ports::{BusClient, ConnectionState};

#[derive(Clone)]
pub struct StatusPublisher {
    topics: Topics,
    bus: Arc<dyn BusClient>,
    connection: ConnectionState,
}

impl StatusPublisher {
    pub fn new(topics: Topics, bus: Arc<dyn BusClient>) -> Self {
        Self {
            topics,
            bus,
            connection: ConnectionState::new(),
        }
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub fn bus(&self) -> &Arc<dyn BusClient> {
        &self.bus
    }

    pub fn connection(&self) -> &ConnectionState {
        &self.connection
    }

    async fn send(&self, topic: &str, payload: &[u8], retain: bool) {
        if let Err(e) = self.bus.publish(topic, payload, retain).await {
            error!(topic, error = %e, "mqtt publish failed");
        }
    }

    async fn status(
        &self,
        process: &ProcessName,
        field: StatusField,
        payload: &[u8],
        retain: bool,
    ) {
        let topic = self.topics.status(process.as_str(), field);
        self.send(&topic, payload, retain).await;
    }

    /// `None` clears the pid (process went idle).
    pub async fn pid(&self, process: &ProcessName, pid: Option<u32>) {
        let payload = pid.map(|p| p.to_string()).unwrap_or_default();
        self.status(process, StatusField::Pid, payload.as_bytes(), true)
            .await;
    }

    pub async fn exit(&self, process: &ProcessName, report: &ExitReport) {
        self.status(
            process,
            StatusField::Exit,
            report.status_value().as_bytes(),
            true,
        )
        .await;
    }

    pub async fn error(&self, process: &ProcessName, message: &str) {
        self.status(process, StatusField::Error, message.as_bytes(), true)
            .await;
    }

    pub async fn clear_error(&self, process: &ProcessName) {
        self.error(process, "").await;
    }

    pub async fn output(&self, process: &ProcessName, delivery: &Delivery) {
        self.status(
            process,
            StatusField::Stream(delivery.stream),
            &delivery.payload,
            delivery.retain,
        )
        .await;
    }

    /// Publishing an empty retained message erases the broker's stored value.
    pub async fn clear_retained(&self, topic: &str) {
        self.send(topic, b"", true).await;
    }

    /// Session (re)established. Logs only on an actual transition, but
    /// re-announces on every call since the broker may have lost the value.
    pub async fn on_connected(&self) {
        if self.connection.mark_connected() {
            info!(topic = %self.topics.connected(), "mqtt connected");
        }
        self.send(&self.topics.connected(), CONNECTED_PAYLOAD, true)
            .await;
    }

    pub fn on_closed(&self, reason: &str) {
        if self.connection.mark_closed() {
            info!(reason, "mqtt closed");
        }
    }

    /// Clean shutdown: the will only fires on ungraceful disconnects.
    pub async fn announce_offline(&self) {
        self.send(&self.topics.connected(), DISCONNECTED_PAYLOAD, true)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StreamDescriptor;
    use crate::impls::RecordingBus;

    fn publisher() -> (StatusPublisher, RecordingBus) {
        let bus = RecordingBus::new();
        let publisher = StatusPublisher::new(Topics::new("pc"), Arc::new(bus.clone()));
        (publisher, bus)
    }

    #[tokio::test]
    async fn pid_and_exit_are_retained() {
        let (publisher, bus) = publisher();
        let name = ProcessName::new("job");

        publisher.pid(&name, Some(42)).await;
        publisher.pid(&name, None).await;
        publisher.exit(&name, &ExitReport::signal("SIGTERM")).await;

        let pids = bus.published_to("pc/status/job/pid");
        assert_eq!(pids.len(), 2);
        assert_eq!(pids[0].payload_str(), "42");
        assert_eq!(pids[1].payload_str(), "");
        assert!(pids.iter().all(|p| p.retain));

        let exit = bus.last_to("pc/status/job/exit").unwrap();
        assert_eq!(exit.payload_str(), "SIGTERM");
        assert!(exit.retain);
    }

    #[tokio::test]
    async fn output_follows_delivery_retain_flag() {
        let (publisher, bus) = publisher();
        let name = ProcessName::new("job");
        publisher
            .output(
                &name,
                &Delivery {
                    stream: StreamDescriptor::Stderr,
                    payload: b"oops".to_vec(),
                    retain: false,
                },
            )
            .await;

        let p = bus.last_to("pc/status/job/stderr").unwrap();
        assert_eq!(p.payload, b"oops".to_vec());
        assert!(!p.retain);
    }

    #[tokio::test]
    async fn connected_is_announced_on_every_connect() {
        let (publisher, bus) = publisher();
        publisher.on_connected().await;
        publisher.on_closed("io");
        publisher.on_closed("io");
        assert!(!publisher.connection().is_connected());
        publisher.on_connected().await;
        publisher.announce_offline().await;

        let values: Vec<_> = bus
            .published_to("pc/connected")
            .iter()
            .map(|p| p.payload_str())
            .collect();
        assert_eq!(values, vec!["1", "1", "0"]);
    }

    #[tokio::test]
    async fn publish_failures_do_not_propagate() {
        let (publisher, bus) = publisher();
        bus.fail_publishes(true);
        publisher.error(&ProcessName::new("job"), "boom").await;
        assert!(bus.published().is_empty());
    }
}
