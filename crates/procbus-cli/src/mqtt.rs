//! MQTT adapter over `rumqttc`.
//!
//! - [`MqttBus`] implements `BusClient` (QoS 0, as requests into the client queue).
//! - [`drive`] polls the event loop and forwards connects, drops and
//!   publishes as `BusEvent`s. The event loop reconnects on the next poll.
//!
//! The will is `<instance>/connected` = `0`, retained.

use std::time::Duration;

use async_trait::async_trait;
use procbus_core::domain::{BusError, Topics};
use procbus_core::ports::{BusClient, BusEvent, InboundMessage};
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet,
    QoS,
};
use tokio::sync::mpsc;
use tracing::{debug, error};

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const REQUEST_CAPACITY: usize = 64;
/// MQTT's own limit; buffered output can be far larger than rumqttc's default.
const MAX_PACKET_SIZE: usize = 268_435_455;

#[derive(Clone)]
pub struct MqttBus {
    client: AsyncClient,
}

impl MqttBus {
    pub async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            error!(error = %e, "mqtt disconnect failed");
        }
    }
}

#[async_trait]
impl BusClient for MqttBus {
    /// Never waits for the broker: a full request queue (long disconnect)
    /// fails the publish instead of stalling the caller.
    async fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> Result<(), BusError> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, retain, payload.to_vec())
            .map_err(|e| BusError::Transport(e.to_string()))
    }

    async fn subscribe(&self, filter: &str) -> Result<(), BusError> {
        self.client
            .subscribe(filter, QoS::AtMostOnce)
            .await
            .map_err(|e| BusError::Transport(e.to_string()))
    }

    async fn unsubscribe(&self, filter: &str) -> Result<(), BusError> {
        self.client
            .unsubscribe(filter)
            .await
            .map_err(|e| BusError::Transport(e.to_string()))
    }
}

/// `client_id` is appended to the URL unless it already names one.
fn url_with_client_id(url: &str, client_id: &str) -> String {
    if url.contains("client_id=") {
        return url.to_string();
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}client_id={client_id}")
}

pub fn options(url: &str, client_id: &str, topics: &Topics) -> Result<MqttOptions, BusError> {
    let mut options = MqttOptions::parse_url(url_with_client_id(url, client_id))
        .map_err(|e| BusError::Rejected(format!("broker url {url}: {e}")))?;
    options
        .set_keep_alive(KEEP_ALIVE)
        .set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE)
        .set_last_will(LastWill::new(
            topics.connected(),
            "0",
            QoS::AtMostOnce,
            true,
        ));
    Ok(options)
}

pub fn connect(
    url: &str,
    client_id: &str,
    topics: &Topics,
) -> Result<(MqttBus, EventLoop), BusError> {
    let (client, eventloop) = AsyncClient::new(options(url, client_id, topics)?, REQUEST_CAPACITY);
    Ok((MqttBus { client }, eventloop))
}

async fn forward(events: &mpsc::Sender<BusEvent>, event: BusEvent) {
    // The supervisor may already be gone during shutdown.
    let _ = events.send(event).await;
}

/// Runs until our own disconnect went out, or the connection fails after
/// the supervisor stopped listening.
pub async fn drive(mut eventloop: EventLoop, events: mpsc::Sender<BusEvent>) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    forward(&events, BusEvent::Connected).await;
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = InboundMessage {
                    topic: publish.topic,
                    payload: publish.payload.to_vec(),
                    retain: publish.retain,
                };
                forward(&events, BusEvent::Message(message)).await;
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("mqtt disconnect sent");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                if events.is_closed() {
                    break;
                }
                error!(error = %e, "mqtt");
                forward(
                    &events,
                    BusEvent::Disconnected {
                        reason: e.to_string(),
                    },
                )
                .await;
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_is_appended_once() {
        assert_eq!(
            url_with_client_id("mqtt://127.0.0.1", "pc"),
            "mqtt://127.0.0.1?client_id=pc"
        );
        assert_eq!(
            url_with_client_id("mqtt://host:1883?keep_alive_secs=5", "pc"),
            "mqtt://host:1883?keep_alive_secs=5&client_id=pc"
        );
        assert_eq!(
            url_with_client_id("mqtt://host?client_id=other", "pc"),
            "mqtt://host?client_id=other"
        );
    }

    #[test]
    fn options_carry_instance_will() {
        let options = options("mqtt://127.0.0.1:1883", "pc", &Topics::new("pc")).unwrap();
        assert_eq!(options.client_id(), "pc");
        let will = options.last_will().unwrap();
        assert_eq!(will.topic, "pc/connected");
        assert!(will.retain);
    }

    #[test]
    fn bad_url_is_rejected() {
        assert!(options("not a url", "pc", &Topics::new("pc")).is_err());
    }
}
