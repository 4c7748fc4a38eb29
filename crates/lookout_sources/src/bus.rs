//! MQTT bus subscription source.
//!
//! The subscription task owns the connection event loop; its only
//! business logic is pushing inbound payloads onto the request queue.
//! Outbound publishes from the emit sink share the same connection and
//! are delivered by this loop as a side effect of polling.

use anyhow::Result;
use lookout_pipeline::{ClassificationRequest, RequestSender};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Bus connection settings, from the `mqtt` config section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Inbound topic feeding the request queue.
    pub subscribe_topic: String,
    /// Outbound topic for emitted images.
    pub publish_topic: String,
}

fn default_port() -> u16 {
    1883
}

/// Open the bus connection. The client handle is cloneable and shared
/// with the publish sink; the event loop goes to the subscriber.
pub fn connect(config: &MqttConfig) -> (AsyncClient, EventLoop) {
    let client_id = format!(
        "lookout-{}",
        uuid::Uuid::new_v4()
            .to_string()
            .split('-')
            .next()
            .unwrap_or("0")
    );
    let mut options = MqttOptions::new(client_id, config.host.as_str(), config.port);
    options.set_keep_alive(KEEP_ALIVE);
    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        options.set_credentials(username.as_str(), password.as_str());
    }
    AsyncClient::new(options, 64)
}

pub struct BusSubscriber {
    client: AsyncClient,
    eventloop: EventLoop,
    topic: String,
    queue: RequestSender,
    shutdown_rx: mpsc::Receiver<()>,
}

impl BusSubscriber {
    /// Build the subscriber. Returns the shutdown sender alongside.
    pub fn new(
        client: AsyncClient,
        eventloop: EventLoop,
        topic: impl Into<String>,
        queue: RequestSender,
    ) -> (Self, mpsc::Sender<()>) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        (
            Self {
                client,
                eventloop,
                topic: topic.into(),
                queue,
                shutdown_rx,
            },
            shutdown_tx,
        )
    }

    /// Poll the connection until shutdown or until the queue consumer
    /// goes away. Subscribes on every (re)connect acknowledgement, so a
    /// dropped broker connection resumes cleanly.
    pub async fn run(mut self) -> Result<()> {
        info!("bus subscriber started on '{}'", self.topic);

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.recv() => {
                    info!("shutdown signal received, stopping bus subscriber");
                    break;
                }

                event = self.eventloop.poll() => {
                    match event {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            info!("connected to bus, subscribing to '{}'", self.topic);
                            if let Err(e) = self
                                .client
                                .subscribe(self.topic.clone(), QoS::AtLeastOnce)
                                .await
                            {
                                warn!("subscribe to '{}' failed: {e}", self.topic);
                            }
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            if publish.payload.is_empty() {
                                warn!(
                                    "dropping empty message from '{}'",
                                    publish.topic
                                );
                                continue;
                            }
                            debug!(
                                "queueing {} bytes from '{}'",
                                publish.payload.len(),
                                publish.topic
                            );
                            let request =
                                ClassificationRequest::from_bytes(publish.payload.to_vec());
                            if !self.queue.push(request) {
                                info!("request queue closed, stopping bus subscriber");
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!("bus connection error: {e}, retrying in {RECONNECT_DELAY:?}");
                            tokio::time::sleep(RECONNECT_DELAY).await;
                        }
                    }
                }
            }
        }

        info!("bus subscriber stopped");
        Ok(())
    }
}
