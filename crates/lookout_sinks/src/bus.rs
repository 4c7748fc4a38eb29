//! MQTT publish sink.

use crate::{Publisher, SinkError, SinkResult};
use anyhow::Context;
use async_trait::async_trait;
use rumqttc::{AsyncClient, QoS};
use std::time::Duration;
use tracing::debug;

/// Bound on handing a publish to the client; delivery itself happens on
/// the shared connection event loop.
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Publishes emitted images to the outbound topic.
///
/// Shares the bus connection with the subscriber: the client is a cheap
/// clone, and the subscriber's event loop drives delivery.
pub struct MqttPublisher {
    client: AsyncClient,
    topic: String,
}

impl MqttPublisher {
    pub fn new(client: AsyncClient, topic: impl Into<String>) -> Self {
        Self {
            client,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(&mut self, bytes: &[u8]) -> SinkResult<()> {
        let result = tokio::time::timeout(
            PUBLISH_TIMEOUT,
            self.client
                .publish(self.topic.clone(), QoS::AtLeastOnce, false, bytes.to_vec()),
        )
        .await
        .map_err(|_| {
            SinkError::message(format!(
                "publish to '{}' timed out after {PUBLISH_TIMEOUT:?}",
                self.topic
            ))
        })?;

        result
            .with_context(|| format!("publish to '{}' failed", self.topic))
            .map_err(SinkError::from)?;
        debug!("published {} bytes to '{}'", bytes.len(), self.topic);
        Ok(())
    }
}
