//! NATS transport for the event queue.

use async_nats::connection::State;
use async_trait::async_trait;
use bytes::Bytes;
use krakens_core::config::NatsConfig;
use krakens_core::{EventQueue, KrakensError, KrakensResult, MessageStream};
use tokio_stream::StreamExt;
use tracing::{debug, info};

/// Core NATS client. Subscriptions opened through this handle join the
/// configured queue group, so each message is persisted by one process.
pub struct NatsQueue {
    client: async_nats::Client,
    queue_group: String,
}

impl NatsQueue {
    pub async fn connect(config: &NatsConfig) -> anyhow::Result<Self> {
        let urls = if config.urls.is_empty() {
            "nats://localhost:4222".to_string()
        } else {
            config.urls.join(",")
        };

        info!(url = %urls, "Connecting to NATS");

        let client = async_nats::ConnectOptions::new()
            .max_reconnects(Some(config.max_reconnects))
            .connect(urls.as_str())
            .await?;

        info!("NATS connection established");

        Ok(Self {
            client,
            queue_group: config.queue_group.clone(),
        })
    }
}

#[async_trait]
impl EventQueue for NatsQueue {
    async fn publish(&self, topic: &str, payload: Bytes) -> KrakensResult<()> {
        // The client buffers while reconnecting; a publish that cannot reach
        // the server must fail the caller instead of silently queueing.
        if self.client.connection_state() != State::Connected {
            return Err(KrakensError::Unavailable("NATS connection is down".into()));
        }
        self.client
            .publish(topic.to_string(), payload)
            .await
            .map_err(|e| KrakensError::Unavailable(e.to_string()))?;
        debug!(subject = topic, "Published to NATS");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> KrakensResult<MessageStream> {
        let subscriber = self
            .client
            .queue_subscribe(topic.to_string(), self.queue_group.clone())
            .await
            .map_err(|e| KrakensError::Unavailable(e.to_string()))?;

        info!(subject = topic, group = %self.queue_group, "Subscribed to NATS");
        Ok(Box::pin(subscriber.map(|msg| msg.payload)))
    }
}
