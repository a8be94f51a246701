//! RabbitMQ publisher for forwarded events.
//!
//! One connection and one channel are opened on the first publish and kept
//! for later ones. A channel that reports itself disconnected is replaced on
//! the next publish.

use std::sync::Arc;

use anyhow::{Context, Result};
use lapin::{
    options::{BasicPublishOptions, QueueDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::types::QueuedEvent;

/// AMQP delivery mode that asks the broker to persist the message.
const PERSISTENT: u8 = 2;

/// Publisher bound to a single durable queue. Clones share the connection.
#[derive(Clone)]
pub struct Publisher {
    inner: Arc<PublisherInner>,
}

struct PublisherInner {
    url: String,
    queue: String,
    connection: RwLock<Option<Connection>>,
    channel: RwLock<Option<Channel>>,
}

impl Publisher {
    pub fn new(url: String, queue: String) -> Self {
        Self {
            inner: Arc::new(PublisherInner {
                url,
                queue,
                connection: RwLock::new(None),
                channel: RwLock::new(None),
            }),
        }
    }

    pub fn queue(&self) -> &str {
        &self.inner.queue
    }

    /// The cached channel, if it is still usable.
    async fn live_channel(&self) -> Option<Channel> {
        let channel = self.inner.channel.read().await;
        channel
            .as_ref()
            .filter(|ch| ch.status().connected())
            .cloned()
    }

    async fn channel(&self) -> Result<Channel> {
        if let Some(ch) = self.live_channel().await {
            return Ok(ch);
        }

        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        // Re-check under the write lock: a concurrent caller may have reconnected.
        if let Some(ch) = channel.as_ref().filter(|ch| ch.status().connected()) {
            return Ok(ch.clone());
        }

        let (conn, ch) = self.connect().await?;
        *connection = Some(conn);
        *channel = Some(ch.clone());

        Ok(ch)
    }

    /// Open a connection and channel and make sure the queue exists.
    async fn connect(&self) -> Result<(Connection, Channel)> {
        info!(queue = %self.inner.queue, "events_publisher_connecting");

        let conn = Connection::connect(&self.inner.url, ConnectionProperties::default())
            .await
            .context("Failed to connect to RabbitMQ")?;

        let ch = conn
            .create_channel()
            .await
            .context("Failed to open AMQP channel")?;

        ch.queue_declare(
            &self.inner.queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .with_context(|| format!("Failed to declare queue {}", self.inner.queue))?;

        info!(queue = %self.inner.queue, "events_publisher_ready");

        Ok((conn, ch))
    }

    /// Publish one event and wait until the broker confirms it.
    pub async fn publish(&self, event: &QueuedEvent) -> Result<()> {
        let channel = self.channel().await?;

        let body = serde_json::to_vec(event).context("Failed to serialize event")?;
        let message_id = event.message_id();
        let properties = BasicProperties::default()
            .with_delivery_mode(PERSISTENT)
            .with_content_type("application/json".into())
            .with_message_id(message_id.clone().into());

        channel
            .basic_publish(
                "",
                &self.inner.queue,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await
            .context("Failed to publish event")?
            .await
            .context("Broker did not confirm event")?;

        info!(
            queue = %self.inner.queue,
            message_id = %message_id,
            body_length = body.len(),
            "events_publisher_sent"
        );

        Ok(())
    }

    /// Close channel then connection. Safe to call when never connected.
    pub async fn close(&self) {
        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        if let Some(ch) = channel.take() {
            if let Err(e) = ch.close(200, "shutdown").await {
                warn!(error = %e, "events_publisher_channel_close_failed");
            }
        }

        if let Some(conn) = connection.take() {
            if let Err(e) = conn.close(200, "shutdown").await {
                warn!(error = %e, "events_publisher_connection_close_failed");
            }
        }

        info!(queue = %self.inner.queue, "events_publisher_closed");
    }
}
