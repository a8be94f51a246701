//! Event handler that forwards events to RabbitMQ.
//!
//! Handlers only push onto a bounded channel; a single drain task owns the
//! publisher and publishes one event at a time. While the broker is slow or
//! down the channel fills up and further events are dropped with an error,
//! so memory stays capped at `capacity` events for the whole outage. The
//! platform's own retries are the only redelivery.

use anyhow::{anyhow, Context, Result};
use tokio::{
    runtime::Handle,
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tracing::{error, info};

use super::publisher::Publisher;
use super::types::QueuedEvent;
use crate::events::{EventHandler, InboundMessage, StatusUpdate};

/// Fire-and-forget forwarding of statuses and messages to the events queue.
#[derive(Clone)]
pub struct QueueForwarder {
    sender: mpsc::Sender<QueuedEvent>,
}

impl QueueForwarder {
    /// Start the drain task on the current runtime.
    ///
    /// The returned handle completes once every forwarder clone is dropped
    /// and the buffered events have been published (or failed).
    pub fn spawn(publisher: Publisher, capacity: usize) -> Result<(Self, JoinHandle<()>)> {
        let runtime = Handle::try_current().context("No tokio runtime to publish from")?;
        let (sender, receiver) = mpsc::channel(capacity.max(1));

        let drain = runtime.spawn(drain(publisher, receiver));

        Ok((Self { sender }, drain))
    }

    fn forward(&self, event: QueuedEvent) -> Result<()> {
        match self.sender.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(event)) => Err(anyhow!(
                "forward buffer full, dropped {}",
                event.message_id()
            )),
            Err(TrySendError::Closed(event)) => Err(anyhow!(
                "forwarder stopped, dropped {}",
                event.message_id()
            )),
        }
    }
}

/// Publish buffered events until every sender is gone.
async fn drain(publisher: Publisher, mut receiver: mpsc::Receiver<QueuedEvent>) {
    while let Some(event) = receiver.recv().await {
        if let Err(e) = publisher.publish(&event).await {
            error!(
                queue = %publisher.queue(),
                message_id = %event.message_id(),
                error = %e,
                "rabbitmq_forward_failed"
            );
        }
    }

    info!(queue = %publisher.queue(), "rabbitmq_forwarder_drained");
}

impl EventHandler for QueueForwarder {
    fn name(&self) -> &'static str {
        "queue_forwarder"
    }

    fn handle_status(&self, phone_number_id: &str, status: &StatusUpdate) -> Result<()> {
        self.forward(QueuedEvent::Status {
            phone_number_id: phone_number_id.to_string(),
            status: status.clone(),
        })
    }

    fn handle_message(&self, phone_number_id: &str, message: &InboundMessage) -> Result<()> {
        self.forward(QueuedEvent::Message {
            phone_number_id: phone_number_id.to_string(),
            message: message.clone(),
        })
    }
}
