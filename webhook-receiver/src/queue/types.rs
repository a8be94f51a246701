//! Queue message types for forwarded webhook events.
//!
//! Each status or message of an authenticated delivery becomes one
//! self-contained JSON message, tagged by `kind`.

use serde::{Deserialize, Serialize};

use crate::events::{InboundMessage, StatusUpdate};

/// A single webhook event as published to the events queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum QueuedEvent {
    /// Delivery receipt for an outbound message
    #[serde(rename = "status")]
    Status {
        phone_number_id: String,
        status: StatusUpdate,
    },
    /// Message received from a user
    #[serde(rename = "message")]
    Message {
        phone_number_id: String,
        message: InboundMessage,
    },
}

impl QueuedEvent {
    /// AMQP message id used for tracing a publish through the broker.
    ///
    /// Statuses carry the id of the message they refer to, so the status
    /// value is appended to keep `sent`/`delivered`/`read` apart.
    pub fn message_id(&self) -> String {
        match self {
            QueuedEvent::Status { status, .. } => format!("status-{}-{}", status.id, status.status),
            QueuedEvent::Message { message, .. } => format!("message-{}", message.id),
        }
    }
}
