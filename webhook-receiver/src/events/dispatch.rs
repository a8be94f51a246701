//! Event dispatch to pluggable handlers.
//!
//! Handlers run inline on the request path, so they must return quickly.
//! Anything slow (network, queues) belongs in a spawned task; see
//! [`crate::queue::QueueForwarder`].

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use super::types::{DeliveryEnvelope, InboundMessage, StatusUpdate};

/// Receives the statuses and messages of an authenticated delivery.
pub trait EventHandler: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn handle_status(&self, phone_number_id: &str, status: &StatusUpdate) -> Result<()>;

    fn handle_message(&self, phone_number_id: &str, message: &InboundMessage) -> Result<()>;
}

/// Counters describing one dispatch pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub statuses: usize,
    pub messages: usize,
    /// Handler invocations that returned an error or panicked
    pub failures: usize,
}

/// Offer every status and message in `envelope` to every handler.
///
/// Order follows the payload: entries, changes, then statuses before
/// messages within each value. A failing handler is logged and the loop
/// carries on with the next handler and the next event.
pub fn dispatch(envelope: &DeliveryEnvelope, handlers: &[Arc<dyn EventHandler>]) -> DispatchSummary {
    let mut summary = DispatchSummary::default();

    for entry in &envelope.entries {
        for change in &entry.changes {
            let value = &change.value;
            let phone_number_id = value.phone_number_id();

            for status in &value.statuses {
                summary.statuses += 1;
                for handler in handlers {
                    let outcome = guarded(|| handler.handle_status(phone_number_id, status));
                    if let Err(e) = outcome {
                        summary.failures += 1;
                        error!(
                            handler = handler.name(),
                            phone_number_id = %phone_number_id,
                            status_id = %status.id,
                            error = %e,
                            "status_handler_failed"
                        );
                    }
                }
            }

            for message in &value.messages {
                summary.messages += 1;
                for handler in handlers {
                    let outcome = guarded(|| handler.handle_message(phone_number_id, message));
                    if let Err(e) = outcome {
                        summary.failures += 1;
                        error!(
                            handler = handler.name(),
                            phone_number_id = %phone_number_id,
                            message_id = %message.id,
                            error = %e,
                            "message_handler_failed"
                        );
                    }
                }
            }
        }
    }

    summary
}

/// Run a handler call, turning a panic into an error.
fn guarded(call: impl FnOnce() -> Result<()>) -> Result<()> {
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(anyhow::anyhow!("handler panicked: {}", reason))
        }
    }
}

/// Default handler: one structured log line per event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn handle_status(&self, phone_number_id: &str, status: &StatusUpdate) -> Result<()> {
        info!(
            phone_number_id = %phone_number_id,
            status_id = %status.id,
            status = %status.status,
            recipient_id = ?status.recipient_id,
            timestamp = ?status.timestamp,
            "status_received"
        );
        Ok(())
    }

    fn handle_message(&self, phone_number_id: &str, message: &InboundMessage) -> Result<()> {
        info!(
            phone_number_id = %phone_number_id,
            message_id = %message.id,
            from = %message.from,
            message_type = %message.kind,
            timestamp = ?message.timestamp,
            "message_received"
        );
        Ok(())
    }
}
