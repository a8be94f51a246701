//! WhatsApp Business webhook receiver.
//!
//! Verifies the subscription handshake, authenticates signed deliveries and
//! acknowledges them within the platform's delivery SLA.
//!
//! ## Architecture
//!
//! ```text
//! GET  /webhook → verify_handshake() → challenge
//! POST /webhook → verify_signature() → DeliveryEnvelope::parse() → dispatch() → EVENT_RECEIVED
//!                                                                      ↓
//!                                                   LoggingHandler / QueueForwarder → RabbitMQ
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod queue;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use error::WebhookError;
pub use events::{DeliveryEnvelope, EventHandler, InboundMessage, LoggingHandler, StatusUpdate};
pub use queue::{Publisher, QueueForwarder, QueuedEvent};
pub use web::{router, AppState};
