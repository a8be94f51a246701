//! Queue module for forwarding webhook events to RabbitMQ.
//!
//! ## Architecture
//!
//! ```text
//! POST /webhook → dispatch() → QueueForwarder ─(bounded channel)→ drain task → Publisher → events queue
//! ```

pub mod forwarder;
pub mod publisher;
pub mod types;

pub use forwarder::QueueForwarder;
pub use publisher::Publisher;
pub use types::QueuedEvent;
