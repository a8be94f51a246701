//! Typed delivery payloads and their dispatch.
//!
//! ## Processing Flow
//!
//! ```text
//! raw body → DeliveryEnvelope::parse() → dispatch() → EventHandler(s)
//! ```

pub mod dispatch;
pub mod types;

pub use dispatch::{dispatch, DispatchSummary, EventHandler, LoggingHandler};
pub use types::{
    Change, DeliveryEnvelope, Entry, EventValue, InboundMessage, Metadata, SkippedItems,
    StatusUpdate, BUSINESS_ACCOUNT_OBJECT,
};
