//! Web server module for the webhook endpoints.
//!
//! - `GET /webhook`: subscription handshake
//! - `POST /webhook`: signed event delivery, acknowledged immediately
//! - `GET /` and `GET /health`: service info and liveness

pub mod handlers;
pub mod handshake;
pub mod signature;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

pub use handlers::{
    health, index, receive_webhook, verify_webhook, AppState, HealthResponse, ServiceInfo,
    ACK_BODY,
};
pub use handshake::{verify_handshake, VerificationRequest};
pub use signature::{compute_signature, verify_signature, SIGNATURE_HEADER};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/webhook", get(verify_webhook).post(receive_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
