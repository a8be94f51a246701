//! Webhook endpoint handlers.
//!
//! The POST handler is built around the platform's delivery SLA: it only
//! verifies, parses and hands events to the configured handlers, then
//! acknowledges. Slow work lives behind the handlers in spawned tasks.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, QueryRejection},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::WebhookError;
use crate::events::{dispatch, DeliveryEnvelope, EventHandler};
use crate::web::handshake::{verify_handshake, VerificationRequest};
use crate::web::signature::{verify_signature, SIGNATURE_HEADER};
use crate::Config;

/// Body returned for every accepted delivery.
pub const ACK_BODY: &str = "EVENT_RECEIVED";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub handlers: Arc<[Arc<dyn EventHandler>]>,
}

impl AppState {
    pub fn new(config: Config, handlers: Vec<Arc<dyn EventHandler>>) -> Self {
        Self {
            config: Arc::new(config),
            handlers: handlers.into(),
        }
    }
}

// =============================================================================
// Info / Health
// =============================================================================

/// Static service description served on `/`.
#[derive(Serialize)]
pub struct ServiceInfo {
    pub service: &'static str,
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn index() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: "wa-webhook",
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Subscription Handshake
// =============================================================================

/// Subscription handshake endpoint.
///
/// Echoes `hub.challenge` as a bare integer when mode and token check out.
/// An undecodable query (e.g. a repeated `hub.mode`) is malformed.
pub async fn verify_webhook(
    State(state): State<AppState>,
    query: Result<Query<VerificationRequest>, QueryRejection>,
) -> Result<String, WebhookError> {
    let Query(request) = query.map_err(|e| {
        warn!(error = %e, "handshake_query_rejected");
        WebhookError::MalformedHandshake("undecodable handshake query")
    })?;

    let challenge = verify_handshake(&request, &state.config.verify_token)?;

    info!("handshake_verified");

    Ok(challenge.to_string())
}

// =============================================================================
// Event Delivery
// =============================================================================

/// Event delivery endpoint.
///
/// This endpoint:
/// 1. Verifies the `x-hub-signature-256` HMAC (if an app secret is configured)
/// 2. Parses the delivery envelope
/// 3. Dispatches statuses and messages to the handlers
/// 4. Returns 200 `EVENT_RECEIVED`
///
/// A body that cannot be read (over the 2 MB default limit, broken stream)
/// is answered 400 like any other malformed payload.
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, &'static str), WebhookError> {
    let body = body.map_err(|e| {
        warn!(status = %e.status(), error = %e, "webhook_body_rejected");
        WebhookError::MalformedPayload(e.body_text())
    })?;

    info!(body_length = body.len(), "webhook_received");

    if state.config.signature_verification_enabled() {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if !verify_signature(&state.config.app_secret, &body, signature) {
            warn!(has_signature = !signature.is_empty(), "webhook_signature_invalid");
            return Err(WebhookError::InvalidSignature);
        }
    }

    let envelope = DeliveryEnvelope::parse(&body).map_err(|e| {
        warn!(error = %e, "webhook_payload_malformed");
        e
    })?;

    if !envelope.is_business_account() {
        warn!(object = %envelope.object_type, "webhook_object_unrecognized");
        return Ok((StatusCode::OK, ACK_BODY));
    }

    let summary = dispatch(&envelope, &state.handlers);

    info!(
        entries = envelope.entries.len(),
        skipped_items = envelope.skipped.total(),
        statuses = summary.statuses,
        messages = summary.messages,
        handler_failures = summary.failures,
        "webhook_acknowledged"
    );

    Ok((StatusCode::OK, ACK_BODY))
}
