//! WhatsApp webhook receiver - fast-ack web server.
//!
//! This binary:
//! - Answers the subscription handshake
//! - Verifies delivery signatures
//! - Dispatches statuses and messages to the configured handlers
//! - Returns `EVENT_RECEIVED` without waiting on downstream work

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wa_webhook::{router, AppState, Config, EventHandler, LoggingHandler, Publisher, QueueForwarder};

/// Upper bound on flushing buffered events at shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    let config = Config::from_env();
    info!(
        port = config.port,
        verify_token_configured = config.verify_token != wa_webhook::config::DEFAULT_VERIFY_TOKEN,
        signature_verification = config.signature_verification_enabled(),
        queue_forwarding = config.amqp_url.is_some(),
        events_queue = %config.events_queue,
        "config_loaded"
    );

    if !config.signature_verification_enabled() {
        warn!("APP_SECRET not set: delivery signatures are NOT verified, any caller can post events");
    }

    let mut handlers: Vec<Arc<dyn EventHandler>> = vec![Arc::new(LoggingHandler)];
    let mut forwarding = None;

    if let Some(url) = config.amqp_url.clone() {
        let publisher = Publisher::new(url, config.events_queue.clone());
        let (forwarder, drain) = QueueForwarder::spawn(publisher.clone(), config.forward_buffer)?;
        handlers.push(Arc::new(forwarder));
        info!(
            queue = %publisher.queue(),
            forward_buffer = config.forward_buffer,
            "rabbitmq_forwarder_started"
        );
        forwarding = Some((publisher, drain));
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = router(AppState::new(config, handlers));

    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // The router (and with it every forwarder) is gone, so the drain task
    // finishes once the buffered events are flushed.
    if let Some((publisher, drain)) = forwarding {
        match tokio::time::timeout(DRAIN_TIMEOUT, drain).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "rabbitmq_forwarder_join_failed"),
            Err(_) => warn!("rabbitmq_forwarder_drain_timeout"),
        }
        publisher.close().await;
    }

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "ctrl_c_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
