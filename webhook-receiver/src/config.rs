//! Configuration module for environment variable parsing.
//!
//! Everything is read once at startup into an immutable [`Config`] that is
//! shared read-only by every request.

use std::env;
use tracing::warn;

/// Placeholder handshake token used when `VERIFY_TOKEN` is not set.
pub const DEFAULT_VERIFY_TOKEN: &str = "change-me-verify-token";

/// Default queue for forwarded webhook events.
pub const DEFAULT_EVENTS_QUEUE: &str = "whatsapp_events";

/// Default number of events buffered for the queue forwarder.
pub const DEFAULT_FORWARD_BUFFER: usize = 1024;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Token the platform must echo back during the subscription handshake
    pub verify_token: String,

    /// App secret keying the `x-hub-signature-256` HMAC.
    ///
    /// Empty disables signature verification entirely. Only acceptable for
    /// local development: any caller can then post events.
    pub app_secret: String,

    /// Port for the web server to listen on
    pub port: u16,

    /// RabbitMQ URL; when set, events are forwarded to `events_queue`
    pub amqp_url: Option<String>,

    /// Queue receiving forwarded status/message events
    pub events_queue: String,

    /// Events held in memory while waiting for the broker; extra events are dropped
    pub forward_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            verify_token: DEFAULT_VERIFY_TOKEN.to_string(),
            app_secret: String::new(),
            port: 8000,
            amqp_url: None,
            events_queue: DEFAULT_EVENTS_QUEUE.to_string(),
            forward_buffer: DEFAULT_FORWARD_BUFFER,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        Config {
            verify_token: env::var("VERIFY_TOKEN").unwrap_or(defaults.verify_token),

            app_secret: env::var("APP_SECRET").unwrap_or(defaults.app_secret),

            port: parse_port("PORT", defaults.port),

            amqp_url: parse_optional("AMQP_URL"),

            events_queue: parse_optional("EVENTS_QUEUE").unwrap_or(defaults.events_queue),

            forward_buffer: parse_optional("FORWARD_BUFFER")
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|&n| n > 0)
                .unwrap_or(defaults.forward_buffer),
        }
    }

    /// Whether inbound deliveries must carry a valid signature.
    pub fn signature_verification_enabled(&self) -> bool {
        !self.app_secret.is_empty()
    }
}

/// Parse a port number, falling back to `default` on absence or garbage.
fn parse_port(name: &str, default: u16) -> u16 {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().parse::<u16>() {
        Ok(port) => port,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid port, using default");
            default
        }
    }
}

/// Read a variable, treating blank values as unset.
fn parse_optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
