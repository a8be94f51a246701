//! Subscription handshake verification.
//!
//! Before activating delivery the platform issues
//! `GET /webhook?hub.mode=subscribe&hub.verify_token=..&hub.challenge=..`
//! and expects the challenge echoed back as a bare integer.

use serde::Deserialize;
use tracing::warn;

use crate::error::WebhookError;

/// Mode the platform sends when subscribing an endpoint.
pub const SUBSCRIBE_MODE: &str = "subscribe";

/// Handshake query parameters. Every field is optional on the wire.
#[derive(Debug, Default, Deserialize)]
pub struct VerificationRequest {
    #[serde(default, rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(default, rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(default, rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Check a handshake against the configured token.
///
/// Returns the challenge as an integer on success. Missing parameters and a
/// non-numeric challenge are malformed (400); a wrong mode or token is
/// untrusted (403). The trust checks run before the challenge is parsed.
pub fn verify_handshake(
    request: &VerificationRequest,
    expected_token: &str,
) -> Result<i64, WebhookError> {
    let (mode, token, challenge) = match (
        request.mode.as_deref(),
        request.verify_token.as_deref(),
        request.challenge.as_deref(),
    ) {
        (Some(mode), Some(token), Some(challenge)) => (mode, token, challenge),
        _ => {
            warn!(
                has_mode = request.mode.is_some(),
                has_verify_token = request.verify_token.is_some(),
                has_challenge = request.challenge.is_some(),
                "handshake_missing_params"
            );
            return Err(WebhookError::MalformedHandshake("missing handshake parameter"));
        }
    };

    if mode != SUBSCRIBE_MODE {
        warn!(mode = %mode, "handshake_wrong_mode");
        return Err(WebhookError::UntrustedHandshake("mode is not subscribe"));
    }

    if token != expected_token {
        warn!("handshake_token_mismatch");
        return Err(WebhookError::UntrustedHandshake("verify token mismatch"));
    }

    challenge.parse::<i64>().map_err(|_| {
        warn!(challenge_length = challenge.len(), "handshake_challenge_not_integer");
        WebhookError::MalformedHandshake("challenge is not an integer")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "expected-token";

    fn request(mode: Option<&str>, token: Option<&str>, challenge: Option<&str>) -> VerificationRequest {
        VerificationRequest {
            mode: mode.map(str::to_string),
            verify_token: token.map(str::to_string),
            challenge: challenge.map(str::to_string),
        }
    }

    #[test]
    fn test_valid_handshake_returns_challenge() {
        let req = request(Some("subscribe"), Some(TOKEN), Some("1158201444"));
        assert_eq!(verify_handshake(&req, TOKEN), Ok(1158201444));
    }

    #[test]
    fn test_missing_any_param_is_malformed() {
        let cases = [
            request(None, Some(TOKEN), Some("1")),
            request(Some("subscribe"), None, Some("1")),
            request(Some("subscribe"), Some(TOKEN), None),
            request(None, None, None),
        ];
        for req in cases {
            assert!(matches!(
                verify_handshake(&req, TOKEN),
                Err(WebhookError::MalformedHandshake(_))
            ));
        }
    }

    #[test]
    fn test_wrong_mode_is_untrusted() {
        let req = request(Some("unsubscribe"), Some(TOKEN), Some("1"));
        assert!(matches!(
            verify_handshake(&req, TOKEN),
            Err(WebhookError::UntrustedHandshake(_))
        ));
    }

    #[test]
    fn test_wrong_token_is_untrusted() {
        for token in ["wrong", "", "expected-token ", "EXPECTED-TOKEN"] {
            let req = request(Some("subscribe"), Some(token), Some("1"));
            assert!(matches!(
                verify_handshake(&req, TOKEN),
                Err(WebhookError::UntrustedHandshake(_))
            ));
        }
    }

    #[test]
    fn test_non_integer_challenge_is_malformed() {
        let req = request(Some("subscribe"), Some(TOKEN), Some("abc"));
        assert_eq!(
            verify_handshake(&req, TOKEN),
            Err(WebhookError::MalformedHandshake("challenge is not an integer"))
        );
    }

    #[test]
    fn test_untrusted_caller_never_sees_challenge_error() {
        let req = request(Some("subscribe"), Some("wrong"), Some("abc"));
        assert!(matches!(
            verify_handshake(&req, TOKEN),
            Err(WebhookError::UntrustedHandshake(_))
        ));
    }

    #[test]
    fn test_query_deserialization() {
        let json = r#"{"hub.mode":"subscribe","hub.verify_token":"t","hub.challenge":"42"}"#;
        let req: VerificationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.mode.as_deref(), Some("subscribe"));
        assert_eq!(req.verify_token.as_deref(), Some("t"));
        assert_eq!(req.challenge.as_deref(), Some("42"));
    }
}
