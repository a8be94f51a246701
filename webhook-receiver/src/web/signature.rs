//! Delivery signature verification.
//!
//! The platform signs every POST body with HMAC-SHA256 keyed by the app
//! secret and sends the digest as `x-hub-signature-256: sha256=<hex>`.
//! The digest is computed over the raw body bytes, before any JSON parsing.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Verify a delivery signature header against the raw request body.
///
/// # Arguments
///
/// * `app_secret` - The configured app secret (non-empty)
/// * `payload` - The raw request body bytes
/// * `signature_header` - The `x-hub-signature-256` value, `sha256=<hex>`
///
/// # Returns
///
/// `true` if the header is well formed and its digest matches the body.
pub fn verify_signature(app_secret: &str, payload: &[u8], signature_header: &str) -> bool {
    if signature_header.is_empty() {
        warn!("signature_header_missing");
        return false;
    }

    let parts: Vec<&str> = signature_header.split('=').collect();
    if parts.len() != 2 {
        warn!(parts = parts.len(), "signature_header_malformed");
        return false;
    }

    let expected_signature = match compute_signature(app_secret, payload) {
        Some(sig) => sig,
        None => {
            warn!("signature_invalid_key");
            return false;
        }
    };

    // Constant-time comparison to prevent timing attacks
    let valid: bool = expected_signature
        .as_bytes()
        .ct_eq(parts[1].as_bytes())
        .into();

    if !valid {
        warn!(
            expected_length = expected_signature.len(),
            actual_length = parts[1].len(),
            "signature_mismatch"
        );
    }

    valid
}

/// Lowercase hex HMAC-SHA256 of `payload` keyed by `app_secret`.
pub fn compute_signature(app_secret: &str, payload: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(app_secret.as_bytes()).ok()?;
    mac.update(payload);
    Some(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-app-secret";
    const BODY: &[u8] = br#"{"object":"whatsapp_business_account","entry":[]}"#;

    fn header_for(body: &[u8]) -> String {
        format!("sha256={}", compute_signature(SECRET, body).unwrap())
    }

    #[test]
    fn test_verify_signature_valid() {
        assert!(verify_signature(SECRET, BODY, &header_for(BODY)));
    }

    #[test]
    fn test_verify_signature_missing_header() {
        assert!(!verify_signature(SECRET, BODY, ""));
    }

    #[test]
    fn test_verify_signature_malformed_header() {
        let digest = compute_signature(SECRET, BODY).unwrap();
        assert!(!verify_signature(SECRET, BODY, &digest));
        assert!(!verify_signature(SECRET, BODY, &format!("sha256={}=", digest)));
        assert!(!verify_signature(SECRET, BODY, &format!("sha256=={}", digest)));
    }

    #[test]
    fn test_verify_signature_wrong_secret() {
        let header = format!("sha256={}", compute_signature("other-secret", BODY).unwrap());
        assert!(!verify_signature(SECRET, BODY, &header));
    }

    #[test]
    fn test_flipping_any_payload_byte_fails() {
        let header = header_for(BODY);
        for i in 0..BODY.len() {
            let mut tampered = BODY.to_vec();
            tampered[i] ^= 0x01;
            assert!(
                !verify_signature(SECRET, &tampered, &header),
                "tampered byte {} still verified",
                i
            );
        }
    }

    #[test]
    fn test_flipping_any_digest_char_fails() {
        let digest = compute_signature(SECRET, BODY).unwrap();
        for i in 0..digest.len() {
            let mut chars: Vec<char> = digest.chars().collect();
            chars[i] = if chars[i] == '0' { '1' } else { '0' };
            let tampered: String = chars.into_iter().collect();
            assert!(!verify_signature(
                SECRET,
                BODY,
                &format!("sha256={}", tampered)
            ));
        }
    }

    #[test]
    fn test_truncated_digest_fails() {
        let digest = compute_signature(SECRET, BODY).unwrap();
        let header = format!("sha256={}", &digest[..digest.len() - 2]);
        assert!(!verify_signature(SECRET, BODY, &header));
    }

    #[test]
    fn test_compute_signature_known_vector() {
        // RFC 4231 test case 2
        assert_eq!(
            compute_signature("Jefe", b"what do ya want for nothing?").as_deref(),
            Some("5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843")
        );
    }
}
