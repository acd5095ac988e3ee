//! Webhook signature calculation and verification.
//!
//! Stripe signs webhook deliveries with HMAC-SHA256 over `"{timestamp}.{body}"` and sends the
//! result in the `Stripe-Signature` header as `t=<unix seconds>,v1=<hex digest>`. A header may
//! carry several `v1` entries while a signing secret is being rotated; the delivery is valid if
//! any of them matches.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// The header carrying the webhook signature.
pub const STRIPE_SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Computes the hex digest of `HMAC-SHA256(secret, "{timestamp}.{body}")`.
pub fn sign_webhook_payload(secret: &str, timestamp: i64, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    mac.finalize().into_bytes().iter().map(|b| format!("{b:02x}")).collect()
}

/// Builds a complete `Stripe-Signature` header value for the given body.
pub fn signature_header_value(secret: &str, timestamp: i64, body: &[u8]) -> String {
    format!("t={timestamp},v1={}", sign_webhook_payload(secret, timestamp, body))
}

/// Verifies a `Stripe-Signature` header against the raw request body.
///
/// Returns false if the header does not parse, carries no timestamp, or none of its `v1`
/// signatures match the recomputed digest.
pub fn verify_webhook_signature(secret: &str, header: &str, body: &[u8]) -> bool {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for pair in header.split(',') {
        match pair.trim().split_once('=') {
            Some(("t", t)) => timestamp = t.parse::<i64>().ok(),
            Some(("v1", sig)) => signatures.push(sig),
            _ => {},
        }
    }
    let Some(t) = timestamp else {
        return false;
    };
    if signatures.is_empty() {
        return false;
    }
    let expected = sign_webhook_payload(secret, t, body);
    signatures.iter().any(|sig| *sig == expected)
}

#[cfg(test)]
mod test {
    use super::*;

    const SECRET: &str = "whsec_testsecret";

    #[test]
    fn round_trip_header_verifies() {
        let body = br#"{"id":"evt_1","type":"checkout.session.completed"}"#;
        let header = signature_header_value(SECRET, 1_700_000_000, body);
        assert!(verify_webhook_signature(SECRET, &header, body));
    }

    #[test]
    fn tampered_body_is_rejected() {
        let body = br#"{"id":"evt_1"}"#;
        let header = signature_header_value(SECRET, 1_700_000_000, body);
        assert!(!verify_webhook_signature(SECRET, &header, br#"{"id":"evt_2"}"#));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let body = b"payload";
        let header = signature_header_value(SECRET, 42, body);
        assert!(!verify_webhook_signature("whsec_other", &header, body));
    }

    #[test]
    fn header_without_timestamp_is_rejected() {
        let body = b"payload";
        let sig = sign_webhook_payload(SECRET, 42, body);
        assert!(!verify_webhook_signature(SECRET, &format!("v1={sig}"), body));
    }

    #[test]
    fn any_matching_v1_entry_is_accepted() {
        let body = b"payload";
        let sig = sign_webhook_payload(SECRET, 42, body);
        let header = format!("t=42,v1=deadbeef,v1={sig}");
        assert!(verify_webhook_signature(SECRET, &header, body));
    }

    #[test]
    fn garbage_header_is_rejected() {
        assert!(!verify_webhook_signature(SECRET, "not-a-signature", b"payload"));
        assert!(!verify_webhook_signature(SECRET, "", b"payload"));
    }
}
