//! # Stripe Webhook Handling
//!
//! Turns an incoming webhook request into a [`PaymentNotification`].
//!
//! Two body shapes are understood:
//! - a plain status report, `{"order_id": 12, "status": "succeeded"}`
//! - a Stripe `payment_intent.*` event whose intent carries
//!   `metadata.order_id`
//!
//! With a signing secret configured every request must carry a valid
//! `Stripe-Signature` header. Without one, only plain status reports are
//! accepted.

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use shop_core::{OrderId, PaymentNotification, PaymentStatus, ShopError, ShopResult};
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

/// Signatures older (or newer) than this are rejected
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Stripe events that carry a payment status change
pub const HANDLED_EVENTS: &[&str] = &[
    "payment_intent.succeeded",
    "payment_intent.processing",
    "payment_intent.payment_failed",
    "payment_intent.canceled",
];

/// Verifies and decodes payment webhooks
#[derive(Debug, Clone, Default)]
pub struct WebhookVerifier {
    secret: Option<String>,
}

impl WebhookVerifier {
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }

    pub fn requires_signature(&self) -> bool {
        self.secret.is_some()
    }

    /// Decode a webhook body into a notification.
    ///
    /// `Ok(None)` is an event that is authentic but carries nothing to
    /// reconcile; it should still be acknowledged.
    pub fn parse_notification(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> ShopResult<Option<PaymentNotification>> {
        match &self.secret {
            Some(secret) => {
                let signature = signature.ok_or_else(|| {
                    ShopError::Unauthorized("missing Stripe-Signature header".to_string())
                })?;
                verify_signature(secret, payload, signature, Utc::now().timestamp())?;
                decode(payload)
            }
            None => decode_plain(payload).map(Some),
        }
    }
}

fn decode(payload: &[u8]) -> ShopResult<Option<PaymentNotification>> {
    let value: serde_json::Value = serde_json::from_slice(payload)
        .map_err(|e| ShopError::InvalidInput(format!("Failed to parse webhook: {e}")))?;

    if value.get("type").is_none() {
        return decode_plain(payload).map(Some);
    }

    let event: StripeWebhookEvent = serde_json::from_value(value)
        .map_err(|e| ShopError::InvalidInput(format!("Failed to parse webhook: {e}")))?;
    debug!("Verified Stripe webhook: id={}, type={}", event.id, event.event_type);

    let status = match event.event_type.as_str() {
        "payment_intent.succeeded" => PaymentStatus::Succeeded,
        "payment_intent.processing" => PaymentStatus::Processing,
        "payment_intent.payment_failed" => PaymentStatus::Failed,
        "payment_intent.canceled" => PaymentStatus::Cancelled,
        other => {
            debug!("Ignoring webhook event type {}", other);
            return Ok(None);
        }
    };

    let intent = event.data.object;
    let order_id = intent
        .metadata
        .get("order_id")
        .ok_or_else(|| {
            warn!("Payment intent {} has no order_id metadata", intent.id);
            ShopError::InvalidInput("payment intent has no order_id metadata".to_string())
        })?
        .parse::<OrderId>()?;

    Ok(Some(PaymentNotification {
        order_id,
        status,
        transaction_id: Some(intent.id),
    }))
}

fn decode_plain(payload: &[u8]) -> ShopResult<PaymentNotification> {
    serde_json::from_slice(payload)
        .map_err(|e| ShopError::InvalidInput(format!("Invalid payment notification: {e}")))
}

// =============================================================================
// Webhook Signature Verification
// =============================================================================

struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<String>,
}

fn parse_signature_header(header: &str) -> ShopResult<SignatureHeader> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => signatures.push(value.to_string()),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        ShopError::Unauthorized("Missing timestamp in signature".to_string())
    })?;

    if signatures.is_empty() {
        return Err(ShopError::Unauthorized("No v1 signature found".to_string()));
    }

    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

fn verify_signature(secret: &str, payload: &[u8], header: &str, now: i64) -> ShopResult<()> {
    let parsed = parse_signature_header(header)?;

    if (now - parsed.timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(ShopError::Unauthorized(
            "Timestamp outside tolerance".to_string(),
        ));
    }

    let expected = compute_signature(secret, parsed.timestamp, payload)?;
    let valid = parsed
        .signatures
        .iter()
        .any(|sig| constant_time_compare(sig, &expected));

    if !valid {
        return Err(ShopError::Unauthorized("Signature mismatch".to_string()));
    }
    Ok(())
}

/// Hex HMAC-SHA256 over `{timestamp}.{payload}`
pub fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> ShopResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ShopError::Configuration(format!("invalid webhook secret: {e}")))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}

// =============================================================================
// Stripe Event Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct StripeWebhookEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: StripeIntentObject,
}

#[derive(Debug, Deserialize)]
struct StripeIntentObject {
    id: String,
    #[serde(default)]
    metadata: std::collections::HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "whsec_test";

    fn signed(payload: &[u8], timestamp: i64) -> String {
        let sig = compute_signature(SECRET, timestamp, payload).unwrap();
        format!("t={timestamp},v1={sig}")
    }

    fn intent_event(event_type: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "evt_1",
            "type": event_type,
            "created": 1700000000,
            "data": { "object": {
                "id": "pi_123",
                "object": "payment_intent",
                "metadata": { "order_id": "12", "user_id": "3" }
            }}
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_signature_header() {
        let header = "t=1234567890,v1=abc123,v1=def456";
        let parsed = parse_signature_header(header).unwrap();

        assert_eq!(parsed.timestamp, 1234567890);
        assert_eq!(parsed.signatures.len(), 2);
        assert_eq!(parsed.signatures[0], "abc123");
        assert!(parse_signature_header("v1=abc").is_err());
        assert!(parse_signature_header("t=123").is_err());
    }

    #[test]
    fn test_signature_is_hex_sha256() {
        let sig = compute_signature(SECRET, 1234567890, b"{}").unwrap();
        assert_eq!(sig.len(), 64);
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc123", "abc123"));
        assert!(!constant_time_compare("abc123", "abc124"));
        assert!(!constant_time_compare("abc", "abcd"));
    }

    #[test]
    fn test_verify_signature_tolerance() {
        let payload = b"{}";
        let header = signed(payload, 1_000);
        assert!(verify_signature(SECRET, payload, &header, 1_200).is_ok());
        assert!(matches!(
            verify_signature(SECRET, payload, &header, 1_400),
            Err(ShopError::Unauthorized(_))
        ));
        assert!(verify_signature(SECRET, b"{\"x\":1}", &header, 1_000).is_err());
    }

    #[test]
    fn test_signed_stripe_event_becomes_notification() {
        let verifier = WebhookVerifier::new(Some(SECRET.to_string()));
        let payload = intent_event("payment_intent.succeeded");
        let header = signed(&payload, Utc::now().timestamp());

        let notification = verifier
            .parse_notification(&payload, Some(&header))
            .unwrap()
            .unwrap();
        assert_eq!(notification.order_id, OrderId(12));
        assert_eq!(notification.status, PaymentStatus::Succeeded);
        assert_eq!(notification.transaction_id.as_deref(), Some("pi_123"));
    }

    #[test]
    fn test_unhandled_event_is_ignored() {
        let verifier = WebhookVerifier::new(Some(SECRET.to_string()));
        let payload = intent_event("charge.refunded");
        let header = signed(&payload, Utc::now().timestamp());
        assert_eq!(verifier.parse_notification(&payload, Some(&header)).unwrap(), None);
    }

    #[test]
    fn test_secret_requires_signature() {
        let verifier = WebhookVerifier::new(Some(SECRET.to_string()));
        let payload = br#"{"order_id": 12, "status": "succeeded"}"#;
        assert!(matches!(
            verifier.parse_notification(payload, None),
            Err(ShopError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_plain_body_without_secret() {
        let verifier = WebhookVerifier::default();
        let payload = br#"{"order_id": 12, "status": "processing"}"#;
        let notification = verifier.parse_notification(payload, None).unwrap().unwrap();
        assert_eq!(notification.status, PaymentStatus::Processing);
        assert_eq!(notification.transaction_id, None);

        let bad = br#"{"order_id": 12, "status": "refunded"}"#;
        assert!(matches!(
            verifier.parse_notification(bad, None),
            Err(ShopError::InvalidInput(_))
        ));
    }
}
