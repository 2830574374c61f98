//! Payment processor webhooks: signature verification and event decoding.
//!
//! The signature header looks like `t=1700000000,v1=<hex>,v1=<hex>`; each
//! `v1` is an HMAC-SHA256 of `"{t}.{body}"` keyed with the endpoint secret.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use florist_core::{InvoiceId, OrderId};

use super::PaymentError;

/// Header carrying the signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Maximum age of a signed timestamp, in seconds.
pub const TOLERANCE_SECS: i64 = 300;

/// Check a webhook signature header against the raw body.
///
/// # Errors
///
/// Returns `PaymentError::InvalidSignature` if the header is malformed, the
/// timestamp is outside the tolerance, or no `v1` signature matches.
pub fn verify_signature(
    secret: &str,
    header: &str,
    body: &str,
    now: DateTime<Utc>,
) -> Result<(), PaymentError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| PaymentError::InvalidSignature("missing timestamp".to_owned()))?;
    let ts: i64 = timestamp
        .parse()
        .map_err(|_| PaymentError::InvalidSignature("invalid timestamp".to_owned()))?;
    if (now.timestamp() - ts).abs() > TOLERANCE_SECS {
        return Err(PaymentError::InvalidSignature(
            "timestamp outside tolerance".to_owned(),
        ));
    }
    if signatures.is_empty() {
        return Err(PaymentError::InvalidSignature("missing v1 signature".to_owned()));
    }

    let expected = sign(secret, timestamp, body)?;
    if signatures
        .iter()
        .any(|candidate| constant_time_compare(&expected, candidate))
    {
        Ok(())
    } else {
        Err(PaymentError::InvalidSignature("signature mismatch".to_owned()))
    }
}

/// Hex HMAC-SHA256 of `"{timestamp}.{body}"`.
pub(crate) fn sign(secret: &str, timestamp: &str, body: &str) -> Result<String, PaymentError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::InvalidSignature(e.to_string()))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

#[derive(Debug, Deserialize)]
struct Event {
    #[serde(rename = "type")]
    kind: String,
    created: i64,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: IntentObject,
}

#[derive(Debug, Deserialize)]
struct IntentObject {
    id: String,
    #[serde(default)]
    metadata: Metadata,
}

#[derive(Debug, Default, Deserialize)]
struct Metadata {
    order_id: Option<String>,
    invoice_id: Option<String>,
}

/// What the storefront should do with a verified event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookAction {
    InvoicePaid {
        invoice_id: InvoiceId,
        intent_id: String,
        at: DateTime<Utc>,
    },
    OrderPaid {
        order_id: OrderId,
        intent_id: String,
        at: DateTime<Utc>,
    },
    OrderPaymentFailed {
        order_id: OrderId,
        at: DateTime<Utc>,
    },
    /// Acknowledged without any change.
    Ignored(String),
}

/// Decode a verified webhook body.
///
/// # Errors
///
/// Returns `PaymentError::Parse` if the body is not an event.
pub fn parse_event(body: &str) -> Result<WebhookAction, PaymentError> {
    let event: Event = serde_json::from_str(body).map_err(|e| PaymentError::Parse(e.to_string()))?;
    let at = DateTime::from_timestamp(event.created, 0).unwrap_or_else(Utc::now);
    let object = event.data.object;

    let invoice_id: Option<InvoiceId> = object.metadata.invoice_id.as_deref().and_then(|v| v.parse().ok());
    let order_id: Option<OrderId> = object.metadata.order_id.as_deref().and_then(|v| v.parse().ok());

    let action = match (event.kind.as_str(), invoice_id, order_id) {
        ("payment_intent.succeeded", Some(invoice_id), _) => WebhookAction::InvoicePaid {
            invoice_id,
            intent_id: object.id,
            at,
        },
        ("payment_intent.succeeded", None, Some(order_id)) => WebhookAction::OrderPaid {
            order_id,
            intent_id: object.id,
            at,
        },
        ("payment_intent.payment_failed", _, Some(order_id)) => {
            WebhookAction::OrderPaymentFailed { order_id, at }
        }
        (kind, _, _) => WebhookAction::Ignored(kind.to_owned()),
    };
    Ok(action)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_Zk3pQ9xL2mN7";

    fn header_for(body: &str, at: DateTime<Utc>) -> String {
        let ts = at.timestamp().to_string();
        format!("t={ts},v1={}", sign(SECRET, &ts, body).unwrap())
    }

    fn event(kind: &str, metadata: &str) -> String {
        format!(
            r#"{{"id":"evt_1","type":"{kind}","created":1767225600,"data":{{"object":{{"id":"pi_123","metadata":{metadata}}}}}}}"#
        )
    }

    #[test]
    fn test_verify_signature_accepts_valid() {
        let now = Utc::now();
        let body = event("payment_intent.succeeded", "{}");
        assert!(verify_signature(SECRET, &header_for(&body, now), &body, now).is_ok());
    }

    #[test]
    fn test_verify_signature_accepts_any_matching_v1() {
        let now = Utc::now();
        let body = "{}";
        let header = format!("{},v1=deadbeef", header_for(body, now));
        assert!(verify_signature(SECRET, &header, body, now).is_ok());
    }

    #[test]
    fn test_verify_signature_rejects_tampered_body() {
        let now = Utc::now();
        let header = header_for("{\"amount\":100}", now);
        let result = verify_signature(SECRET, &header, "{\"amount\":1}", now);
        assert!(matches!(result, Err(PaymentError::InvalidSignature(_))));
    }

    #[test]
    fn test_verify_signature_rejects_stale_timestamp() {
        let signed_at = Utc::now() - chrono::Duration::seconds(TOLERANCE_SECS + 1);
        let header = header_for("{}", signed_at);
        let result = verify_signature(SECRET, &header, "{}", Utc::now());
        assert!(matches!(result, Err(PaymentError::InvalidSignature(_))));
    }

    #[test]
    fn test_verify_signature_rejects_malformed_header() {
        let now = Utc::now();
        assert!(verify_signature(SECRET, "v1=abc", "{}", now).is_err());
        assert!(verify_signature(SECRET, "t=abc,v1=abc", "{}", now).is_err());
        assert!(verify_signature(SECRET, &format!("t={}", now.timestamp()), "{}", now).is_err());
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("hello", "hello"));
        assert!(!constant_time_compare("hello", "world"));
        assert!(!constant_time_compare("hello", "hell"));
    }

    #[test]
    fn test_parse_invoice_paid() {
        let body = event("payment_intent.succeeded", r#"{"invoice_id":"42"}"#);
        let action = parse_event(&body).unwrap();
        assert_eq!(
            action,
            WebhookAction::InvoicePaid {
                invoice_id: InvoiceId::new(42),
                intent_id: "pi_123".to_owned(),
                at: DateTime::from_timestamp(1_767_225_600, 0).unwrap(),
            }
        );
    }

    #[test]
    fn test_parse_order_paid_and_failed() {
        let body = event("payment_intent.succeeded", r#"{"order_id":"9"}"#);
        assert!(matches!(
            parse_event(&body).unwrap(),
            WebhookAction::OrderPaid { order_id, .. } if order_id == OrderId::new(9)
        ));

        let body = event("payment_intent.payment_failed", r#"{"order_id":"9"}"#);
        assert!(matches!(
            parse_event(&body).unwrap(),
            WebhookAction::OrderPaymentFailed { .. }
        ));
    }

    #[test]
    fn test_parse_unknown_event_is_ignored() {
        let body = event("charge.refunded", r#"{"order_id":"9"}"#);
        assert_eq!(
            parse_event(&body).unwrap(),
            WebhookAction::Ignored("charge.refunded".to_owned())
        );

        let body = event("payment_intent.succeeded", "{}");
        assert!(matches!(parse_event(&body).unwrap(), WebhookAction::Ignored(_)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(parse_event("not json"), Err(PaymentError::Parse(_))));
    }
}
