//! Credit top-ups from the payment provider
//!
//! The provider delivers events as Standard Webhooks: the signature is an
//! HMAC-SHA256 over `"{webhook-id}.{webhook-timestamp}.{body}"` keyed with the
//! base64 secret, sent as a space separated list of `v1,<base64>` entries.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

/// Map slots granted per purchased unit
pub const CREDITS_PER_UNIT: i32 = 5;

/// Accepted clock skew between the provider and us, in seconds
pub const TIMESTAMP_TOLERANCE_SECS: i64 = 5 * 60;

const SECRET_PREFIX: &str = "whsec_";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WebhookError {
    #[error("Missing header: {0}")]
    MissingHeader(&'static str),

    #[error("Invalid signing secret")]
    InvalidSecret,

    #[error("Signature mismatch")]
    BadSignature,

    #[error("Timestamp outside tolerance")]
    StaleTimestamp,

    #[error("Invalid payload: {0}")]
    BadPayload(String),
}

/// The three Standard Webhooks headers
#[derive(Debug, Clone, Copy)]
pub struct WebhookHeaders<'a> {
    pub id: &'a str,
    pub timestamp: &'a str,
    pub signature: &'a str,
}

/// Verifies signed deliveries against one signing secret
#[derive(Clone)]
pub struct WebhookVerifier {
    key: Vec<u8>,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier").finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    /// `secret` is base64, optionally prefixed with `whsec_`
    pub fn new(secret: &str) -> Result<Self, WebhookError> {
        let encoded = secret.strip_prefix(SECRET_PREFIX).unwrap_or(secret);
        let key = STANDARD
            .decode(encoded.trim())
            .map_err(|_| WebhookError::InvalidSecret)?;
        if key.is_empty() {
            return Err(WebhookError::InvalidSecret);
        }
        Ok(Self { key })
    }

    pub fn verify(&self, headers: &WebhookHeaders<'_>, body: &[u8]) -> Result<(), WebhookError> {
        self.verify_at(headers, body, Utc::now().timestamp())
    }

    /// Verify against an explicit current time (unix seconds)
    pub fn verify_at(
        &self,
        headers: &WebhookHeaders<'_>,
        body: &[u8],
        now: i64,
    ) -> Result<(), WebhookError> {
        if headers.id.is_empty() {
            return Err(WebhookError::MissingHeader("webhook-id"));
        }
        if headers.signature.is_empty() {
            return Err(WebhookError::MissingHeader("webhook-signature"));
        }
        let timestamp: i64 = headers
            .timestamp
            .trim()
            .parse()
            .map_err(|_| WebhookError::MissingHeader("webhook-timestamp"))?;
        if now.abs_diff(timestamp) > TIMESTAMP_TOLERANCE_SECS.unsigned_abs() {
            warn!("Webhook {} timestamp {} is outside tolerance", headers.id, timestamp);
            return Err(WebhookError::StaleTimestamp);
        }

        let mac = self.mac_for(headers.id, headers.timestamp.trim(), body)?;
        for entry in headers.signature.split_whitespace() {
            let Some(("v1", encoded)) = entry.split_once(',') else {
                continue;
            };
            let Ok(candidate) = STANDARD.decode(encoded) else {
                continue;
            };
            if mac.clone().verify_slice(&candidate).is_ok() {
                debug!("Webhook {} signature verified", headers.id);
                return Ok(());
            }
        }
        Err(WebhookError::BadSignature)
    }

    /// `v1,<base64>` signature for a delivery
    pub fn sign(&self, id: &str, timestamp: i64, body: &[u8]) -> Result<String, WebhookError> {
        let mac = self.mac_for(id, &timestamp.to_string(), body)?;
        Ok(format!("v1,{}", STANDARD.encode(mac.finalize().into_bytes())))
    }

    fn mac_for(&self, id: &str, timestamp: &str, body: &[u8]) -> Result<HmacSha256, WebhookError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).map_err(|_| WebhookError::InvalidSecret)?;
        mac.update(id.as_bytes());
        mac.update(b".");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);
        Ok(mac)
    }
}

/// A verified event, reduced to what the service acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingEvent {
    /// A completed purchase: raise the customer's map limit
    TopUp { email: String, quantity: i32 },
    /// Acknowledged and ignored
    Other { event_type: String },
}

impl BillingEvent {
    /// Map slots this event grants; `None` if it does not fit an `i32`
    pub fn credits(&self) -> Option<i32> {
        match self {
            BillingEvent::TopUp { quantity, .. } => quantity.checked_mul(CREDITS_PER_UNIT),
            BillingEvent::Other { .. } => Some(0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: Value,
}

/// Parse a verified delivery body
pub fn parse_event(body: &[u8]) -> Result<BillingEvent, WebhookError> {
    let envelope: Envelope =
        serde_json::from_slice(body).map_err(|e| WebhookError::BadPayload(e.to_string()))?;

    if envelope.event_type != "payment.succeeded" {
        return Ok(BillingEvent::Other {
            event_type: envelope.event_type,
        });
    }

    let email = envelope
        .data
        .pointer("/customer/email")
        .and_then(Value::as_str)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| WebhookError::BadPayload("missing customer email".to_string()))?
        .to_string();

    // Metadata values arrive as strings; accept plain numbers too
    let quantity = match envelope.data.pointer("/metadata/quantity") {
        Some(Value::String(s)) => s.trim().parse::<i32>().ok(),
        Some(Value::Number(n)) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
        _ => None,
    }
    .filter(|q| *q > 0)
    .ok_or_else(|| WebhookError::BadPayload("missing or invalid quantity".to_string()))?;

    let event = BillingEvent::TopUp { email, quantity };
    if event.credits().is_none() {
        return Err(WebhookError::BadPayload(format!(
            "quantity {} is too large",
            quantity
        )));
    }
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_MfKQ9r8GKYqrTwjUPD8ILPZIo2LaLaSw";
    const NOW: i64 = 1_700_000_000;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(SECRET).unwrap()
    }

    fn payment(quantity: &str) -> Vec<u8> {
        format!(
            r#"{{"type":"payment.succeeded","data":{{"payload_type":"Payment","customer":{{"email":"ada@example.com"}},"metadata":{{"quantity":{}}}}}}}"#,
            quantity
        )
        .into_bytes()
    }

    #[test]
    fn test_signature_round_trip() {
        let body = payment("\"2\"");
        let signature = verifier().sign("msg_1", NOW, &body).unwrap();
        let headers = WebhookHeaders {
            id: "msg_1",
            timestamp: &NOW.to_string(),
            signature: &signature,
        };
        assert!(verifier().verify_at(&headers, &body, NOW + 10).is_ok());
    }

    #[test]
    fn test_any_listed_signature_accepted() {
        let body = payment("1");
        let good = verifier().sign("msg_1", NOW, &body).unwrap();
        let signature = format!("v1,AAAA {}", good);
        let headers = WebhookHeaders {
            id: "msg_1",
            timestamp: &NOW.to_string(),
            signature: &signature,
        };
        assert!(verifier().verify_at(&headers, &body, NOW).is_ok());
    }

    #[test]
    fn test_tampered_body_rejected() {
        let signature = verifier().sign("msg_1", NOW, &payment("1")).unwrap();
        let headers = WebhookHeaders {
            id: "msg_1",
            timestamp: &NOW.to_string(),
            signature: &signature,
        };
        assert_eq!(
            verifier().verify_at(&headers, &payment("100"), NOW),
            Err(WebhookError::BadSignature)
        );
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let body = payment("1");
        let signature = verifier().sign("msg_1", NOW, &body).unwrap();
        let headers = WebhookHeaders {
            id: "msg_1",
            timestamp: &NOW.to_string(),
            signature: &signature,
        };
        assert_eq!(
            verifier().verify_at(&headers, &body, NOW + TIMESTAMP_TOLERANCE_SECS + 1),
            Err(WebhookError::StaleTimestamp)
        );
    }

    #[test]
    fn test_extreme_timestamps_are_stale() {
        let body = payment("1");
        for timestamp in [i64::MIN.to_string(), i64::MAX.to_string()] {
            let headers = WebhookHeaders {
                id: "msg_1",
                timestamp: &timestamp,
                signature: "v1,AAAA",
            };
            assert_eq!(
                verifier().verify_at(&headers, &body, NOW),
                Err(WebhookError::StaleTimestamp)
            );
        }
    }

    #[test]
    fn test_missing_headers() {
        let headers = WebhookHeaders {
            id: "",
            timestamp: "1",
            signature: "v1,x",
        };
        assert_eq!(
            verifier().verify_at(&headers, b"{}", 1),
            Err(WebhookError::MissingHeader("webhook-id"))
        );
    }

    #[test]
    fn test_invalid_secret() {
        assert_eq!(
            WebhookVerifier::new("whsec_not base64!").unwrap_err(),
            WebhookError::InvalidSecret
        );
    }

    #[test]
    fn test_top_up_credits() {
        let event = parse_event(&payment("\"3\"")).unwrap();
        assert_eq!(
            event,
            BillingEvent::TopUp {
                email: "ada@example.com".to_string(),
                quantity: 3
            }
        );
        assert_eq!(event.credits(), Some(15));
    }

    #[test]
    fn test_other_events_ignored() {
        let event = parse_event(br#"{"type":"subscription.active","data":{}}"#).unwrap();
        assert_eq!(event.credits(), Some(0));
        assert!(matches!(event, BillingEvent::Other { .. }));
    }

    #[test]
    fn test_bad_quantity_rejected() {
        assert!(matches!(
            parse_event(&payment("\"lots\"")),
            Err(WebhookError::BadPayload(_))
        ));
        assert!(parse_event(&payment("0")).is_err());
    }

    #[test]
    fn test_oversized_quantity_rejected() {
        assert!(matches!(
            parse_event(&payment("\"999999999\"")),
            Err(WebhookError::BadPayload(_))
        ));

        let largest = i32::MAX / CREDITS_PER_UNIT;
        let event = parse_event(&payment(&largest.to_string())).unwrap();
        assert_eq!(event.credits(), Some(largest * CREDITS_PER_UNIT));
    }
}
