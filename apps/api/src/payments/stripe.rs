//! Stripe Checkout (card payments).
//!
//! Charge = Checkout Session; the session id is the billing reference.
//! Webhooks are signed: `Stripe-Signature: t=<unix>,v1=<hex hmac>` where the
//! HMAC-SHA256 covers `"<t>.<raw body>"` under the endpoint secret.

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;

use crate::models::plan::PaymentProviderKind;
use crate::payments::{
    ensure_success, parse_json, Charge, ChargeRequest, PaymentError, PaymentProvider, WebhookEvent,
};

type HmacSha256 = Hmac<Sha256>;

const CHECKOUT_SESSIONS_URL: &str = "https://api.stripe.com/v1/checkout/sessions";
const SIGNATURE_HEADER: &str = "stripe-signature";
const PAYMENT_COMPLETED_EVENT: &str = "checkout.session.completed";
/// Signed timestamps older (or newer) than this are rejected as replays.
const SIGNATURE_TOLERANCE_SECS: u64 = 300;

pub struct StripeProvider {
    client: Client,
    secret_key: String,
    webhook_secret: String,
    price_id: String,
}

#[derive(Debug, Deserialize)]
struct CheckoutSession {
    id: String,
    url: Option<String>,
}

impl StripeProvider {
    pub fn new(secret_key: String, webhook_secret: String, price_id: String) -> Self {
        Self {
            client: Client::new(),
            secret_key,
            webhook_secret,
            price_id,
        }
    }

    /// Checks a `Stripe-Signature` header against the raw body.
    pub fn verify_signature(&self, payload: &[u8], header: &str) -> Result<(), PaymentError> {
        verify_signature_at(
            &self.webhook_secret,
            payload,
            header,
            Utc::now().timestamp(),
        )
    }
}

fn verify_signature_at(
    secret: &str,
    payload: &[u8],
    header: &str,
    now: i64,
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
        timestamp.ok_or_else(|| PaymentError::InvalidSignature("missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(PaymentError::InvalidSignature(
            "missing v1 signature".to_string(),
        ));
    }

    let signed_at: i64 = timestamp
        .parse()
        .map_err(|_| PaymentError::InvalidSignature("malformed timestamp".to_string()))?;
    if now.abs_diff(signed_at) > SIGNATURE_TOLERANCE_SECS {
        return Err(PaymentError::InvalidSignature(
            "timestamp outside tolerance".to_string(),
        ));
    }

    for signature in signatures {
        let Ok(expected) = hex::decode(signature) else {
            continue;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| PaymentError::InvalidSignature(e.to_string()))?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        // verify_slice compares in constant time
        if mac.verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }

    Err(PaymentError::InvalidSignature(
        "no matching signature".to_string(),
    ))
}

/// Decodes an already-authenticated event body.
fn decode_event(body: &[u8]) -> Result<WebhookEvent, PaymentError> {
    let event = parse_json(body)?;
    let event_type = event["type"].as_str().unwrap_or_default();

    if event_type != PAYMENT_COMPLETED_EVENT {
        return Ok(WebhookEvent::Ignored {
            event_type: event_type.to_string(),
        });
    }

    let session_id = event["data"]["object"]["id"]
        .as_str()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| PaymentError::MalformedPayload("data.object.id missing".to_string()))?;

    Ok(WebhookEvent::PaymentConfirmed {
        billing_reference: session_id.to_string(),
    })
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    fn kind(&self) -> PaymentProviderKind {
        PaymentProviderKind::Stripe
    }

    async fn create_charge(&self, request: &ChargeRequest) -> Result<Charge, PaymentError> {
        let plan_id = request.plan_id.to_string();
        let params = [
            ("mode", "payment"),
            ("payment_method_types[0]", "card"),
            ("line_items[0][price]", self.price_id.as_str()),
            ("line_items[0][quantity]", "1"),
            ("success_url", request.return_url.as_str()),
            ("cancel_url", request.cancel_url.as_str()),
            ("customer_email", request.email.as_str()),
            ("client_reference_id", plan_id.as_str()),
            ("metadata[plan_id]", plan_id.as_str()),
        ];

        let response = self
            .client
            .post(CHECKOUT_SESSIONS_URL)
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&params)
            .send()
            .await?;
        let session: CheckoutSession = ensure_success(self.kind(), response).await?.json().await?;

        debug!(plan_id = %request.plan_id, session_id = %session.id, "Stripe checkout session created");

        let url = session.url.ok_or_else(|| PaymentError::Api {
            provider: self.kind(),
            status: 200,
            message: "checkout session has no url".to_string(),
        })?;

        Ok(Charge {
            reference: session.id,
            url,
        })
    }

    fn parse_webhook(&self, headers: &HeaderMap, body: &[u8]) -> Result<WebhookEvent, PaymentError> {
        let header = headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| PaymentError::InvalidSignature("missing Stripe-Signature".to_string()))?;
        self.verify_signature(body, header)?;
        decode_event(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "whsec_test123secret456";
    const NOW: i64 = 1_700_000_000;

    fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{timestamp}.").as_bytes());
        mac.update(payload);
        format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn completed_event(session_id: &str) -> Vec<u8> {
        serde_json::json!({
            "type": "checkout.session.completed",
            "data": { "object": { "id": session_id } }
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn test_valid_signature_is_accepted() {
        let payload = completed_event("cs_test_1");
        let header = sign(&payload, SECRET, NOW);
        assert!(verify_signature_at(SECRET, &payload, &header, NOW + 10).is_ok());
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let payload = completed_event("cs_test_1");
        let header = sign(&payload, "wrong_secret", NOW);
        assert!(matches!(
            verify_signature_at(SECRET, &payload, &header, NOW),
            Err(PaymentError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let header = sign(&completed_event("cs_test_1"), SECRET, NOW);
        let tampered = completed_event("cs_test_2");
        assert!(verify_signature_at(SECRET, &tampered, &header, NOW).is_err());
    }

    #[test]
    fn test_old_timestamp_is_rejected() {
        let payload = completed_event("cs_test_1");
        let header = sign(&payload, SECRET, NOW - 600);
        assert!(verify_signature_at(SECRET, &payload, &header, NOW).is_err());
    }

    #[test]
    fn test_extreme_timestamps_are_rejected() {
        let payload = completed_event("cs_test_1");
        for timestamp in [i64::MIN, i64::MAX] {
            let header = sign(&payload, SECRET, timestamp);
            assert!(matches!(
                verify_signature_at(SECRET, &payload, &header, NOW),
                Err(PaymentError::InvalidSignature(_))
            ));
        }
    }

    #[test]
    fn test_malformed_headers_are_rejected() {
        let payload = completed_event("cs_test_1");
        for header in ["", "garbage", "v1=abcdef", "t=1700000000"] {
            assert!(
                verify_signature_at(SECRET, &payload, header, NOW).is_err(),
                "header {header:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_any_matching_v1_is_enough() {
        let payload = completed_event("cs_test_1");
        let valid = sign(&payload, SECRET, NOW);
        let header = format!("{valid},v1=deadbeef");
        assert!(verify_signature_at(SECRET, &payload, &header, NOW).is_ok());
    }

    #[test]
    fn test_completed_event_yields_session_id() {
        let event = decode_event(&completed_event("cs_test_42")).unwrap();
        assert_eq!(
            event,
            WebhookEvent::PaymentConfirmed {
                billing_reference: "cs_test_42".to_string()
            }
        );
    }

    #[test]
    fn test_other_event_types_are_ignored() {
        let body = br#"{"type": "payment_intent.created", "data": {"object": {"id": "pi_1"}}}"#;
        assert_eq!(
            decode_event(body).unwrap(),
            WebhookEvent::Ignored {
                event_type: "payment_intent.created".to_string()
            }
        );
    }

    #[test]
    fn test_parse_webhook_requires_signature_header() {
        let provider = StripeProvider::new("sk".into(), SECRET.into(), "price".into());
        let result = provider.parse_webhook(&HeaderMap::new(), &completed_event("cs_1"));
        assert!(matches!(result, Err(PaymentError::InvalidSignature(_))));
    }

    #[test]
    fn test_parse_webhook_with_fresh_signature() {
        let provider = StripeProvider::new("sk".into(), SECRET.into(), "price".into());
        let payload = completed_event("cs_live_7");
        let mut headers = HeaderMap::new();
        let header = sign(&payload, SECRET, Utc::now().timestamp());
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&header).unwrap());

        let event = provider.parse_webhook(&headers, &payload).unwrap();
        assert_eq!(
            event,
            WebhookEvent::PaymentConfirmed {
                billing_reference: "cs_live_7".to_string()
            }
        );
    }
}
