//! Woovi / OpenPix (PIX payments).
//!
//! The charge's `correlationID` is the plan id, so the billing reference equals
//! the record id. Payment is confirmed by `OPENPIX:CHARGE_COMPLETED`.

use async_trait::async_trait;
use axum::http::HeaderMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::models::plan::PaymentProviderKind;
use crate::payments::{
    ensure_success, parse_json, Charge, ChargeRequest, PaymentError, PaymentProvider, WebhookEvent,
};

const CHARGE_URL: &str = "https://api.woovi.com/api/v1/charge";
const PAYMENT_COMPLETED_EVENT: &str = "OPENPIX:CHARGE_COMPLETED";
const CHARGE_COMMENT: &str = "Plano de Carreira 90 dias";
const CHARGE_EXPIRES_IN_SECS: u32 = 3600;

pub struct WooviProvider {
    client: Client,
    api_key: String,
    charge_cents: u32,
}

impl WooviProvider {
    pub fn new(api_key: String, charge_cents: u32) -> Self {
        Self {
            client: Client::new(),
            api_key,
            charge_cents,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateChargeBody<'a> {
    #[serde(rename = "correlationID")]
    correlation_id: String,
    value: u32,
    comment: &'a str,
    customer: Customer<'a>,
    additional_info: Vec<AdditionalInfo>,
    expires_in: u32,
}

#[derive(Debug, Serialize)]
struct Customer<'a> {
    name: &'a str,
    email: &'a str,
    #[serde(rename = "taxID", skip_serializing_if = "Option::is_none")]
    tax_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct AdditionalInfo {
    key: &'static str,
    value: String,
}

#[derive(Debug, Deserialize)]
struct CreateChargeResponse {
    charge: Option<ChargeBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChargeBody {
    payment_link_url: Option<String>,
}

fn decode_event(body: &[u8]) -> Result<WebhookEvent, PaymentError> {
    let event = parse_json(body)?;
    let event_type = event["event"].as_str().unwrap_or_default();

    if event_type != PAYMENT_COMPLETED_EVENT {
        return Ok(WebhookEvent::Ignored {
            event_type: event_type.to_string(),
        });
    }

    let correlation_id = event["charge"]["correlationID"]
        .as_str()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| PaymentError::MalformedPayload("charge.correlationID missing".to_string()))?;

    Ok(WebhookEvent::PaymentConfirmed {
        billing_reference: correlation_id.to_string(),
    })
}

#[async_trait]
impl PaymentProvider for WooviProvider {
    fn kind(&self) -> PaymentProviderKind {
        PaymentProviderKind::Woovi
    }

    async fn create_charge(&self, request: &ChargeRequest) -> Result<Charge, PaymentError> {
        let correlation_id = request.plan_id.to_string();
        let body = CreateChargeBody {
            correlation_id: correlation_id.clone(),
            value: self.charge_cents,
            comment: CHARGE_COMMENT,
            customer: Customer {
                name: &request.name,
                email: &request.email,
                tax_id: request.tax_id.as_deref(),
                phone: request.phone.as_deref(),
            },
            additional_info: vec![AdditionalInfo {
                key: "planId",
                value: correlation_id.clone(),
            }],
            expires_in: CHARGE_EXPIRES_IN_SECS,
        };

        let response = self
            .client
            .post(CHARGE_URL)
            .header("Authorization", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let created: CreateChargeResponse = ensure_success(self.kind(), response).await?.json().await?;

        let url = created
            .charge
            .and_then(|charge| charge.payment_link_url)
            .ok_or_else(|| PaymentError::Api {
                provider: self.kind(),
                status: 200,
                message: "charge has no paymentLinkUrl".to_string(),
            })?;

        Ok(Charge {
            reference: correlation_id,
            url,
        })
    }

    fn parse_webhook(&self, _headers: &HeaderMap, body: &[u8]) -> Result<WebhookEvent, PaymentError> {
        decode_event(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charge_completed_yields_correlation_id() {
        let body = br#"{"event": "OPENPIX:CHARGE_COMPLETED", "charge": {"correlationID": "abc-123", "value": 2490}}"#;
        assert_eq!(
            decode_event(body).unwrap(),
            WebhookEvent::PaymentConfirmed {
                billing_reference: "abc-123".to_string()
            }
        );
    }

    #[test]
    fn test_other_events_are_ignored() {
        let body = br#"{"event": "OPENPIX:CHARGE_CREATED", "charge": {"correlationID": "abc"}}"#;
        assert!(matches!(
            decode_event(body).unwrap(),
            WebhookEvent::Ignored { .. }
        ));
    }

    #[test]
    fn test_missing_correlation_id_is_malformed() {
        let body = br#"{"event": "OPENPIX:CHARGE_COMPLETED", "charge": {}}"#;
        assert!(matches!(
            decode_event(body),
            Err(PaymentError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_charge_body_uses_woovi_field_names() {
        let body = CreateChargeBody {
            correlation_id: "id-1".to_string(),
            value: 2490,
            comment: CHARGE_COMMENT,
            customer: Customer {
                name: "Ana",
                email: "ana@example.com",
                tax_id: Some("52998224725"),
                phone: None,
            },
            additional_info: vec![],
            expires_in: CHARGE_EXPIRES_IN_SECS,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["correlationID"], "id-1");
        assert_eq!(json["expiresIn"], 3600);
        assert_eq!(json["customer"]["taxID"], "52998224725");
        assert!(json["customer"].get("phone").is_none());
    }
}
