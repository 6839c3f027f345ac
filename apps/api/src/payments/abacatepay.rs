//! AbacatePay billing (PIX or card).
//!
//! The billing id (`data.id`) is the reference; payment is confirmed by the
//! `billing.paid` event carrying it at `data.billing.id`.

use async_trait::async_trait;
use axum::http::HeaderMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::models::plan::PaymentProviderKind;
use crate::payments::{
    ensure_success, parse_json, Charge, ChargeRequest, PaymentError, PaymentProvider, WebhookEvent,
};

const BILLING_CREATE_URL: &str = "https://api.abacatepay.com/v1/billing/create";
const PAYMENT_COMPLETED_EVENT: &str = "billing.paid";
const PRODUCT_NAME: &str = "Plano de Carreira Inteligente";
const PRODUCT_DESCRIPTION: &str = "Plano de carreira de 90 dias personalizado";

pub struct AbacatePayProvider {
    client: Client,
    api_key: String,
    product_id: String,
    price_cents: u32,
}

impl AbacatePayProvider {
    pub fn new(api_key: String, product_id: String, price_cents: u32) -> Self {
        Self {
            client: Client::new(),
            api_key,
            product_id,
            price_cents,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateBillingBody<'a> {
    frequency: &'static str,
    methods: [&'static str; 2],
    products: [Product<'a>; 1],
    return_url: &'a str,
    completion_url: &'a str,
    customer: Customer<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Product<'a> {
    external_id: &'a str,
    name: &'static str,
    description: &'static str,
    quantity: u32,
    price: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Customer<'a> {
    name: &'a str,
    email: &'a str,
    cellphone: &'a str,
    tax_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateBillingResponse {
    data: Option<Billing>,
}

#[derive(Debug, Deserialize)]
struct Billing {
    id: String,
    url: String,
}

fn decode_event(body: &[u8]) -> Result<WebhookEvent, PaymentError> {
    let event = parse_json(body)?;
    let event_type = event["event"].as_str().unwrap_or_default();

    if event_type != PAYMENT_COMPLETED_EVENT {
        return Ok(WebhookEvent::Ignored {
            event_type: event_type.to_string(),
        });
    }

    let billing_id = event["data"]["billing"]["id"]
        .as_str()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| PaymentError::MalformedPayload("data.billing.id missing".to_string()))?;

    Ok(WebhookEvent::PaymentConfirmed {
        billing_reference: billing_id.to_string(),
    })
}

#[async_trait]
impl PaymentProvider for AbacatePayProvider {
    fn kind(&self) -> PaymentProviderKind {
        PaymentProviderKind::Abacatepay
    }

    async fn create_charge(&self, request: &ChargeRequest) -> Result<Charge, PaymentError> {
        let body = CreateBillingBody {
            frequency: "ONE_TIME",
            methods: ["PIX", "CARD"],
            products: [Product {
                external_id: &self.product_id,
                name: PRODUCT_NAME,
                description: PRODUCT_DESCRIPTION,
                quantity: 1,
                price: self.price_cents,
            }],
            return_url: &request.cancel_url,
            completion_url: &request.return_url,
            customer: Customer {
                name: &request.name,
                email: &request.email,
                cellphone: request.phone.as_deref().unwrap_or_default(),
                tax_id: request.tax_id.as_deref().unwrap_or_default(),
            },
        };

        let response = self
            .client
            .post(BILLING_CREATE_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let created: CreateBillingResponse =
            ensure_success(self.kind(), response).await?.json().await?;

        let billing = created.data.ok_or_else(|| PaymentError::Api {
            provider: self.kind(),
            status: 200,
            message: "billing response has no data".to_string(),
        })?;

        Ok(Charge {
            reference: billing.id,
            url: billing.url,
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
    fn test_billing_paid_yields_billing_id() {
        let body = br#"{"event": "billing.paid", "data": {"billing": {"id": "bill_123"}}}"#;
        assert_eq!(
            decode_event(body).unwrap(),
            WebhookEvent::PaymentConfirmed {
                billing_reference: "bill_123".to_string()
            }
        );
    }

    #[test]
    fn test_other_events_are_ignored() {
        let body = br#"{"event": "billing.created", "data": {"billing": {"id": "bill_123"}}}"#;
        assert_eq!(
            decode_event(body).unwrap(),
            WebhookEvent::Ignored {
                event_type: "billing.created".to_string()
            }
        );
    }

    #[test]
    fn test_missing_event_field_is_ignored() {
        assert!(matches!(
            decode_event(b"{}").unwrap(),
            WebhookEvent::Ignored { .. }
        ));
    }

    #[test]
    fn test_missing_billing_id_is_malformed() {
        let body = br#"{"event": "billing.paid", "data": {}}"#;
        assert!(decode_event(body).is_err());
    }
}
