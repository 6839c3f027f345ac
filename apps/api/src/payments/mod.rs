//! Payment providers.
//!
//! Each provider implements [`PaymentProvider`]: it creates the external charge
//! at checkout time and translates its own webhook payload into a normalized
//! [`WebhookEvent`]. Everything after that (record lookup, idempotency,
//! generation) is provider-agnostic and lives in [`webhooks`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use thiserror::Error;
use uuid::Uuid;

use crate::models::plan::PaymentProviderKind;

pub mod abacatepay;
pub mod stripe;
pub mod webhooks;
pub mod woovi;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} API error (status {status}): {message}")]
    Api {
        provider: PaymentProviderKind,
        status: u16,
        message: String,
    },

    #[error("payment provider '{0}' is not configured")]
    NotConfigured(PaymentProviderKind),

    #[error("invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// What checkout needs to open a charge for a freshly inserted record.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub plan_id: Uuid,
    pub name: String,
    pub email: String,
    pub tax_id: Option<String>,
    pub phone: Option<String>,
    /// Where the provider sends the buyer after paying.
    pub return_url: String,
    /// Where the provider sends the buyer after giving up.
    pub cancel_url: String,
}

/// The provider's side of a charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Charge {
    /// Becomes the record's `billing_reference`; webhooks resolve records by it.
    pub reference: String,
    /// Hosted payment page.
    pub url: String,
}

/// A webhook payload reduced to the only thing the workflow cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    PaymentConfirmed { billing_reference: String },
    Ignored { event_type: String },
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn kind(&self) -> PaymentProviderKind;

    async fn create_charge(&self, request: &ChargeRequest) -> Result<Charge, PaymentError>;

    /// Authenticates (where the provider signs its calls) and decodes a raw webhook body.
    fn parse_webhook(&self, headers: &HeaderMap, body: &[u8]) -> Result<WebhookEvent, PaymentError>;
}

/// The set of providers enabled by configuration.
#[derive(Clone, Default)]
pub struct PaymentProviders {
    providers: HashMap<PaymentProviderKind, Arc<dyn PaymentProvider>>,
}

impl PaymentProviders {
    pub fn register(&mut self, provider: Arc<dyn PaymentProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    pub fn get(&self, kind: PaymentProviderKind) -> Result<Arc<dyn PaymentProvider>, PaymentError> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or(PaymentError::NotConfigured(kind))
    }

    pub fn enabled(&self) -> Vec<PaymentProviderKind> {
        let mut kinds: Vec<_> = self.providers.keys().copied().collect();
        kinds.sort_by_key(|kind| kind.to_string());
        kinds
    }
}

/// Converts a non-2xx response into `PaymentError::Api`.
pub(crate) async fn ensure_success(
    provider: PaymentProviderKind,
    response: reqwest::Response,
) -> Result<reqwest::Response, PaymentError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(PaymentError::Api {
        provider,
        status: status.as_u16(),
        message,
    })
}

/// Reads a JSON body, mapping decode failures to `MalformedPayload`.
pub(crate) fn parse_json(body: &[u8]) -> Result<serde_json::Value, PaymentError> {
    serde_json::from_slice(body).map_err(|e| PaymentError::MalformedPayload(e.to_string()))
}
