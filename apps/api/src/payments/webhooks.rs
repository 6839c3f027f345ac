//! Provider-agnostic webhook handling.
//!
//! Every provider's webhook ends in [`confirm_payment`]. The HTTP response is
//! always `{"ok": true}` once the call is known to come from the provider:
//! failures are tracked on the record (`status = error`), not through provider
//! retries. The only rejection is a bad Stripe signature.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::errors::AppError;
use crate::generation::generator::{GenerationOutcome, PlanGenerator};
use crate::models::plan::{PaymentProviderKind, PlanStatus};
use crate::payments::{PaymentError, WebhookEvent};
use crate::state::AppState;
use crate::store::PlanStore;

/// What a confirmed-payment signal ended up doing. Logged, and echoed by the
/// development simulator; never changes the provider-facing response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Ignored,
    UnknownReference,
    AlreadyGenerated,
    InFlight,
    Generated,
    Failed,
}

/// Resolves the record for a confirmed payment and runs generation for it.
pub async fn confirm_payment(
    store: &dyn PlanStore,
    generator: &PlanGenerator,
    billing_reference: &str,
) -> Disposition {
    let plan = match store.find_by_billing_reference(billing_reference).await {
        Ok(Some(plan)) => plan,
        Ok(None) => {
            warn!(billing_reference, "Payment confirmed for unknown billing reference");
            return Disposition::UnknownReference;
        }
        Err(e) => {
            error!(billing_reference, "Failed to load plan for payment: {e:?}");
            return Disposition::Failed;
        }
    };

    if plan.status == PlanStatus::Generated {
        info!(plan_id = %plan.id, "Duplicate payment signal for generated plan");
        return Disposition::AlreadyGenerated;
    }

    if plan.status == PlanStatus::AwaitingPayment {
        match store.mark_payment_confirmed(plan.id).await {
            Ok(_) => info!(plan_id = %plan.id, "Payment confirmed"),
            Err(e) => {
                error!(plan_id = %plan.id, "Failed to record payment confirmation: {e:?}");
                return Disposition::Failed;
            }
        }
    }

    match generator.generate(plan.id).await {
        Ok(GenerationOutcome::Generated) => Disposition::Generated,
        Ok(GenerationOutcome::AlreadyGenerated) => Disposition::AlreadyGenerated,
        Ok(GenerationOutcome::InFlight) => Disposition::InFlight,
        Err(e) => {
            error!(plan_id = %plan.id, "Plan generation failed: {e}");
            Disposition::Failed
        }
    }
}

async fn dispatch_event(state: &AppState, event: WebhookEvent) -> Disposition {
    match event {
        WebhookEvent::Ignored { event_type } => {
            info!(event_type = %event_type, "Ignoring webhook event");
            Disposition::Ignored
        }
        WebhookEvent::PaymentConfirmed { billing_reference } => {
            confirm_payment(state.store.as_ref(), &state.generator, &billing_reference).await
        }
    }
}

fn acknowledged() -> Json<Value> {
    Json(json!({ "ok": true }))
}

/// POST /api/webhooks/:provider
pub async fn handle_webhook(
    State(state): State<AppState>,
    Path(kind): Path<PaymentProviderKind>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let provider = state
        .payments
        .get(kind)
        .map_err(|_| AppError::NotFound(format!("Payment provider '{kind}' is not enabled")))?;

    let event = match provider.parse_webhook(&headers, &body) {
        Ok(event) => event,
        Err(PaymentError::InvalidSignature(reason)) => {
            warn!(provider = %kind, "Rejected webhook: {reason}");
            return Err(AppError::InvalidWebhook(reason));
        }
        Err(e) => {
            warn!(provider = %kind, "Unreadable webhook acknowledged: {e}");
            return Ok(acknowledged());
        }
    };

    let disposition = dispatch_event(&state, event).await;
    info!(provider = %kind, ?disposition, "Webhook processed");

    Ok(acknowledged())
}

#[derive(Debug, Deserialize)]
pub struct SimulatePaymentQuery {
    pub billing_reference: Option<String>,
}

/// POST /api/dev/simulate-payment?billing_reference=…
///
/// Development only. Runs the same confirmed-payment path a real webhook would.
pub async fn handle_simulate_payment(
    State(state): State<AppState>,
    Query(query): Query<SimulatePaymentQuery>,
) -> Result<Json<Value>, AppError> {
    if state.config.is_production() {
        return Err(AppError::Forbidden(
            "Not available in production".to_string(),
        ));
    }

    let billing_reference = query
        .billing_reference
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| AppError::Validation("billing_reference is required".to_string()))?;

    let disposition = dispatch_event(
        &state,
        WebhookEvent::PaymentConfirmed { billing_reference },
    )
    .await;

    Ok(Json(json!({
        "message": "Payment simulated",
        "disposition": disposition,
        "result": { "ok": true },
    })))
}
