//! Axum route handler for checkout.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::checkout::validation::validate_form;
use crate::errors::AppError;
use crate::models::form::FormData;
use crate::models::plan::{NewPlan, PaymentProviderKind};
use crate::payments::ChargeRequest;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub provider: PaymentProviderKind,
    pub form: FormData,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub plan_id: Uuid,
    pub billing_reference: String,
    pub url: String,
}

/// POST /api/checkout
///
/// Validates the form, stores an `awaiting_payment` record and opens a charge
/// with the chosen provider. If the charge cannot be created the record is
/// removed again, so no orphan waits for a payment that cannot happen.
pub async fn handle_checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let form = validate_form(request.form)?;
    let provider = state
        .payments
        .get(request.provider)
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let plan = state
        .store
        .insert(NewPlan::from_form(form, request.provider))
        .await?;

    let charge_request = ChargeRequest {
        plan_id: plan.id,
        name: plan.name.clone(),
        email: plan.email.clone(),
        tax_id: plan.tax_id.clone(),
        phone: plan.phone.clone(),
        return_url: format!("{}/gerando?planId={}", state.config.public_base_url, plan.id),
        cancel_url: format!("{}/checkout?cancelado=1", state.config.public_base_url),
    };

    let charge = match provider.create_charge(&charge_request).await {
        Ok(charge) => charge,
        Err(e) => {
            error!(plan_id = %plan.id, provider = %request.provider, "Charge creation failed: {e}");
            remove_unpayable(&state, plan.id).await;
            return Err(e.into());
        }
    };

    // A record still holding its placeholder can never be matched by a webhook.
    if let Err(e) = state
        .store
        .assign_billing_reference(plan.id, &charge.reference)
        .await
    {
        error!(
            plan_id = %plan.id,
            billing_reference = %charge.reference,
            "Failed to record billing reference: {e:?}"
        );
        remove_unpayable(&state, plan.id).await;
        return Err(e.into());
    }

    info!(
        plan_id = %plan.id,
        provider = %request.provider,
        billing_reference = %charge.reference,
        "Checkout created"
    );

    Ok(Json(CheckoutResponse {
        plan_id: plan.id,
        billing_reference: charge.reference,
        url: charge.url,
    }))
}

async fn remove_unpayable(state: &AppState, plan_id: Uuid) {
    if let Err(e) = state.store.delete(plan_id).await {
        error!(plan_id = %plan_id, "Failed to remove record after checkout failure: {e:?}");
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::models::plan::PlanStatus;
    use crate::routes::build_router;
    use crate::test_support::{read_json, sample_form, test_app};

    fn checkout_request(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/checkout")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_checkout_creates_record_with_provider_reference() {
        let app = test_app(vec![]);
        let mut form = sample_form();
        form.tax_id = "529.982.247-25".to_string();

        let response = build_router(app.state.clone())
            .oneshot(checkout_request(json!({ "provider": "woovi", "form": form })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        let plan_id: uuid::Uuid = body["plan_id"].as_str().unwrap().parse().unwrap();
        assert_eq!(body["billing_reference"], format!("fake_{plan_id}"));
        assert_eq!(body["url"], format!("https://pay.example.com/{plan_id}"));

        let stored = app.store.get(plan_id).unwrap();
        assert_eq!(stored.status, PlanStatus::AwaitingPayment);
        assert_eq!(stored.billing_reference, format!("fake_{plan_id}"));
        assert_eq!(stored.tax_id.as_deref(), Some("52998224725"));

        let requests = app.payment.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].return_url.ends_with(&format!("/gerando?planId={plan_id}")));
    }

    #[tokio::test]
    async fn test_charge_failure_removes_record() {
        let app = test_app(vec![]);
        app.payment.set_failing(true);

        let response = build_router(app.state.clone())
            .oneshot(checkout_request(
                json!({ "provider": "woovi", "form": sample_form() }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(app.store.len(), 0);
    }

    #[tokio::test]
    async fn test_reference_assignment_failure_removes_record() {
        let app = test_app(vec![]);
        app.store.set_rejecting_references(true);

        let response = build_router(app.state.clone())
            .oneshot(checkout_request(
                json!({ "provider": "woovi", "form": sample_form() }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(app.payment.requests().len(), 1);
        assert_eq!(app.store.len(), 0);
    }

    #[tokio::test]
    async fn test_invalid_form_creates_nothing() {
        let app = test_app(vec![]);
        let mut form = sample_form();
        form.tax_id = "111.111.111-11".to_string();

        let response = build_router(app.state.clone())
            .oneshot(checkout_request(json!({ "provider": "woovi", "form": form })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(app.store.mutation_count(), 0);
        assert!(app.payment.requests().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_provider_creates_nothing() {
        let app = test_app(vec![]);

        let response = build_router(app.state.clone())
            .oneshot(checkout_request(
                json!({ "provider": "stripe", "form": sample_form() }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(app.store.mutation_count(), 0);
    }
}
