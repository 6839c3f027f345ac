//! Axum route handlers for reading plan records.
//!
//! All of these are pure reads; polling never advances the state machine.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::checkout::validation::is_valid_cpf;
use crate::errors::AppError;
use crate::models::form::digits_only;
use crate::models::plan::{PlanRow, PlanSummary};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct PlanListResponse {
    pub plans: Vec<PlanSummary>,
}

/// GET /api/plans/:id
pub async fn handle_get_plan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PlanRow>, AppError> {
    let plan = state
        .store
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Plan {id} not found")))?;
    Ok(Json(plan))
}

/// GET /api/plans/billing/:reference
///
/// Used by the payment return page, which only knows the provider's reference.
pub async fn handle_get_plan_by_billing(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<PlanRow>, AppError> {
    let plan = state
        .store
        .find_by_billing_reference(&reference)
        .await?
        .ok_or_else(|| AppError::NotFound("Plan not found".to_string()))?;
    Ok(Json(plan))
}

/// GET /api/plans/cpf/:cpf
///
/// Lists a person's generated and in-flight plans. Rate limited per client IP
/// because it lets anyone probe CPFs.
pub async fn handle_list_by_cpf(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(cpf): Path<String>,
) -> Result<Json<PlanListResponse>, AppError> {
    let ip = client_ip(&headers);
    if !state.rate_limiter.allow(&ip).await {
        debug!(ip = %ip, "CPF lookup rate limited");
        return Err(AppError::TooManyRequests);
    }

    let cpf = digits_only(&cpf);
    if !is_valid_cpf(&cpf) {
        return Err(AppError::Validation("Invalid CPF".to_string()));
    }

    let plans = state.store.list_by_tax_id(&cpf).await?;
    Ok(Json(PlanListResponse { plans }))
}

/// First hop of `x-forwarded-for`, then `x-real-ip`, else `"unknown"`.
fn client_ip(headers: &HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    header("x-forwarded-for")
        .and_then(|forwarded| forwarded.split(',').next())
        .map(str::trim)
        .or_else(|| header("x-real-ip"))
        .unwrap_or("unknown")
        .to_string()
}
