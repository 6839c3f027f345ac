//! Axum route handlers for on-demand delivery: PDF download, Notion export and
//! the development email trigger.

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Redirect},
    Json,
};
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::delivery::email::plan_ready_email;
use crate::delivery::notion::NotionClient;
use crate::errors::AppError;
use crate::models::generated::GeneratedPlan;
use crate::models::plan::PlanRow;
use crate::state::AppState;

/// Loads a record that has finished generating, or 404.
async fn load_generated(state: &AppState, id: Uuid) -> Result<(PlanRow, GeneratedPlan), AppError> {
    let row = state
        .store
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Plan {id} not found")))?;
    let plan = row
        .generated()
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("Plan {id} has not been generated yet")))?;
    Ok((row, plan))
}

fn notion_client(state: &AppState) -> Result<&NotionClient, AppError> {
    state
        .notion
        .as_ref()
        .ok_or_else(|| AppError::NotFound("Notion integration is not enabled".to_string()))
}

/// `PlanoCarreira-Mariana.pdf`; non-ASCII letters are dropped from the header value.
fn pdf_filename(row: &PlanRow) -> String {
    let name: String = row
        .first_name()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    if name.is_empty() {
        "PlanoCarreira.pdf".to_string()
    } else {
        format!("PlanoCarreira-{name}.pdf")
    }
}

/// GET /api/plans/:id/pdf
pub async fn handle_plan_pdf(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let (row, plan) = load_generated(&state, id).await?;
    let bytes = state.pdf.render(&row, &plan).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", pdf_filename(&row)),
            ),
        ],
        bytes,
    ))
}

#[derive(Debug, Deserialize)]
pub struct NotionAuthQuery {
    pub state: Option<String>,
}

/// GET /api/notion/auth?state=<plan id>
pub async fn handle_notion_auth(
    State(state): State<AppState>,
    Query(query): Query<NotionAuthQuery>,
) -> Result<Redirect, AppError> {
    let notion = notion_client(&state)?;
    let plan_state = query.state.unwrap_or_default();
    Ok(Redirect::temporary(&notion.authorize_url(&plan_state)))
}

#[derive(Debug, Deserialize)]
pub struct NotionCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

/// GET /api/notion/callback?code=…&state=<plan id>
///
/// Always lands the user back on the result page; the outcome travels in the
/// `notion` query parameter.
pub async fn handle_notion_callback(
    State(state): State<AppState>,
    Query(query): Query<NotionCallbackQuery>,
) -> Result<Redirect, AppError> {
    let notion = notion_client(&state)?;
    let plan_state = query.state.unwrap_or_default();
    let result_page = format!("{}/resultado/{}", state.config.public_base_url, plan_state);

    let params: Vec<(&str, String)> = match query.code.filter(|c| !c.is_empty()) {
        None => vec![("notion", "erro".to_string())],
        Some(code) => match notion.exchange_code(&code).await {
            Ok(token) => vec![("notion", "criando".to_string()), ("notionToken", token)],
            Err(e) => {
                warn!(state = %plan_state, "Notion token exchange failed: {e}");
                vec![("notion", "erro".to_string())]
            }
        },
    };

    let target = Url::parse_with_params(&result_page, &params)
        .map(String::from)
        .unwrap_or(result_page);
    Ok(Redirect::temporary(&target))
}

#[derive(Debug, Deserialize)]
pub struct NotionExportRequest {
    pub token: String,
    pub plan_id: Uuid,
}

/// POST /api/notion/export
pub async fn handle_notion_export(
    State(state): State<AppState>,
    Json(request): Json<NotionExportRequest>,
) -> Result<Json<Value>, AppError> {
    let notion = notion_client(&state)?;
    if request.token.trim().is_empty() {
        return Err(AppError::Validation("token is required".to_string()));
    }
    let (row, plan) = load_generated(&state, request.plan_id).await?;

    let url = notion.export(&request.token, &row, &plan).await?;
    state.store.set_workspace_url(row.id, &url).await?;

    Ok(Json(json!({ "success": true, "url": url })))
}

#[derive(Debug, Deserialize)]
pub struct TestEmailQuery {
    pub plan_id: Option<Uuid>,
}

/// POST /api/dev/test-email?plan_id=…
///
/// Development only. Sends the ready notification synchronously so failures
/// surface in the response.
pub async fn handle_test_email(
    State(state): State<AppState>,
    Query(query): Query<TestEmailQuery>,
) -> Result<Json<Value>, AppError> {
    if state.config.is_production() {
        return Err(AppError::Forbidden("Not available in production".to_string()));
    }
    let plan_id = query
        .plan_id
        .ok_or_else(|| AppError::Validation("plan_id is required".to_string()))?;
    let (row, plan) = load_generated(&state, plan_id).await?;

    let message = plan_ready_email(&row, &plan, &state.config.result_url(row.id));
    state.email.send(&message).await?;
    info!(plan_id = %row.id, "Test email sent");

    Ok(Json(json!({ "message": "Email sent", "to": row.email })))
}
