//! "Your plan is ready" email.
//!
//! Dispatch is fire-and-forget: `dispatch_plan_ready` spawns a detached task,
//! logs the outcome and never retries.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::delivery::{ensure_success, DeliveryError};
use crate::models::generated::GeneratedPlan;
use crate::models::plan::PlanRow;

const RESEND_API_URL: &str = "https://api.resend.com/emails";
const SUMMARY_PREVIEW_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), DeliveryError>;
}

/// Sends through the Resend HTTP API.
pub struct ResendEmailSender {
    client: Client,
    api_key: String,
    from: String,
}

impl ResendEmailSender {
    pub fn new(api_key: String, from: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            from,
        }
    }
}

#[derive(Serialize)]
struct ResendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

#[async_trait]
impl EmailSender for ResendEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(RESEND_API_URL)
            .bearer_auth(&self.api_key)
            .json(&ResendRequest {
                from: &self.from,
                to: &message.to,
                subject: &message.subject,
                html: &message.html,
            })
            .send()
            .await?;
        ensure_success("Resend", response).await?;
        Ok(())
    }
}

/// Used when no email API key is configured.
pub struct DisabledEmailSender;

#[async_trait]
impl EmailSender for DisabledEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
        warn!(to = %message.to, "RESEND_API_KEY not configured, email not sent");
        Err(DeliveryError::NotConfigured("Email"))
    }
}

/// Spawns a detached send. The returned handle may be dropped.
pub fn dispatch_plan_ready(
    sender: Arc<dyn EmailSender>,
    message: EmailMessage,
    plan_id: Uuid,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match sender.send(&message).await {
            Ok(()) => info!(plan_id = %plan_id, to = %message.to, "Plan email sent"),
            Err(e) => error!(plan_id = %plan_id, "Plan email failed (not retried): {e}"),
        }
    })
}

/// Builds the notification for a generated plan.
pub fn plan_ready_email(row: &PlanRow, plan: &GeneratedPlan, link: &str) -> EmailMessage {
    let first_name = escape_html(row.first_name());
    let current = escape_html(row.role_current.as_deref().unwrap_or("Cargo atual"));
    let target = escape_html(row.role_target.as_deref().unwrap_or("Cargo objetivo"));
    let summary = escape_html(&preview(&plan.executive_summary, SUMMARY_PREVIEW_CHARS));
    let link = escape_html(link);

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="margin:0;padding:0;background:#f5f5f5;font-family:Arial,Helvetica,sans-serif;">
  <div style="max-width:600px;margin:20px auto;background:#ffffff;border-radius:12px;overflow:hidden;">
    <div style="background:#4f46e5;padding:32px;text-align:center;">
      <p style="color:#e0e7ff;margin:0;font-size:16px;">Seu plano de carreira de 90 dias está pronto</p>
    </div>
    <div style="padding:32px;">
      <h2 style="color:#1a1a1a;margin:0 0 16px;">Olá, {first_name}!</h2>
      <p style="color:#4a4a4a;line-height:1.6;margin:0 0 16px;">
        <strong>{current}</strong> → <strong style="color:#4f46e5;">{target}</strong>
      </p>
      <h3 style="color:#1a1a1a;margin:0 0 12px;font-size:16px;">Resumo executivo</h3>
      <p style="color:#4a4a4a;line-height:1.6;margin:0 0 24px;font-size:14px;">{summary}</p>
      <div style="text-align:center;margin:32px 0;">
        <a href="{link}" style="display:inline-block;background:#4f46e5;color:#ffffff;text-decoration:none;padding:14px 32px;border-radius:8px;font-weight:bold;">
          Ver meu plano completo
        </a>
      </div>
    </div>
  </div>
</body>
</html>"#
    );

    EmailMessage {
        to: row.email.clone(),
        subject: format!("{}, seu Plano de Carreira está pronto!", row.first_name()),
        html,
    }
}

/// First `max_chars` characters, with an ellipsis when cut.
fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
