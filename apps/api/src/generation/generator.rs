//! Plan generation. Owns the record's lifecycle from confirmed payment to a
//! terminal `generated` / `error` state.
//!
//! Flow: load record → idempotency guard → (error → pending) →
//!       claim (→ generating) → sanitize → prompt → LLM →
//!       parse, or one repair round-trip → persist → fire-and-forget email.
//!
//! Any failure after the claim leaves the record in `error`, never in
//! `generating`. `error` is retried by the next confirmed-payment signal.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::delivery::email::{dispatch_plan_ready, plan_ready_email, EmailSender};
use crate::errors::AppError;
use crate::generation::prompts::{PLAN_PROMPT_TEMPLATE, PLAN_SYSTEM, REPAIR_PROMPT_TEMPLATE};
use crate::generation::sanitizer::sanitize_form;
use crate::llm_client::prompts::{JSON_ONLY_SYSTEM, UNTRUSTED_INPUT_INSTRUCTION};
use crate::llm_client::{extract_json_object, strip_json_fences, InferenceProvider};
use crate::models::form::FormData;
use crate::models::generated::GeneratedPlan;
use crate::models::plan::{PlanRow, PlanStatus};
use crate::store::PlanStore;

/// What a call to [`PlanGenerator::generate`] did. Every variant is a success
/// from the caller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// This call produced and committed the plan.
    Generated,
    /// The record was already generated; nothing was done.
    AlreadyGenerated,
    /// Another call holds the record in `generating`; nothing was done.
    InFlight,
}

pub struct PlanGenerator {
    store: Arc<dyn PlanStore>,
    llm: Arc<dyn InferenceProvider>,
    email: Arc<dyn EmailSender>,
    public_base_url: String,
    /// Upper bound on inference plus repair; kept below the watchdog timeout
    /// so a running generation is never lapsed to `error`.
    deadline: Duration,
}

impl PlanGenerator {
    pub fn new(
        store: Arc<dyn PlanStore>,
        llm: Arc<dyn InferenceProvider>,
        email: Arc<dyn EmailSender>,
        public_base_url: String,
        deadline: Duration,
    ) -> Self {
        Self {
            store,
            llm,
            email,
            public_base_url,
            deadline,
        }
    }

    /// Runs generation for a record. Safe to call repeatedly for the same id.
    pub async fn generate(&self, plan_id: Uuid) -> Result<GenerationOutcome, AppError> {
        let plan = self
            .store
            .find_by_id(plan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Plan {plan_id} not found")))?;

        match plan.status {
            PlanStatus::Generated => {
                info!(plan_id = %plan_id, "Plan already generated, skipping");
                return Ok(GenerationOutcome::AlreadyGenerated);
            }
            PlanStatus::Generating => {
                info!(plan_id = %plan_id, "Plan generation already in flight, skipping");
                return Ok(GenerationOutcome::InFlight);
            }
            PlanStatus::Error => {
                self.store.reset_for_retry(plan_id).await?;
                info!(plan_id = %plan_id, "Retrying generation for errored plan");
            }
            PlanStatus::AwaitingPayment | PlanStatus::Pending => {}
        }

        if !self.store.claim_generation(plan_id).await? {
            info!(plan_id = %plan_id, "Plan claimed by a concurrent call, skipping");
            return Ok(GenerationOutcome::InFlight);
        }

        let produced = tokio::time::timeout(self.deadline, self.produce_plan(&plan.form_data.0))
            .await
            .unwrap_or_else(|_| {
                Err(AppError::Generation(format!(
                    "generation exceeded {}s",
                    self.deadline.as_secs()
                )))
            });
        let generated = match produced {
            Ok(generated) => generated,
            Err(e) => {
                self.record_failure(plan_id).await;
                return Err(e);
            }
        };

        match self.store.complete_generation(plan_id, &generated).await {
            Ok(true) => {}
            Ok(false) => {
                info!(plan_id = %plan_id, "Plan was committed by a concurrent call");
                return Ok(GenerationOutcome::AlreadyGenerated);
            }
            Err(e) => {
                self.record_failure(plan_id).await;
                return Err(e.into());
            }
        }

        info!(
            plan_id = %plan_id,
            gaps = generated.priority_gaps.len(),
            skills = generated.skills_to_develop.len(),
            "Plan generated and saved"
        );

        self.dispatch_email(&plan, &generated);

        Ok(GenerationOutcome::Generated)
    }

    /// Sanitizes the form, calls the model and parses the reply, with at most
    /// one repair round-trip for malformed JSON.
    async fn produce_plan(&self, form: &FormData) -> Result<GeneratedPlan, AppError> {
        let prompt = build_plan_prompt(&sanitize_form(form));

        let reply = self.llm.complete(&prompt, PLAN_SYSTEM).await?;

        let first_error = match parse_plan(&reply) {
            Ok(plan) => return Ok(plan),
            Err(e) => e,
        };

        warn!("Plan JSON malformed on first attempt ({first_error}), requesting repair");

        let repair_prompt = REPAIR_PROMPT_TEMPLATE.replace("{malformed}", clean_reply(&reply));
        let repaired = self.llm.complete(&repair_prompt, JSON_ONLY_SYSTEM).await?;

        parse_plan(&repaired).map_err(|e| {
            AppError::Generation(format!("Plan JSON still invalid after repair: {e}"))
        })
    }

    async fn record_failure(&self, plan_id: Uuid) {
        if let Err(e) = self.store.fail_generation(plan_id).await {
            error!(plan_id = %plan_id, "Failed to mark plan as errored: {e:?}");
        }
    }

    fn dispatch_email(&self, plan: &PlanRow, generated: &GeneratedPlan) {
        let link = format!("{}/resultado/{}", self.public_base_url, plan.id);
        let message = plan_ready_email(plan, generated, &link);
        dispatch_plan_ready(self.email.clone(), message, plan.id);
    }
}

/// Strips fences and surrounding commentary, then parses against the plan schema.
pub fn parse_plan(reply: &str) -> Result<GeneratedPlan, serde_json::Error> {
    serde_json::from_str(clean_reply(reply))
}

fn clean_reply(reply: &str) -> &str {
    extract_json_object(strip_json_fences(reply))
}

/// Fills the plan template with already-sanitized form values.
pub fn build_plan_prompt(form: &FormData) -> String {
    let learning_preferences = if form.learning_preferences.is_empty() {
        "Não informado".to_string()
    } else {
        form.learning_preferences.join(", ")
    };

    render_template(
        PLAN_PROMPT_TEMPLATE,
        &[
            ("untrusted_instruction", UNTRUSTED_INPUT_INSTRUCTION),
            ("current_role", or_default(&form.current_role, "Não informado")),
            ("target_role", or_default(&form.target_role, "Não informado")),
            ("timeframe", or_default(&form.timeframe, "Não informado")),
            ("area", or_default(&form.area, "Não informado")),
            ("current_salary", or_default(&form.current_salary, "Não informado")),
            ("experience_time", or_default(&form.experience_time, "Não informado")),
            ("target_salary", or_default(&form.target_salary, "Não informado")),
            ("motivation", or_default(&form.motivation, "Não informado")),
            ("skills", or_default(&form.skills, "Não informado")),
            ("gaps", or_default(&form.gaps, "Não informado")),
            ("interview_history", or_default(&form.interview_history, "Não informado")),
            ("weekly_availability", or_default(&form.weekly_availability, "Não informado")),
            ("learning_preferences", learning_preferences.as_str()),
            ("additional_context", or_default(&form.additional_context, "Nenhum")),
        ],
    )
}

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.trim().is_empty() {
        default
    } else {
        value
    }
}

/// Single-pass `{key}` substitution. Substituted values are never rescanned,
/// so user text containing `{target_role}` stays literal.
fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len() + 2048);
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let matched = vars
            .iter()
            .find(|(key, _)| after.starts_with(key) && after[key.len()..].starts_with('}'));
        match matched {
            Some((key, value)) => {
                out.push_str(value);
                rest = &after[key.len() + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
