//! Shared fixtures and test doubles for unit and router tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::response::Response;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use crate::config::Config;
use crate::delivery::email::{EmailMessage, EmailSender};
use crate::delivery::pdf::PdfRenderer;
use crate::delivery::DeliveryError;
use crate::generation::generator::PlanGenerator;
use crate::generation::watchdog::generation_deadline;
use crate::llm_client::{InferenceProvider, LlmError};
use crate::models::form::FormData;
use crate::models::generated::GeneratedPlan;
use crate::models::plan::{NewPlan, PaymentProviderKind, PlanRow, PlanStatus, PlanSummary};
use crate::payments::abacatepay::AbacatePayProvider;
use crate::payments::{
    parse_json, Charge, ChargeRequest, PaymentError, PaymentProvider, PaymentProviders,
    WebhookEvent,
};
use crate::rate_limit::InMemoryRateLimiter;
use crate::state::AppState;
use crate::store::PlanStore;

/// A reply that satisfies the generated-plan schema.
pub const VALID_PLAN_JSON: &str = r#"{
  "resumo_executivo": "Você tem base técnica sólida. A meta de 6 meses é ambiciosa mas viável. O foco deve ser modelagem estatística e visibilidade.",
  "gaps_prioritarios": [
    {"gap": "Machine learning em produção", "impacto": "Cientistas sênior entregam modelos que rodam", "solucao": "Publicar um modelo com monitoramento"}
  ],
  "plano_90_dias": {
    "mes1": {
      "foco": "Fundamentos de ML",
      "semanas": [
        {"semana": 1, "objetivo": "Revisar estatística", "acoes": ["Estudar regressão", "Resolver exercícios"], "entregavel": "Notebook com exercícios", "tempo_estimado": "6h"}
      ]
    },
    "mes2": {
      "foco": "Projeto aplicado",
      "semanas": [
        {"semana": 5, "objetivo": "Escolher problema", "acoes": ["Levantar dados"], "entregavel": "Escopo aprovado", "tempo_estimado": "5h"}
      ]
    },
    "mes3": {
      "foco": "Visibilidade",
      "semanas": [
        {"semana": 9, "objetivo": "Apresentar resultados", "acoes": ["Preparar apresentação"], "entregavel": "Apresentação para a liderança", "tempo_estimado": "4h"}
      ]
    }
  },
  "habilidades_desenvolver": [
    {"habilidade": "MLOps", "prioridade": "alta", "recursos": [{"tipo": "curso", "nome": "MLOps Zoomcamp", "link_busca": "mlops zoomcamp"}]},
    {"habilidade": "Comunicação executiva", "prioridade": "media", "recursos": []}
  ],
  "estrategia_promocao": {
    "timing_ideal": "Após entregar o projeto do mês 2",
    "argumentos": ["Modelo em produção com impacto medido", "Mentoria de dois analistas"],
    "script_conversa": "Quero conversar sobre meu próximo passo no time.",
    "alertas": ["Não comparar salários de colegas"]
  },
  "mensagem_motivacional": "Você já percorreu a parte mais difícil. Bora!"
}"#;

pub fn sample_form() -> FormData {
    FormData {
        current_role: "Analista de Dados Pleno".to_string(),
        area: "Tecnologia".to_string(),
        current_salary: "R$ 8.000".to_string(),
        experience_time: "4 anos".to_string(),
        target_role: "Cientista de Dados Sênior".to_string(),
        target_salary: "R$ 14.000".to_string(),
        timeframe: "6 meses".to_string(),
        motivation: "Quero trabalhar com modelos em produção".to_string(),
        skills: "SQL, Python, Power BI".to_string(),
        gaps: "Machine learning, MLOps".to_string(),
        interview_history: "Duas entrevistas internas no último ano".to_string(),
        weekly_availability: "6 horas".to_string(),
        name: "Mariana Souza".to_string(),
        email: "mariana@example.com".to_string(),
        tax_id: "52998224725".to_string(),
        phone: "11987654321".to_string(),
        learning_preferences: vec!["cursos online".to_string(), "projetos práticos".to_string()],
        additional_context: "Empresa está abrindo vagas de sênior".to_string(),
    }
}

pub fn sample_generated_plan() -> GeneratedPlan {
    serde_json::from_str(VALID_PLAN_JSON).expect("fixture matches the plan schema")
}

/// A stored record in the given status. Generated records carry the sample plan.
pub fn plan_row(status: PlanStatus) -> PlanRow {
    let id = Uuid::new_v4();
    let form = sample_form();
    let now = Utc::now();
    PlanRow {
        id,
        billing_reference: format!("bill_{id}"),
        email: form.email.clone(),
        name: form.name.clone(),
        tax_id: Some(form.tax_id.clone()),
        phone: Some(form.phone.clone()),
        role_current: Some(form.current_role.clone()),
        role_target: Some(form.target_role.clone()),
        form_data: Json(form),
        status,
        generated_plan: (status == PlanStatus::Generated).then(|| Json(sample_generated_plan())),
        payment_provider: PaymentProviderKind::Abacatepay,
        workspace_url: None,
        created_at: now,
        updated_at: now,
    }
}

pub async fn read_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");
    serde_json::from_slice(&bytes).expect("JSON body")
}

// ────────────────────────────────────────────────────────────────────────────
// Store
// ────────────────────────────────────────────────────────────────────────────

/// In-memory `PlanStore` with the same guarded transitions as the SQL store.
/// Records every status change so tests can assert on the exact path.
#[derive(Default)]
pub struct MemoryPlanStore {
    plans: Mutex<HashMap<Uuid, PlanRow>>,
    transitions: Mutex<Vec<(Uuid, PlanStatus)>>,
    mutations: AtomicUsize,
    reject_references: AtomicBool,
}

impl MemoryPlanStore {
    /// Inserts a row directly; not counted as a mutation.
    pub fn seed(&self, row: PlanRow) -> PlanRow {
        self.plans.lock().unwrap().insert(row.id, row.clone());
        row
    }

    pub fn get(&self, id: Uuid) -> Option<PlanRow> {
        self.plans.lock().unwrap().get(&id).cloned()
    }

    pub fn transitions_for(&self, id: Uuid) -> Vec<PlanStatus> {
        self.transitions
            .lock()
            .unwrap()
            .iter()
            .filter(|(plan_id, _)| *plan_id == id)
            .map(|(_, status)| *status)
            .collect()
    }

    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.plans.lock().unwrap().len()
    }

    /// Makes `assign_billing_reference` fail, as on a lost database connection.
    pub fn set_rejecting_references(&self, reject: bool) {
        self.reject_references.store(reject, Ordering::SeqCst);
    }

    /// Ages a record so the watchdog sees it as stale.
    pub fn backdate(&self, id: Uuid, updated_at: DateTime<Utc>) {
        if let Some(row) = self.plans.lock().unwrap().get_mut(&id) {
            row.updated_at = updated_at;
        }
    }

    /// Applies `change` when `allowed(status)` holds; returns whether it did.
    fn transition(
        &self,
        id: Uuid,
        allowed: impl Fn(PlanStatus) -> bool,
        change: impl FnOnce(&mut PlanRow),
    ) -> bool {
        let mut plans = self.plans.lock().unwrap();
        let Some(row) = plans.get_mut(&id) else {
            return false;
        };
        if !allowed(row.status) {
            return false;
        }
        change(row);
        row.updated_at = Utc::now();
        self.transitions.lock().unwrap().push((id, row.status));
        self.mutations.fetch_add(1, Ordering::SeqCst);
        true
    }
}

#[async_trait]
impl PlanStore for MemoryPlanStore {
    async fn insert(&self, plan: NewPlan) -> Result<PlanRow> {
        let mut plans = self.plans.lock().unwrap();
        if plans
            .values()
            .any(|row| row.billing_reference == plan.billing_reference)
        {
            return Err(anyhow!("duplicate billing reference"));
        }
        let now = Utc::now();
        let row = PlanRow {
            id: plan.id,
            billing_reference: plan.billing_reference,
            email: plan.email,
            name: plan.name,
            tax_id: plan.tax_id,
            phone: plan.phone,
            form_data: Json(plan.form_data),
            status: PlanStatus::AwaitingPayment,
            generated_plan: None,
            role_current: plan.role_current,
            role_target: plan.role_target,
            payment_provider: plan.payment_provider,
            workspace_url: None,
            created_at: now,
            updated_at: now,
        };
        plans.insert(row.id, row.clone());
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PlanRow>> {
        Ok(self.get(id))
    }

    async fn find_by_billing_reference(&self, reference: &str) -> Result<Option<PlanRow>> {
        Ok(self
            .plans
            .lock()
            .unwrap()
            .values()
            .find(|row| row.billing_reference == reference)
            .cloned())
    }

    async fn list_by_tax_id(&self, tax_id: &str) -> Result<Vec<PlanSummary>> {
        let plans = self.plans.lock().unwrap();
        let mut rows: Vec<&PlanRow> = plans
            .values()
            .filter(|row| row.tax_id.as_deref() == Some(tax_id))
            .filter(|row| matches!(row.status, PlanStatus::Generated | PlanStatus::Generating))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows.into_iter().map(PlanSummary::from).collect())
    }

    async fn assign_billing_reference(&self, id: Uuid, reference: &str) -> Result<()> {
        if self.reject_references.load(Ordering::SeqCst) {
            return Err(anyhow!("connection reset while assigning reference"));
        }
        let mut plans = self.plans.lock().unwrap();
        let row = plans.get_mut(&id).ok_or_else(|| anyhow!("plan {id} not found"))?;
        row.billing_reference = reference.to_string();
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.plans.lock().unwrap().remove(&id);
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn mark_payment_confirmed(&self, id: Uuid) -> Result<bool> {
        Ok(self.transition(
            id,
            |s| s == PlanStatus::AwaitingPayment,
            |row| row.status = PlanStatus::Pending,
        ))
    }

    async fn reset_for_retry(&self, id: Uuid) -> Result<bool> {
        Ok(self.transition(
            id,
            |s| s == PlanStatus::Error,
            |row| row.status = PlanStatus::Pending,
        ))
    }

    async fn claim_generation(&self, id: Uuid) -> Result<bool> {
        Ok(self.transition(
            id,
            |s| matches!(s, PlanStatus::AwaitingPayment | PlanStatus::Pending),
            |row| row.status = PlanStatus::Generating,
        ))
    }

    async fn complete_generation(&self, id: Uuid, plan: &GeneratedPlan) -> Result<bool> {
        Ok(self.transition(
            id,
            |s| s != PlanStatus::Generated,
            |row| {
                row.status = PlanStatus::Generated;
                row.generated_plan = Some(Json(plan.clone()));
            },
        ))
    }

    async fn fail_generation(&self, id: Uuid) -> Result<()> {
        self.transition(
            id,
            |s| s != PlanStatus::Generated,
            |row| {
                row.status = PlanStatus::Error;
                row.generated_plan = None;
            },
        );
        Ok(())
    }

    async fn set_workspace_url(&self, id: Uuid, url: &str) -> Result<()> {
        let mut plans = self.plans.lock().unwrap();
        let row = plans.get_mut(&id).ok_or_else(|| anyhow!("plan {id} not found"))?;
        row.workspace_url = Some(url.to_string());
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn lapse_stale_generations(&self, older_than: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let stale: Vec<Uuid> = self
            .plans
            .lock()
            .unwrap()
            .values()
            .filter(|row| row.status == PlanStatus::Generating && row.updated_at < older_than)
            .map(|row| row.id)
            .collect();
        for id in &stale {
            self.transition(
                *id,
                |s| s == PlanStatus::Generating,
                |row| row.status = PlanStatus::Error,
            );
        }
        Ok(stale)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Inference
// ────────────────────────────────────────────────────────────────────────────

/// Replays scripted replies in order, then fails with `EmptyContent`.
pub struct ScriptedLlm {
    replies: Mutex<Vec<Result<String, LlmError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new(mut replies: Vec<Result<String, LlmError>>) -> Self {
        replies.reverse();
        Self {
            replies: Mutex::new(replies),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceProvider for ScriptedLlm {
    async fn complete(&self, prompt: &str, _system: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop()
            .unwrap_or(Err(LlmError::EmptyContent))
    }
}

/// Accepts every request and answers only after an hour.
#[derive(Default)]
pub struct StalledLlm {
    calls: AtomicUsize,
}

impl StalledLlm {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceProvider for StalledLlm {
    async fn complete(&self, _prompt: &str, _system: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        Ok(VALID_PLAN_JSON.to_string())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Email
// ────────────────────────────────────────────────────────────────────────────

/// Forwards every attempted message to a channel; optionally reports failure.
pub struct RecordingEmailSender {
    outbox: UnboundedSender<EmailMessage>,
    fails: bool,
}

impl RecordingEmailSender {
    pub fn new(fails: bool) -> (Self, UnboundedReceiver<EmailMessage>) {
        let (outbox, received) = unbounded_channel();
        (Self { outbox, fails }, received)
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
        let _ = self.outbox.send(message.clone());
        if self.fails {
            return Err(DeliveryError::Api {
                service: "Email",
                status: 500,
                message: "simulated failure".to_string(),
            });
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Payments
// ────────────────────────────────────────────────────────────────────────────

/// Issues `fake_<plan id>` references. Its webhook format is
/// `{"event": "paid", "reference": "…"}`.
pub struct FakePaymentProvider {
    kind: PaymentProviderKind,
    fail: AtomicBool,
    requests: Mutex<Vec<ChargeRequest>>,
}

impl FakePaymentProvider {
    pub fn new(kind: PaymentProviderKind) -> Self {
        Self {
            kind,
            fail: AtomicBool::new(false),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<ChargeRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentProvider for FakePaymentProvider {
    fn kind(&self) -> PaymentProviderKind {
        self.kind
    }

    async fn create_charge(&self, request: &ChargeRequest) -> Result<Charge, PaymentError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(PaymentError::Api {
                provider: self.kind,
                status: 503,
                message: "provider unavailable".to_string(),
            });
        }
        Ok(Charge {
            reference: format!("fake_{}", request.plan_id),
            url: format!("https://pay.example.com/{}", request.plan_id),
        })
    }

    fn parse_webhook(&self, _headers: &HeaderMap, body: &[u8]) -> Result<WebhookEvent, PaymentError> {
        let event = parse_json(body)?;
        match (event["event"].as_str(), event["reference"].as_str()) {
            (Some("paid"), Some(reference)) => Ok(WebhookEvent::PaymentConfirmed {
                billing_reference: reference.to_string(),
            }),
            (event_type, _) => Ok(WebhookEvent::Ignored {
                event_type: event_type.unwrap_or_default().to_string(),
            }),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// App
// ────────────────────────────────────────────────────────────────────────────

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryPlanStore>,
    pub llm: Arc<ScriptedLlm>,
    pub emails: UnboundedReceiver<EmailMessage>,
    /// Registered as the Woovi provider.
    pub payment: Arc<FakePaymentProvider>,
}

/// Full application state over in-memory doubles.
/// Providers: a fake under `woovi`, the real (parse-only) AbacatePay adapter.
pub fn test_app(replies: Vec<Result<String, LlmError>>) -> TestApp {
    let config = Config::for_tests();
    let store = Arc::new(MemoryPlanStore::default());
    let llm = Arc::new(ScriptedLlm::new(replies));
    let (sender, emails) = RecordingEmailSender::new(false);
    let email: Arc<dyn EmailSender> = Arc::new(sender);

    let payment = Arc::new(FakePaymentProvider::new(PaymentProviderKind::Woovi));
    let mut payments = PaymentProviders::default();
    payments.register(payment.clone());
    payments.register(Arc::new(AbacatePayProvider::new(
        "test-key".to_string(),
        config.abacatepay_product_id.clone(),
        config.abacatepay_price_cents,
    )));

    let generator = Arc::new(PlanGenerator::new(
        store.clone(),
        llm.clone(),
        email.clone(),
        config.public_base_url.clone(),
        generation_deadline(chrono::Duration::minutes(config.generation_timeout_minutes)),
    ));

    let state = AppState {
        store: store.clone(),
        generator,
        payments: Arc::new(payments),
        email,
        rate_limiter: Arc::new(InMemoryRateLimiter::new(
            config.cpf_lookup_limit,
            std::time::Duration::from_secs(config.cpf_lookup_window_secs),
        )),
        notion: None,
        pdf: PdfRenderer::new(config.pdf_fonts_dir.clone(), config.pdf_font_family.clone()),
        config,
    };

    TestApp {
        state,
        store,
        llm,
        emails,
        payment,
    }
}
