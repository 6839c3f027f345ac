use std::sync::Arc;

use crate::config::Config;
use crate::delivery::email::EmailSender;
use crate::delivery::notion::NotionClient;
use crate::delivery::pdf::PdfRenderer;
use crate::generation::generator::PlanGenerator;
use crate::payments::PaymentProviders;
use crate::rate_limit::RateLimiter;
use crate::store::PlanStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PlanStore>,
    pub generator: Arc<PlanGenerator>,
    /// Only providers with credentials configured are registered.
    pub payments: Arc<PaymentProviders>,
    pub email: Arc<dyn EmailSender>,
    /// Guards the CPF lookup, keyed by client IP.
    pub rate_limiter: Arc<dyn RateLimiter>,
    /// `None` unless all three Notion OAuth settings are present.
    pub notion: Option<NotionClient>,
    pub pdf: PdfRenderer,
    pub config: Config,
}
