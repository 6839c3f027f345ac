mod checkout;
mod config;
mod db;
mod delivery;
mod errors;
mod generation;
mod llm_client;
mod models;
mod payments;
mod rate_limit;
mod routes;
mod state;
mod store;
#[cfg(test)]
mod test_support;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::delivery::email::{DisabledEmailSender, EmailSender, ResendEmailSender};
use crate::delivery::notion::NotionClient;
use crate::delivery::pdf::PdfRenderer;
use crate::generation::generator::PlanGenerator;
use crate::generation::watchdog::{generation_deadline, spawn_generation_watchdog};
use crate::llm_client::LlmClient;
use crate::payments::abacatepay::AbacatePayProvider;
use crate::payments::stripe::StripeProvider;
use crate::payments::woovi::WooviProvider;
use crate::payments::PaymentProviders;
use crate::rate_limit::{InMemoryRateLimiter, RateLimiter, RedisRateLimiter};
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::{PgPlanStore, PlanStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Career Plan API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let pool = create_pool(&config.database_url).await?;
    let store: Arc<dyn PlanStore> = Arc::new(PgPlanStore::new(pool));

    // Initialize LLM client
    let llm = Arc::new(LlmClient::new(config.anthropic_api_key.clone())?);
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let email: Arc<dyn EmailSender> = match &config.resend_api_key {
        Some(key) => Arc::new(ResendEmailSender::new(key.clone(), config.email_from.clone())),
        None => {
            warn!("RESEND_API_KEY not set, plan-ready emails are disabled");
            Arc::new(DisabledEmailSender)
        }
    };

    let payments = build_payment_providers(&config);
    info!("Payment providers enabled: {:?}", payments.enabled());

    // CPF lookup rate limiter: Redis when configured, in-process otherwise
    let window = std::time::Duration::from_secs(config.cpf_lookup_window_secs);
    let rate_limiter: Arc<dyn RateLimiter> = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str())?;
            info!("Redis client initialized");
            Arc::new(RedisRateLimiter::new(client, config.cpf_lookup_limit, window))
        }
        None => {
            warn!("REDIS_URL not set, rate limiting is per process");
            Arc::new(InMemoryRateLimiter::new(config.cpf_lookup_limit, window))
        }
    };

    let notion = match (
        &config.notion_client_id,
        &config.notion_client_secret,
        &config.notion_redirect_uri,
    ) {
        (Some(id), Some(secret), Some(redirect)) => {
            info!("Notion export enabled");
            Some(NotionClient::new(id.clone(), secret.clone(), redirect.clone()))
        }
        _ => None,
    };

    let timeout = chrono::Duration::minutes(config.generation_timeout_minutes);
    let generator = Arc::new(PlanGenerator::new(
        store.clone(),
        llm,
        email.clone(),
        config.public_base_url.clone(),
        generation_deadline(timeout),
    ));

    spawn_generation_watchdog(store.clone(), timeout);
    info!(
        "Generation watchdog started (timeout: {} min)",
        config.generation_timeout_minutes
    );

    // Build app state
    let state = AppState {
        store,
        generator,
        payments: Arc::new(payments),
        email,
        rate_limiter,
        notion,
        pdf: PdfRenderer::new(config.pdf_fonts_dir.clone(), config.pdf_font_family.clone()),
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Registers every provider whose credentials are present.
fn build_payment_providers(config: &Config) -> PaymentProviders {
    let mut providers = PaymentProviders::default();

    match (
        &config.stripe_secret_key,
        &config.stripe_webhook_secret,
        &config.stripe_price_id,
    ) {
        (Some(key), Some(webhook_secret), Some(price)) => providers.register(Arc::new(
            StripeProvider::new(key.clone(), webhook_secret.clone(), price.clone()),
        )),
        (None, None, None) => {}
        _ => warn!("Stripe is partially configured, it stays disabled"),
    }

    if let Some(key) = &config.woovi_api_key {
        providers.register(Arc::new(WooviProvider::new(
            key.clone(),
            config.woovi_charge_cents,
        )));
    }

    if let Some(key) = &config.abacatepay_api_key {
        providers.register(Arc::new(AbacatePayProvider::new(
            key.clone(),
            config.abacatepay_product_id.clone(),
            config.abacatepay_price_cents,
        )));
    }

    providers
}
