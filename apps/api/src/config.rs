use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// When unset, the CPF lookup rate limiter falls back to an in-process window.
    pub redis_url: Option<String>,
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    pub app_env: String,
    /// Public URL of the web client; used for payment return URLs and email links.
    pub public_base_url: String,

    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub stripe_price_id: Option<String>,
    pub woovi_api_key: Option<String>,
    pub woovi_charge_cents: u32,
    pub abacatepay_api_key: Option<String>,
    pub abacatepay_product_id: String,
    pub abacatepay_price_cents: u32,

    pub resend_api_key: Option<String>,
    pub email_from: String,

    pub notion_client_id: Option<String>,
    pub notion_client_secret: Option<String>,
    pub notion_redirect_uri: Option<String>,

    pub pdf_fonts_dir: String,
    pub pdf_font_family: String,

    pub generation_timeout_minutes: i64,
    pub cpf_lookup_limit: u32,
    pub cpf_lookup_window_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: optional_env("REDIS_URL"),
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            app_env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string())
                .trim_end_matches('/')
                .to_string(),

            stripe_secret_key: optional_env("STRIPE_SECRET_KEY"),
            stripe_webhook_secret: optional_env("STRIPE_WEBHOOK_SECRET"),
            stripe_price_id: optional_env("STRIPE_PRICE_ID"),
            woovi_api_key: optional_env("WOOVI_API_KEY"),
            woovi_charge_cents: parse_env("WOOVI_CHARGE_CENTS", 2490)?,
            abacatepay_api_key: optional_env("ABACATEPAY_API_KEY"),
            abacatepay_product_id: std::env::var("ABACATEPAY_PRODUCT_ID")
                .unwrap_or_else(|_| "career-plan-90d".to_string()),
            abacatepay_price_cents: parse_env("ABACATEPAY_PRICE_CENTS", 2990)?,

            resend_api_key: optional_env("RESEND_API_KEY"),
            email_from: std::env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "Career Plan <onboarding@resend.dev>".to_string()),

            notion_client_id: optional_env("NOTION_CLIENT_ID"),
            notion_client_secret: optional_env("NOTION_CLIENT_SECRET"),
            notion_redirect_uri: optional_env("NOTION_REDIRECT_URI"),

            pdf_fonts_dir: std::env::var("PDF_FONTS_DIR").unwrap_or_else(|_| "./fonts".to_string()),
            pdf_font_family: std::env::var("PDF_FONT_FAMILY")
                .unwrap_or_else(|_| "LiberationSans".to_string()),

            generation_timeout_minutes: parse_env("GENERATION_TIMEOUT_MINUTES", 15)?,
            cpf_lookup_limit: parse_env("CPF_LOOKUP_LIMIT", 5)?,
            cpf_lookup_window_secs: parse_env("CPF_LOOKUP_WINDOW_SECS", 60)?,
        })
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    /// Link to the client-side result page for a plan.
    pub fn result_url(&self, plan_id: uuid::Uuid) -> String {
        format!("{}/resultado/{}", self.public_base_url, plan_id)
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
impl Config {
    /// Configuration for unit tests; never reads the environment.
    pub fn for_tests() -> Self {
        Config {
            database_url: "postgres://localhost/careerplan_test".to_string(),
            redis_url: None,
            anthropic_api_key: "test-key".to_string(),
            port: 0,
            rust_log: "debug".to_string(),
            app_env: "test".to_string(),
            public_base_url: "https://planos.example.com".to_string(),
            stripe_secret_key: None,
            stripe_webhook_secret: None,
            stripe_price_id: None,
            woovi_api_key: None,
            woovi_charge_cents: 2490,
            abacatepay_api_key: None,
            abacatepay_product_id: "career-plan-90d".to_string(),
            abacatepay_price_cents: 2990,
            resend_api_key: None,
            email_from: "Career Plan <test@example.com>".to_string(),
            notion_client_id: None,
            notion_client_secret: None,
            notion_redirect_uri: None,
            pdf_fonts_dir: "./fonts".to_string(),
            pdf_font_family: "LiberationSans".to_string(),
            generation_timeout_minutes: 15,
            cpf_lookup_limit: 5,
            cpf_lookup_window_secs: 60,
        }
    }
}
