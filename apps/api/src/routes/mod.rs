pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::checkout::handlers as checkout;
use crate::delivery::handlers as delivery;
use crate::generation::handlers as plans;
use crate::payments::webhooks;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Checkout and payment confirmation
        .route("/api/checkout", post(checkout::handle_checkout))
        .route("/api/webhooks/:provider", post(webhooks::handle_webhook))
        // Status polling
        .route("/api/plans/:id", get(plans::handle_get_plan))
        .route(
            "/api/plans/billing/:reference",
            get(plans::handle_get_plan_by_billing),
        )
        .route("/api/plans/cpf/:cpf", get(plans::handle_list_by_cpf))
        // Delivery
        .route("/api/plans/:id/pdf", get(delivery::handle_plan_pdf))
        .route("/api/notion/auth", get(delivery::handle_notion_auth))
        .route("/api/notion/callback", get(delivery::handle_notion_callback))
        .route("/api/notion/export", post(delivery::handle_notion_export))
        // Development helpers, rejected in production
        .route(
            "/api/dev/simulate-payment",
            post(webhooks::handle_simulate_payment),
        )
        .route("/api/dev/test-email", post(delivery::handle_test_email))
        .with_state(state)
}
