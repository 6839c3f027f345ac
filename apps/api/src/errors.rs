use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::delivery::DeliveryError;
use crate::llm_client::LlmError;
use crate::payments::PaymentError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Too many requests")]
    TooManyRequests,

    #[error("Invalid webhook: {0}")]
    InvalidWebhook(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Payment provider error: {0}")]
    Payment(#[from] PaymentError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
            AppError::TooManyRequests => (
                StatusCode::TOO_MANY_REQUESTS,
                "TOO_MANY_REQUESTS",
                "Too many attempts. Please wait a minute.".to_string(),
            ),
            AppError::InvalidWebhook(msg) => {
                tracing::warn!("Rejected webhook: {msg}");
                (
                    StatusCode::BAD_REQUEST,
                    "INVALID_WEBHOOK",
                    "Invalid webhook".to_string(),
                )
            }
            AppError::Llm(e) => {
                tracing::error!("LLM error: {e}");
                (
                    StatusCode::BAD_GATEWAY,
                    "LLM_ERROR",
                    "An AI processing error occurred. Please try again.".to_string(),
                )
            }
            AppError::Generation(msg) => {
                tracing::error!("Generation error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "GENERATION_ERROR",
                    "Something went wrong, please contact support".to_string(),
                )
            }
            AppError::Payment(e) => {
                tracing::error!("Payment provider error: {e}");
                (
                    StatusCode::BAD_GATEWAY,
                    "PAYMENT_ERROR",
                    "Could not create the payment. Please try again.".to_string(),
                )
            }
            AppError::Delivery(e) => {
                tracing::error!("Delivery error: {e}");
                (
                    StatusCode::BAD_GATEWAY,
                    "DELIVERY_ERROR",
                    "Could not deliver the plan. Please try again.".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_maps_to_bad_request() {
        let response = AppError::Validation("CPF inválido".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_rate_limit_maps_to_429() {
        let response = AppError::TooManyRequests.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_generation_error_is_generic_500() {
        let response = AppError::Generation("both parses failed".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
