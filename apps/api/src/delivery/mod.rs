// Post-generation delivery: email notification, PDF export and Notion export.
// None of these gate or alter a plan's status; failures are logged and, for
// user-initiated actions, reported back to the caller only.

use thiserror::Error;

pub mod email;
pub mod handlers;
pub mod notion;
pub mod pdf;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} API error (status {status}): {message}")]
    Api {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("Notion workspace has no page shared with the integration")]
    NoSharedPage,

    #[error("PDF rendering failed: {0}")]
    Pdf(String),
}

/// Converts a non-2xx response into `DeliveryError::Api`, keeping the body for logs.
pub(crate) async fn ensure_success(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, DeliveryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(DeliveryError::Api {
        service,
        status: status.as_u16(),
        message,
    })
}
