//! Razorpay webhook endpoint.
//!
//! Status codes drive Razorpay's retries: anything we cannot prove came
//! from Razorpay is a 400 and will not be retried, a failed status write
//! is a 500 and will be, and everything else (including event types we
//! do not handle) is acknowledged with 200.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use service_core::error::AppError;
use thiserror::Error;

use crate::services::{
    metrics::record_webhook, razorpay::WEBHOOK_SIGNATURE_HEADER, PaymentEvent, TransitionOutcome,
};
use crate::startup::AppState;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Missing webhook signature")]
    MissingSignature,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Invalid webhook payload: {0}")]
    MalformedPayload(#[source] serde_json::Error),

    #[error("Failed to record payment event: {0:#}")]
    Store(#[source] anyhow::Error),
}

impl WebhookError {
    /// Whether Razorpay should deliver this event again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WebhookError::Store(_))
    }
}

impl From<WebhookError> for AppError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::Store(e) => AppError::InternalError(e),
            other => AppError::BadRequest(anyhow::anyhow!(other.to_string())),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
}

/// `POST /webhooks/razorpay`
///
/// The body is taken as raw bytes: the signature covers the exact bytes
/// Razorpay sent, and nothing is parsed before it is checked.
pub async fn razorpay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<WebhookAck>), AppError> {
    match process(&state, &headers, &body).await {
        Ok((event, outcome)) => {
            record_webhook(event, outcome.as_str());
            Ok((StatusCode::OK, Json(WebhookAck { status: "ok" })))
        }
        Err(err) => {
            if err.is_retryable() {
                tracing::error!(error = %err, "Webhook processing failed, requesting redelivery");
                record_webhook("unknown", "retry");
            } else {
                tracing::warn!(error = %err, "Webhook rejected");
                record_webhook("unknown", "rejected");
            }
            Err(err.into())
        }
    }
}

async fn process(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(&'static str, TransitionOutcome), WebhookError> {
    let signature = headers
        .get(WEBHOOK_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(WebhookError::MissingSignature)?;

    if !state.razorpay.verify_webhook_signature(body, signature) {
        return Err(WebhookError::InvalidSignature);
    }

    let event = PaymentEvent::parse(body).map_err(WebhookError::MalformedPayload)?;

    let outcome = state
        .processor
        .handle_event(&event)
        .await
        .map_err(WebhookError::Store)?;

    tracing::info!(
        event = event.kind(),
        outcome = outcome.as_str(),
        "Razorpay webhook processed"
    );

    Ok((event.kind(), outcome))
}
