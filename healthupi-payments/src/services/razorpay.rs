//! Razorpay payment provider client.
//!
//! Implements the Orders API used to start a checkout, plus the two
//! signature checks Razorpay relies on: the checkout handler signature
//! returned to the browser and the webhook body signature.

use crate::config::RazorpayConfig;
use anyhow::{anyhow, Result};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use service_core::utils::signature;

/// Header carrying the webhook body signature.
pub const WEBHOOK_SIGNATURE_HEADER: &str = "X-Razorpay-Signature";

#[derive(Clone)]
pub struct RazorpayClient {
    client: Client,
    config: RazorpayConfig,
}

/// Request to create a Razorpay order.
#[derive(Debug, Serialize)]
pub struct CreateOrderRequest {
    /// Amount in smallest currency unit (paise for INR).
    pub amount: i64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<serde_json::Value>,
}

/// Response from Razorpay order creation. Only the fields this service
/// reads are kept.
#[derive(Debug, Deserialize)]
pub struct RazorpayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub receipt: Option<String>,
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct RazorpayError {
    error: RazorpayErrorDetail,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorDetail {
    code: String,
    description: String,
}

/// Checkout handler response posted back by the browser.
#[derive(Debug, Clone)]
pub struct PaymentVerification {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

impl RazorpayClient {
    pub fn new(config: RazorpayConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn key_id(&self) -> &str {
        &self.config.key_id
    }

    /// Create a new order in Razorpay.
    pub async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        receipt: Option<String>,
        notes: Option<serde_json::Value>,
    ) -> Result<RazorpayOrder> {
        let request = CreateOrderRequest {
            amount,
            currency: currency.to_string(),
            receipt,
            notes,
        };

        let url = format!("{}/orders", self.config.api_base_url);

        let response = self
            .client
            .post(&url)
            .basic_auth(
                &self.config.key_id,
                Some(self.config.key_secret.expose_secret()),
            )
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(status = %status, "Razorpay create_order response");

        if status.is_success() {
            let order: RazorpayOrder = serde_json::from_str(&body)?;
            tracing::info!(
                razorpay_order_id = %order.id,
                amount = order.amount,
                currency = %order.currency,
                "Razorpay order created"
            );
            Ok(order)
        } else {
            let (code, description) = match serde_json::from_str::<RazorpayError>(&body) {
                Ok(err) => (err.error.code, err.error.description),
                Err(_) => ("UNKNOWN".to_string(), body),
            };
            tracing::error!(
                status = %status,
                code = %code,
                description = %description,
                "Razorpay order creation failed"
            );
            Err(anyhow!("Razorpay error: {} - {}", code, description))
        }
    }

    /// Verify the checkout handler signature:
    /// `HMAC-SHA256(order_id + "|" + payment_id, key_secret)`.
    pub fn verify_payment_signature(&self, verification: &PaymentVerification) -> bool {
        let payload = format!(
            "{}|{}",
            verification.razorpay_order_id, verification.razorpay_payment_id
        );

        let is_valid = signature::verify_signature(
            self.config.key_secret.expose_secret(),
            payload.as_bytes(),
            &verification.razorpay_signature,
        );

        if !is_valid {
            tracing::warn!(
                razorpay_order_id = %verification.razorpay_order_id,
                razorpay_payment_id = %verification.razorpay_payment_id,
                "Payment signature verification failed"
            );
        }

        is_valid
    }

    /// Verify a webhook signature: `HMAC-SHA256(raw_body, webhook_secret)`.
    ///
    /// `body` must be the bytes exactly as received.
    pub fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool {
        signature::verify_signature(self.config.webhook_secret.expose_secret(), body, signature)
    }
}
