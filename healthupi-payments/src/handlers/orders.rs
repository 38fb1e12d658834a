//! Patient-facing order endpoints: start a checkout, confirm it from the
//! browser, poll its status.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    middleware::CallerContext,
    models::{Order, OrderStatus},
    services::{metrics::record_order_created, razorpay::PaymentVerification},
    startup::AppState,
};

/// Request to create a new order.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    /// Amount in the smallest currency unit (e.g., paise for INR).
    #[validate(range(min = 1))]
    pub amount: i64,
    #[serde(default = "default_currency")]
    #[validate(length(equal = 3))]
    pub currency: String,
    #[validate(length(max = 40))]
    pub receipt: Option<String>,
    /// Stored as order metadata and forwarded to Razorpay as notes.
    pub notes: Option<serde_json::Value>,
}

fn default_currency() -> String {
    "INR".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateOrderResponse {
    pub order_id: Uuid,
    /// Use this in the frontend checkout.
    pub razorpay_order_id: String,
    pub amount: i64,
    pub currency: String,
    /// Razorpay key id for frontend initialization.
    pub razorpay_key_id: String,
}

/// Checkout handler response, as posted by the browser.
#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyPaymentResponse {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub razorpay_payment_id: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub razorpay_order_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: OrderStatus,
    pub payment_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Order> for OrderResponse {
    fn from(o: Order) -> Self {
        Self {
            id: o.id,
            razorpay_order_id: o.provider_order_id,
            amount: o.amount,
            currency: o.currency,
            status: o.status,
            payment_id: o.payment_id,
            created_at: o.created_at.to_string(),
            updated_at: o.updated_at.to_string(),
        }
    }
}

/// `POST /orders`
///
/// Creates the Razorpay order first and only then the local row, so a
/// local order always has a provider reference.
pub async fn create_order(
    State(state): State<AppState>,
    caller: CallerContext,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), AppError> {
    payload.validate()?;

    tracing::info!(
        user_id = %caller.user_id,
        amount = payload.amount,
        currency = %payload.currency,
        "Creating Razorpay order"
    );

    let razorpay_order = state
        .razorpay
        .create_order(
            payload.amount,
            &payload.currency,
            payload.receipt.clone(),
            payload.notes.clone(),
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create Razorpay order");
            AppError::BadGateway(format!("Failed to create payment order: {}", e))
        })?;

    let order = Order::new(
        razorpay_order.id,
        payload.amount,
        payload.currency,
        Some(caller.user_id),
        payload.notes,
    );

    state.orders.insert(&order).await.map_err(|e| {
        tracing::error!(error = %e, razorpay_order_id = %order.provider_order_id, "Failed to save order");
        AppError::DatabaseError(e)
    })?;

    record_order_created(&order.currency);

    tracing::info!(
        order_id = %order.id,
        razorpay_order_id = %order.provider_order_id,
        "Order created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateOrderResponse {
            order_id: order.id,
            razorpay_order_id: order.provider_order_id,
            amount: order.amount,
            currency: order.currency,
            razorpay_key_id: state.razorpay.key_id().to_string(),
        }),
    ))
}

/// `POST /payments/verify`
///
/// A valid checkout signature applies the same capture transition as
/// the webhook, so whichever arrives first marks the order paid. An
/// invalid signature changes nothing.
pub async fn verify_payment(
    State(state): State<AppState>,
    caller: CallerContext,
    Json(payload): Json<VerifyPaymentRequest>,
) -> Result<Json<VerifyPaymentResponse>, AppError> {
    tracing::info!(
        razorpay_order_id = %payload.razorpay_order_id,
        razorpay_payment_id = %payload.razorpay_payment_id,
        user_id = %caller.user_id,
        "Verifying Razorpay payment"
    );

    let verification = PaymentVerification {
        razorpay_order_id: payload.razorpay_order_id.clone(),
        razorpay_payment_id: payload.razorpay_payment_id.clone(),
        razorpay_signature: payload.razorpay_signature,
    };

    if !state.razorpay.verify_payment_signature(&verification) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Payment verification failed - invalid signature"
        )));
    }

    let order = state
        .orders
        .find_by_provider_order_id(&payload.razorpay_order_id)
        .await
        .map_err(AppError::DatabaseError)?
        .filter(|o| o.user_id.as_deref() == Some(caller.user_id.as_str()))
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order not found")))?;

    let outcome = state
        .processor
        .capture(&payload.razorpay_order_id, Some(&payload.razorpay_payment_id))
        .await
        .map_err(AppError::DatabaseError)?;

    tracing::info!(
        order_id = %order.id,
        outcome = outcome.as_str(),
        "Payment verification completed"
    );

    Ok(Json(VerifyPaymentResponse {
        order_id: order.id,
        status: OrderStatus::Paid,
        razorpay_payment_id: payload.razorpay_payment_id,
        message: "Payment verified successfully".to_string(),
    }))
}

/// `GET /orders/:id`
pub async fn get_order(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state
        .orders
        .get(order_id)
        .await
        .map_err(AppError::DatabaseError)?
        .filter(|o| o.user_id.as_deref() == Some(caller.user_id.as_str()))
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order not found")))?;

    Ok(Json(OrderResponse::from(order)))
}
