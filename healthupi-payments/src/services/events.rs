//! Razorpay webhook event parsing.
//!
//! Only call this on a body whose signature has already been verified.

use serde::Deserialize;

/// Webhook envelope as Razorpay sends it. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    event: String,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookPayload {
    payment: Option<EntityWrapper<PaymentEntity>>,
    order: Option<EntityWrapper<OrderEntity>>,
}

#[derive(Debug, Deserialize)]
struct EntityWrapper<T> {
    entity: T,
}

#[derive(Debug, Deserialize)]
struct PaymentEntity {
    id: String,
    order_id: Option<String>,
    error_code: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderEntity {
    id: String,
}

fn entities(
    payload: serde_json::Value,
) -> Result<(Option<PaymentEntity>, Option<OrderEntity>), serde_json::Error> {
    let payload: WebhookPayload = if payload.is_null() {
        WebhookPayload::default()
    } else {
        serde_json::from_value(payload)?
    };
    Ok((
        payload.payment.map(|p| p.entity),
        payload.order.map(|o| o.entity),
    ))
}

/// A verified webhook event, reduced to what the order lifecycle needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    /// `payment.captured` or `order.paid`.
    Captured {
        event: String,
        provider_order_id: Option<String>,
        payment_id: Option<String>,
    },
    /// `payment.failed`.
    Failed {
        provider_order_id: Option<String>,
        payment_id: Option<String>,
        reason: Option<String>,
    },
    /// Anything else in Razorpay's event vocabulary.
    Unrecognized { event: String },
}

impl PaymentEvent {
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        let envelope: WebhookEnvelope = serde_json::from_slice(body)?;

        // Entities are only decoded for events we act on, so payload shape
        // changes in other events cannot turn into rejections.
        let event = match envelope.event.as_str() {
            "payment.captured" | "order.paid" => {
                let (payment, order) = entities(envelope.payload)?;
                let provider_order_id = order
                    .map(|o| o.id)
                    .or_else(|| payment.as_ref().and_then(|p| p.order_id.clone()));
                PaymentEvent::Captured {
                    event: envelope.event,
                    provider_order_id,
                    payment_id: payment.map(|p| p.id),
                }
            }
            "payment.failed" => {
                let (payment, _) = entities(envelope.payload)?;
                let (provider_order_id, payment_id, reason) = match payment {
                    Some(p) => (
                        p.order_id,
                        Some(p.id),
                        p.error_description.or(p.error_code),
                    ),
                    None => (None, None, None),
                };
                PaymentEvent::Failed {
                    provider_order_id,
                    payment_id,
                    reason,
                }
            }
            _ => PaymentEvent::Unrecognized {
                event: envelope.event,
            },
        };

        Ok(event)
    }

    /// Metric/log label for the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            PaymentEvent::Captured { .. } => "captured",
            PaymentEvent::Failed { .. } => "failed",
            PaymentEvent::Unrecognized { .. } => "unrecognized",
        }
    }
}
