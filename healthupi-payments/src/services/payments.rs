//! Order lifecycle transitions driven by verified payment events.
//!
//! The status write is authoritative and its failure is returned to the
//! caller (a webhook delivery then gets retried). Entitlement and
//! notification run only after this call performed the write, and their
//! failures are logged here and never returned.

use crate::models::{Order, OrderStatus};
use crate::services::events::PaymentEvent;
use crate::services::repository::OrderStore;
use crate::services::side_effects::{ConfirmationNotifier, EntitlementGranter};
use anyhow::Result;
use std::sync::Arc;
use tokio::task::JoinError;

/// What applying an event did to the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The status changed in this call.
    Applied,
    /// The order already had this status, or the transition table forbids
    /// the change. Nothing was written.
    Unchanged,
    /// No order with this provider reference.
    OrderNotFound,
    /// The event carried nothing to act on.
    Ignored,
}

impl TransitionOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            TransitionOutcome::Applied => "applied",
            TransitionOutcome::Unchanged => "unchanged",
            TransitionOutcome::OrderNotFound => "order_not_found",
            TransitionOutcome::Ignored => "ignored",
        }
    }
}

#[derive(Clone)]
pub struct PaymentProcessor {
    store: Arc<dyn OrderStore>,
    entitlements: Arc<dyn EntitlementGranter>,
    notifier: Arc<dyn ConfirmationNotifier>,
}

impl PaymentProcessor {
    pub fn new(
        store: Arc<dyn OrderStore>,
        entitlements: Arc<dyn EntitlementGranter>,
        notifier: Arc<dyn ConfirmationNotifier>,
    ) -> Self {
        Self {
            store,
            entitlements,
            notifier,
        }
    }

    /// Route a verified webhook event to its transition.
    pub async fn handle_event(&self, event: &PaymentEvent) -> Result<TransitionOutcome> {
        match event {
            PaymentEvent::Captured {
                event: name,
                provider_order_id: Some(order_id),
                payment_id,
            } => {
                tracing::info!(
                    event_type = %name,
                    order_id = %order_id,
                    payment_id = ?payment_id,
                    "Payment captured webhook received"
                );
                self.capture(order_id, payment_id.as_deref()).await
            }
            PaymentEvent::Failed {
                provider_order_id: Some(order_id),
                payment_id,
                reason,
            } => {
                tracing::info!(
                    order_id = %order_id,
                    payment_id = ?payment_id,
                    reason = ?reason,
                    "Payment failed webhook received"
                );
                self.fail(order_id, reason.as_deref()).await
            }
            PaymentEvent::Captured { event: name, .. } => {
                tracing::warn!(event_type = %name, "Capture event without order reference");
                Ok(TransitionOutcome::Ignored)
            }
            PaymentEvent::Failed { payment_id, .. } => {
                tracing::warn!(payment_id = ?payment_id, "Failure event without order reference");
                Ok(TransitionOutcome::Ignored)
            }
            PaymentEvent::Unrecognized { event: name } => {
                tracing::debug!(event_type = %name, "Unhandled webhook event type");
                Ok(TransitionOutcome::Ignored)
            }
        }
    }

    /// Mark an order paid and, if this call did it, run the side effects.
    pub async fn capture(
        &self,
        provider_order_id: &str,
        payment_id: Option<&str>,
    ) -> Result<TransitionOutcome> {
        let Some(order) = self.store.find_by_provider_order_id(provider_order_id).await? else {
            tracing::warn!(order_id = %provider_order_id, "Capture for unknown order, ignoring");
            return Ok(TransitionOutcome::OrderNotFound);
        };

        if order.status == OrderStatus::Paid {
            tracing::info!(order_id = %provider_order_id, "Order already paid, skipping");
            return Ok(TransitionOutcome::Unchanged);
        }

        // The read above is only a fast path; the guarded write decides.
        let Some(paid) = self.store.mark_paid(provider_order_id, payment_id).await? else {
            tracing::info!(
                order_id = %provider_order_id,
                "Order paid by a concurrent delivery, skipping"
            );
            return Ok(TransitionOutcome::Unchanged);
        };

        tracing::info!(
            order_id = %provider_order_id,
            payment_id = ?paid.payment_id,
            previous_status = %order.status,
            "Order marked paid"
        );

        self.run_side_effects(paid).await;

        Ok(TransitionOutcome::Applied)
    }

    /// Mark an order failed. No side effects.
    pub async fn fail(
        &self,
        provider_order_id: &str,
        reason: Option<&str>,
    ) -> Result<TransitionOutcome> {
        if self.store.mark_failed(provider_order_id, reason).await? {
            tracing::info!(order_id = %provider_order_id, reason = ?reason, "Order marked failed");
            return Ok(TransitionOutcome::Applied);
        }

        match self.store.find_by_provider_order_id(provider_order_id).await? {
            Some(order) => {
                tracing::info!(
                    order_id = %provider_order_id,
                    status = %order.status,
                    "Failure event does not apply to current status"
                );
                Ok(TransitionOutcome::Unchanged)
            }
            None => {
                tracing::warn!(order_id = %provider_order_id, "Failure for unknown order, ignoring");
                Ok(TransitionOutcome::OrderNotFound)
            }
        }
    }

    async fn run_side_effects(&self, order: Order) {
        let order = Arc::new(order);

        let grant = {
            let entitlements = Arc::clone(&self.entitlements);
            let order = Arc::clone(&order);
            tokio::spawn(async move { entitlements.grant(&order).await })
        };
        let notify = {
            let notifier = Arc::clone(&self.notifier);
            let order = Arc::clone(&order);
            tokio::spawn(async move { notifier.notify_paid(&order).await })
        };

        let (grant, notify) = tokio::join!(grant, notify);
        log_side_effect("entitlement", &order, grant);
        log_side_effect("confirmation", &order, notify);
    }
}

fn log_side_effect(name: &str, order: &Order, result: Result<Result<()>, JoinError>) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(
            side_effect = name,
            order_id = %order.provider_order_id,
            error = %e,
            "Post-payment side effect failed"
        ),
        Err(e) => tracing::error!(
            side_effect = name,
            order_id = %order.provider_order_id,
            error = %e,
            "Post-payment side effect panicked"
        ),
    }
}
