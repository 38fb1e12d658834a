//! In-process [`OrderStore`] used by tests and local runs without MongoDB.

use crate::models::{Order, OrderStatus};
use crate::services::repository::OrderStore;
use anyhow::Result;
use async_trait::async_trait;
use mongodb::bson::DateTime;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: Mutex<HashMap<String, Order>>,
    status_writes: AtomicUsize,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of status transitions applied so far.
    pub fn status_writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.lock().await;
        if orders.contains_key(&order.provider_order_id) {
            anyhow::bail!("duplicate provider_order_id {}", order.provider_order_id);
        }
        orders.insert(order.provider_order_id.clone(), order.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>> {
        let orders = self.orders.lock().await;
        Ok(orders.values().find(|o| o.id == id).cloned())
    }

    async fn find_by_provider_order_id(&self, provider_order_id: &str) -> Result<Option<Order>> {
        Ok(self.orders.lock().await.get(provider_order_id).cloned())
    }

    async fn mark_paid(
        &self,
        provider_order_id: &str,
        payment_id: Option<&str>,
    ) -> Result<Option<Order>> {
        let mut orders = self.orders.lock().await;
        let Some(order) = orders.get_mut(provider_order_id) else {
            return Ok(None);
        };
        if !order.status.can_transition_to(OrderStatus::Paid) {
            return Ok(None);
        }

        order.status = OrderStatus::Paid;
        if let Some(payment_id) = payment_id {
            order.payment_id = Some(payment_id.to_string());
        }
        order.updated_at = DateTime::now();
        self.status_writes.fetch_add(1, Ordering::SeqCst);

        Ok(Some(order.clone()))
    }

    async fn mark_failed(&self, provider_order_id: &str, reason: Option<&str>) -> Result<bool> {
        let mut orders = self.orders.lock().await;
        let Some(order) = orders.get_mut(provider_order_id) else {
            return Ok(false);
        };
        if !order.status.can_transition_to(OrderStatus::Failed) {
            return Ok(false);
        }

        order.status = OrderStatus::Failed;
        order.failure_reason = reason.map(str::to_string);
        order.updated_at = DateTime::now();
        self.status_writes.fetch_add(1, Ordering::SeqCst);

        Ok(true)
    }
}
