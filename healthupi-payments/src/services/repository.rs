use crate::models::{id_bson, Order, OrderStatus};
use anyhow::Result;
use async_trait::async_trait;
use mongodb::bson::{doc, Bson, DateTime, Document};
use mongodb::options::{FindOneAndUpdateOptions, IndexOptions, ReturnDocument};
use mongodb::{Collection, Database, IndexModel};
use uuid::Uuid;

/// Persistence for orders.
///
/// Status changes go through `mark_paid`/`mark_failed`, which must apply
/// the change atomically and only from the statuses allowed by
/// [`OrderStatus::sources_of`].
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<Order>>;

    async fn find_by_provider_order_id(&self, provider_order_id: &str) -> Result<Option<Order>>;

    /// Move the order to `paid`. Returns the updated order only when this
    /// call performed the transition; `None` means it was already paid
    /// (or does not exist).
    async fn mark_paid(
        &self,
        provider_order_id: &str,
        payment_id: Option<&str>,
    ) -> Result<Option<Order>>;

    /// Move the order to `failed`. Returns whether a row was updated.
    async fn mark_failed(&self, provider_order_id: &str, reason: Option<&str>) -> Result<bool>;
}

fn status_guard(next: OrderStatus) -> Document {
    let sources: Vec<Bson> = OrderStatus::sources_of(next)
        .into_iter()
        .map(|s| Bson::String(s.as_str().to_string()))
        .collect();
    doc! { "$in": sources }
}

#[derive(Clone)]
pub struct MongoOrderStore {
    orders: Collection<Order>,
}

impl MongoOrderStore {
    pub fn new(db: &Database) -> Self {
        Self {
            orders: db.collection("orders"),
        }
    }

    pub async fn init_indexes(&self) -> Result<()> {
        let provider_order_index = IndexModel::builder()
            .keys(doc! { "provider_order_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("provider_order_id_unique".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        let user_index = IndexModel::builder()
            .keys(doc! { "user_id": 1, "created_at": -1 })
            .options(
                IndexOptions::builder()
                    .name("user_orders_idx".to_string())
                    .build(),
            )
            .build();

        self.orders
            .create_indexes([provider_order_index, user_index], None)
            .await?;

        tracing::info!("Order indexes initialized");
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MongoOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        self.orders.insert_one(order, None).await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>> {
        let filter = doc! { "_id": id_bson(id) };
        Ok(self.orders.find_one(filter, None).await?)
    }

    async fn find_by_provider_order_id(&self, provider_order_id: &str) -> Result<Option<Order>> {
        let filter = doc! { "provider_order_id": provider_order_id };
        Ok(self.orders.find_one(filter, None).await?)
    }

    async fn mark_paid(
        &self,
        provider_order_id: &str,
        payment_id: Option<&str>,
    ) -> Result<Option<Order>> {
        // Single conditional write: of several concurrent deliveries only
        // one matches the status guard.
        let filter = doc! {
            "provider_order_id": provider_order_id,
            "status": status_guard(OrderStatus::Paid),
        };

        let mut set = doc! {
            "status": OrderStatus::Paid.as_str(),
            "updated_at": DateTime::now(),
        };
        if let Some(payment_id) = payment_id {
            set.insert("payment_id", payment_id);
        }

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let updated = self
            .orders
            .find_one_and_update(filter, doc! { "$set": set }, options)
            .await?;

        Ok(updated)
    }

    async fn mark_failed(&self, provider_order_id: &str, reason: Option<&str>) -> Result<bool> {
        let filter = doc! {
            "provider_order_id": provider_order_id,
            "status": status_guard(OrderStatus::Failed),
        };
        let update = doc! {
            "$set": {
                "status": OrderStatus::Failed.as_str(),
                "failure_reason": reason,
                "updated_at": DateTime::now(),
            }
        };

        let result = self.orders.update_one(filter, update, None).await?;
        Ok(result.matched_count > 0)
    }
}
