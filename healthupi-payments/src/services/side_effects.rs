//! Work that follows a successful payment: unlocking the booking and
//! telling the patient.
//!
//! Both are auxiliary to the status write. Callers log their errors and
//! move on.

use crate::models::{id_bson, Entitlement, Order};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use mongodb::bson::{self, doc};
use mongodb::options::UpdateOptions;
use mongodb::{Collection, Database};
use serde::Serialize;
use service_core::observability::TracedClientExt;
use std::time::Duration;

/// Grants the paying user access to what the order paid for.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EntitlementGranter: Send + Sync {
    async fn grant(&self, order: &Order) -> Result<()>;
}

/// Sends the payment confirmation to the patient.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfirmationNotifier: Send + Sync {
    async fn notify_paid(&self, order: &Order) -> Result<()>;
}

#[derive(Clone)]
pub struct MongoEntitlements {
    entitlements: Collection<Entitlement>,
}

impl MongoEntitlements {
    pub fn new(db: &Database) -> Self {
        Self {
            entitlements: db.collection("entitlements"),
        }
    }
}

#[async_trait]
impl EntitlementGranter for MongoEntitlements {
    async fn grant(&self, order: &Order) -> Result<()> {
        let entitlement = Entitlement::for_order(order);

        // Keyed by order id, so a repeated grant rewrites the same row.
        let filter = doc! { "_id": id_bson(entitlement.order_id) };
        let mut fields = bson::to_document(&entitlement)?;
        fields.remove("_id");
        let update = doc! { "$setOnInsert": fields };
        let options = UpdateOptions::builder().upsert(true).build();

        self.entitlements
            .update_one(filter, update, options)
            .await?;

        tracing::info!(
            order_id = %order.id,
            user_id = ?order.user_id,
            resource = ?entitlement.resource,
            "Entitlement granted"
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct PaymentConfirmation<'a> {
    template: &'static str,
    user_id: Option<&'a str>,
    order_id: String,
    provider_order_id: &'a str,
    payment_id: Option<&'a str>,
    amount: i64,
    currency: &'a str,
}

/// Posts confirmations to the notification service over HTTP.
#[derive(Clone)]
pub struct HttpConfirmationNotifier {
    client: reqwest::Client,
    endpoint: Option<String>,
    timeout: Duration,
}

impl HttpConfirmationNotifier {
    pub fn new(endpoint: Option<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            timeout,
        }
    }
}

#[async_trait]
impl ConfirmationNotifier for HttpConfirmationNotifier {
    async fn notify_paid(&self, order: &Order) -> Result<()> {
        let Some(endpoint) = self.endpoint.as_deref() else {
            tracing::debug!(order_id = %order.id, "No notification endpoint, skipping confirmation");
            return Ok(());
        };

        let message = PaymentConfirmation {
            template: "payment_confirmed",
            user_id: order.user_id.as_deref(),
            order_id: order.id.to_string(),
            provider_order_id: &order.provider_order_id,
            payment_id: order.payment_id.as_deref(),
            amount: order.amount,
            currency: &order.currency,
        };

        let response = self
            .client
            .traced_post(endpoint)
            .timeout(self.timeout)
            .json(&message)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "notification service responded with {}",
                response.status()
            ));
        }

        tracing::info!(order_id = %order.id, "Payment confirmation sent");
        Ok(())
    }
}
