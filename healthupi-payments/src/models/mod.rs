use mongodb::bson::{self, serde_helpers::uuid_1_as_binary, Bson, DateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// BSON form of a document id. Matches what `uuid_1_as_binary` writes, so
/// filters built from it find the stored rows.
pub fn id_bson(id: Uuid) -> Bson {
    Bson::from(bson::Uuid::from(id))
}

/// Local record of a payment attempt, keyed by the Razorpay order id.
///
/// `amount` and `currency` are fixed at creation; only the status fields
/// change afterwards.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Order {
    #[serde(rename = "_id", with = "uuid_1_as_binary")]
    pub id: Uuid,
    /// Razorpay order id (`order_...`). Unique.
    pub provider_order_id: String,
    /// Amount in the smallest currency unit (paise for INR).
    pub amount: i64,
    pub currency: String,
    pub status: OrderStatus,
    /// Razorpay payment id (`pay_...`), set once the order is paid.
    pub payment_id: Option<String>,
    /// Last failure reason reported by Razorpay.
    pub failure_reason: Option<String>,
    /// Paying user, as asserted by the auth gateway.
    pub user_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Order {
    pub fn new(
        provider_order_id: String,
        amount: i64,
        currency: String,
        user_id: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        let now = DateTime::now();
        Self {
            id: Uuid::new_v4(),
            provider_order_id,
            amount,
            currency,
            status: OrderStatus::Created,
            payment_id: None,
            failure_reason: None,
            user_id,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Created,
    Paid,
    Failed,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 3] = [OrderStatus::Created, OrderStatus::Paid, OrderStatus::Failed];

    /// The transition table.
    ///
    /// `failed` is not terminal: a late capture still wins. `paid` never
    /// moves. Re-applying `failed` only refreshes the failure details.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Created, OrderStatus::Paid)
                | (OrderStatus::Created, OrderStatus::Failed)
                | (OrderStatus::Failed, OrderStatus::Paid)
                | (OrderStatus::Failed, OrderStatus::Failed)
        )
    }

    /// Statuses from which `next` may be applied. Stores use this as the
    /// guard of their conditional update.
    pub fn sources_of(next: OrderStatus) -> Vec<OrderStatus> {
        Self::ALL
            .into_iter()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access granted to the paying user once an order is paid.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Entitlement {
    /// One entitlement per order.
    #[serde(rename = "_id", with = "uuid_1_as_binary")]
    pub order_id: Uuid,
    pub user_id: Option<String>,
    /// Booking or feature the payment unlocks, taken from the order
    /// metadata when present.
    pub resource: Option<String>,
    pub payment_id: String,
    pub granted_at: DateTime,
}

impl Entitlement {
    pub fn for_order(order: &Order) -> Self {
        let resource = order
            .metadata
            .as_ref()
            .and_then(|m| m.get("appointment_id").or_else(|| m.get("resource")))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        Self {
            order_id: order.id,
            user_id: order.user_id.clone(),
            resource,
            payment_id: order.payment_id.clone().unwrap_or_default(),
            granted_at: DateTime::now(),
        }
    }
}
