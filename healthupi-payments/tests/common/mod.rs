#![allow(dead_code)]

use async_trait::async_trait;
use healthupi_payments::config::{
    Config, DatabaseConfig, NotificationConfig, ObservabilityConfig, RazorpayConfig, ServerConfig,
};
use healthupi_payments::models::Order;
use healthupi_payments::services::{
    ConfirmationNotifier, EntitlementGranter, InMemoryOrderStore, OrderStore,
};
use healthupi_payments::{build_router, AppState};
use secrecy::Secret;
use service_core::utils::signature::generate_signature;
use mongodb::bson::doc;
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const TEST_USER_ID: &str = "patient-123";
pub const KEY_SECRET: &str = "test_key_secret";
pub const WEBHOOK_SECRET: &str = "test_webhook_secret";

#[derive(Default)]
pub struct CountingEntitlements {
    calls: AtomicUsize,
}

impl CountingEntitlements {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EntitlementGranter for CountingEntitlements {
    async fn grant(&self, _order: &Order) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct CountingNotifier {
    calls: AtomicUsize,
    fail: bool,
}

impl CountingNotifier {
    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfirmationNotifier for CountingNotifier {
    async fn notify_paid(&self, _order: &Order) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("notification service unavailable");
        }
        Ok(())
    }
}

/// Reads go to the wrapped store; every status write fails.
pub struct BrokenWrites {
    inner: Arc<InMemoryOrderStore>,
}

#[async_trait]
impl OrderStore for BrokenWrites {
    async fn insert(&self, order: &Order) -> anyhow::Result<()> {
        self.inner.insert(order).await
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Order>> {
        self.inner.get(id).await
    }

    async fn find_by_provider_order_id(
        &self,
        provider_order_id: &str,
    ) -> anyhow::Result<Option<Order>> {
        self.inner.find_by_provider_order_id(provider_order_id).await
    }

    async fn mark_paid(
        &self,
        _provider_order_id: &str,
        _payment_id: Option<&str>,
    ) -> anyhow::Result<Option<Order>> {
        anyhow::bail!("primary stepped down")
    }

    async fn mark_failed(
        &self,
        _provider_order_id: &str,
        _reason: Option<&str>,
    ) -> anyhow::Result<bool> {
        anyhow::bail!("primary stepped down")
    }
}

#[derive(Default)]
pub struct TestOptions {
    pub razorpay_base_url: Option<String>,
    pub broken_writes: bool,
    pub failing_notifier: bool,
}

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub store: Arc<InMemoryOrderStore>,
    pub entitlements: Arc<CountingEntitlements>,
    pub notifier: Arc<CountingNotifier>,
}

pub fn test_config(razorpay_base_url: &str) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        database: DatabaseConfig {
            url: Secret::new("mongodb://localhost:27017".to_string()),
            db_name: "healthupi_payments_test".to_string(),
        },
        razorpay: RazorpayConfig {
            key_id: "rzp_test_key".to_string(),
            key_secret: Secret::new(KEY_SECRET.to_string()),
            webhook_secret: Secret::new(WEBHOOK_SECRET.to_string()),
            api_base_url: razorpay_base_url.to_string(),
        },
        notification: NotificationConfig::default(),
        observability: ObservabilityConfig::default(),
        service_name: "healthupi-payments-test".to_string(),
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(TestOptions::default()).await
    }

    pub async fn spawn_with(options: TestOptions) -> Self {
        let config = test_config(
            options
                .razorpay_base_url
                .as_deref()
                .unwrap_or("http://127.0.0.1:9"),
        );

        let store = Arc::new(InMemoryOrderStore::new());
        let entitlements = Arc::new(CountingEntitlements::default());
        let notifier = Arc::new(if options.failing_notifier {
            CountingNotifier::failing()
        } else {
            CountingNotifier::default()
        });

        let orders: Arc<dyn OrderStore> = if options.broken_writes {
            Arc::new(BrokenWrites {
                inner: Arc::clone(&store),
            })
        } else {
            store.clone()
        };

        let state = AppState::new(config, orders, entitlements.clone(), notifier.clone());
        let router = build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });

        TestApp {
            address: format!("http://127.0.0.1:{}", port),
            client: reqwest::Client::new(),
            store,
            entitlements,
            notifier,
        }
    }

    /// Insert an order in `created`, as the order-creation step would.
    pub async fn seed_order(&self, provider_order_id: &str, amount: i64) -> Order {
        let order = Order::new(
            provider_order_id.to_string(),
            amount,
            "INR".to_string(),
            Some(TEST_USER_ID.to_string()),
            Some(serde_json::json!({ "appointment_id": "appt-1" })),
        );
        self.store.insert(&order).await.expect("Failed to seed order");
        order
    }

    pub async fn order(&self, provider_order_id: &str) -> Order {
        self.store
            .find_by_provider_order_id(provider_order_id)
            .await
            .unwrap()
            .expect("order should exist")
    }

    pub async fn post_webhook(&self, body: &str, signature: Option<&str>) -> reqwest::Response {
        let mut request = self
            .client
            .post(format!("{}/webhooks/razorpay", self.address))
            .header("content-type", "application/json")
            .body(body.to_string());
        if let Some(signature) = signature {
            request = request.header("X-Razorpay-Signature", signature);
        }
        request.send().await.expect("Failed to execute request")
    }

    pub async fn post_signed_webhook(&self, body: &str) -> reqwest::Response {
        let signature = sign(WEBHOOK_SECRET, body);
        self.post_webhook(body, Some(&signature)).await
    }
}

pub fn sign(secret: &str, payload: &str) -> String {
    generate_signature(secret, payload.as_bytes()).unwrap()
}

pub fn captured_event(order_id: &str, payment_id: &str) -> String {
    serde_json::json!({
        "entity": "event",
        "account_id": "acc_test",
        "event": "payment.captured",
        "contains": ["payment"],
        "payload": {
            "payment": {
                "entity": {
                    "id": payment_id,
                    "entity": "payment",
                    "amount": 50000,
                    "currency": "INR",
                    "status": "captured",
                    "order_id": order_id,
                    "method": "upi",
                    "captured": true
                }
            }
        },
        "created_at": 1700000000
    })
    .to_string()
}

pub fn failed_event(order_id: &str) -> String {
    serde_json::json!({
        "entity": "event",
        "account_id": "acc_test",
        "event": "payment.failed",
        "contains": ["payment"],
        "payload": {
            "payment": {
                "entity": {
                    "id": "pay_failed_1",
                    "entity": "payment",
                    "amount": 50000,
                    "currency": "INR",
                    "status": "failed",
                    "order_id": order_id,
                    "error_code": "BAD_REQUEST_ERROR",
                    "error_description": "Payment was declined by the bank"
                }
            }
        },
        "created_at": 1700000000
    })
    .to_string()
}

/// A throwaway database on the MongoDB named by `TEST_MONGODB_URI`
/// (default `mongodb://localhost:27017`).
pub struct TestDb {
    pub db: Database,
}

impl TestDb {
    /// `None` when no server answers, so the Mongo-backed tests skip on
    /// machines without one.
    pub async fn connect() -> Option<Self> {
        let uri = std::env::var("TEST_MONGODB_URI")
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());

        let mut options = ClientOptions::parse(&uri)
            .await
            .expect("Invalid TEST_MONGODB_URI");
        options.server_selection_timeout = Some(Duration::from_secs(2));
        let client = Client::with_options(options).expect("Failed to build MongoDB client");

        let db = client.database(&format!("payments_test_{}", Uuid::new_v4().simple()));
        if let Err(e) = db.run_command(doc! { "ping": 1 }, None).await {
            eprintln!("skipping: MongoDB not reachable at {}: {}", uri, e);
            return None;
        }

        Some(Self { db })
    }

    pub async fn cleanup(self) {
        let _ = self.db.drop(None).await;
    }
}
