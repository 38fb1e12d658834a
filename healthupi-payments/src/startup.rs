//! Application startup and lifecycle management.

use crate::config::Config;
use crate::handlers;
use crate::services::{
    init_metrics, ConfirmationNotifier, EntitlementGranter, HttpConfirmationNotifier,
    MongoEntitlements, MongoOrderStore, OrderStore, PaymentProcessor, RazorpayClient,
};
use axum::middleware::from_fn;
use axum::{
    routing::{get, post},
    Router,
};
use mongodb::{options::ClientOptions, Client};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    tracing::{make_request_span, request_id_middleware},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

/// Shared application state. Every client inside is built once at
/// startup and is safe to share across concurrent requests.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub razorpay: RazorpayClient,
    pub orders: Arc<dyn OrderStore>,
    pub processor: PaymentProcessor,
}

impl AppState {
    pub fn new(
        config: Config,
        orders: Arc<dyn OrderStore>,
        entitlements: Arc<dyn EntitlementGranter>,
        notifier: Arc<dyn ConfirmationNotifier>,
    ) -> Self {
        let razorpay = RazorpayClient::new(config.razorpay.clone());
        let processor = PaymentProcessor::new(Arc::clone(&orders), entitlements, notifier);
        Self {
            config,
            razorpay,
            orders,
            processor,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/orders", post(handlers::orders::create_order))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route("/payments/verify", post(handlers::orders::verify_payment))
        .route(
            "/webhooks/razorpay",
            post(handlers::webhooks::razorpay_webhook),
        )
        .route_layer(from_fn(metrics_middleware))
        // A panicking handler becomes a 500, which Razorpay retries.
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span::<axum::body::Body>))
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Connect to MongoDB, build the shared clients, and bind the listener.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        config.validate().map_err(AppError::ConfigError)?;

        init_metrics().map_err(AppError::InternalError)?;

        let mut client_options = ClientOptions::parse(config.database.url.expose_secret())
            .await
            .map_err(|e| {
                tracing::error!("Failed to parse MongoDB connection string: {}", e);
                AppError::DatabaseError(e.into())
            })?;
        client_options.app_name = Some(config.service_name.clone());

        let client = Client::with_options(client_options).map_err(|e| {
            tracing::error!("Failed to create MongoDB client: {}", e);
            AppError::DatabaseError(e.into())
        })?;
        let db = client.database(&config.database.db_name);

        let store = MongoOrderStore::new(&db);
        store.init_indexes().await.map_err(|e| {
            tracing::error!("Failed to initialize database indexes: {}", e);
            AppError::DatabaseError(e)
        })?;

        let entitlements = MongoEntitlements::new(&db);
        let notifier = HttpConfirmationNotifier::new(
            config.notification.endpoint.clone(),
            Duration::from_millis(config.notification.timeout_ms),
        );
        if config.notification.endpoint.is_none() {
            tracing::warn!("Notification endpoint not configured - payment confirmations disabled");
        }

        let state = AppState::new(
            config.clone(),
            Arc::new(store),
            Arc::new(entitlements),
            Arc::new(notifier),
        );
        tracing::info!(key_id = %state.razorpay.key_id(), "Razorpay client initialized");

        let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid listen address: {}", e)))?;
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Payment service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            router: build_router(state),
        })
    }

    /// Port the server is listening on (useful when bound to port 0).
    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router).await
    }
}
