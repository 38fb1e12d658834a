use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::{Mutex, OnceLock};

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Install the process-wide Prometheus recorder. Safe to call more than
/// once, including concurrently; later calls are no-ops.
pub fn init_metrics() -> anyhow::Result<()> {
    // Check and install under one lock: the global recorder can only be
    // set once per process.
    let _guard = INIT_LOCK
        .lock()
        .map_err(|_| anyhow::anyhow!("metrics init lock poisoned"))?;

    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus recorder: {}", e))?;

    METRICS_HANDLE
        .set(handle)
        .map_err(|_| anyhow::anyhow!("Prometheus handle already set"))?;
    Ok(())
}

pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

/// Count a processed webhook delivery.
pub fn record_webhook(event: &'static str, outcome: &'static str) {
    counter!("payment_webhook_events_total", "event" => event, "outcome" => outcome).increment(1);
}

/// Count an order created with Razorpay.
pub fn record_order_created(currency: &str) {
    counter!("payment_orders_created_total", "currency" => currency.to_string()).increment(1);
}
