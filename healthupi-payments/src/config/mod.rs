use anyhow::{bail, Result};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

/// Environment prefix for every setting, e.g. `PAYMENTS__SERVER__PORT`.
pub const ENV_PREFIX: &str = "PAYMENTS";

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub razorpay: RazorpayConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    #[serde(default = "default_db_name")]
    pub db_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: Secret<String>,
    pub webhook_secret: Secret<String>,
    #[serde(default = "default_razorpay_base_url")]
    pub api_base_url: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct NotificationConfig {
    /// Notification service endpoint for payment confirmations. Unset
    /// means confirmations are skipped.
    pub endpoint: Option<String>,
    #[serde(default = "default_notification_timeout")]
    pub timeout_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: default_notification_timeout(),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            otlp_endpoint: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3003
}

fn default_db_name() -> String {
    "healthupi_payments".to_string()
}

fn default_razorpay_base_url() -> String {
    "https://api.razorpay.com/v1".to_string()
}

fn default_notification_timeout() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info,healthupi_payments=debug".to_string()
}

fn default_service_name() -> String {
    "healthupi-payments".to_string()
}

impl Config {
    /// Load from `configuration.*` and `PAYMENTS__*` environment variables,
    /// then validate.
    pub fn from_env() -> Result<Self> {
        let config: Config = service_core::config::load(ENV_PREFIX)?;
        config.validate()?;
        Ok(config)
    }

    /// Refuse to start without the credentials every payment path needs.
    pub fn validate(&self) -> Result<()> {
        if self.razorpay.webhook_secret.expose_secret().is_empty() {
            bail!("razorpay.webhook_secret must be set");
        }
        if self.razorpay.key_id.is_empty() || self.razorpay.key_secret.expose_secret().is_empty() {
            bail!("razorpay.key_id and razorpay.key_secret must be set");
        }
        if self.database.url.expose_secret().is_empty() {
            bail!("database.url must be set");
        }
        Ok(())
    }
}
