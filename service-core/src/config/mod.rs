use crate::error::AppError;
use config::{Config as Cfg, Environment, File};
use serde::de::DeserializeOwned;

/// Load a service configuration from an optional `configuration` file
/// layered under environment variables.
///
/// Nested keys use `__` as separator, e.g. `PAYMENTS__SERVER__PORT=3003`.
pub fn load<T: DeserializeOwned>(env_prefix: &str) -> Result<T, AppError> {
    dotenvy::dotenv().ok();

    let config = Cfg::builder()
        .add_source(File::with_name("configuration").required(false))
        .add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    Ok(config.try_deserialize()?)
}
