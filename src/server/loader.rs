//! Configuration loading
//!
//! Handles loading configuration from embedded defaults, files, and environment.

use super::config::AppConfig;
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};

/// Embedded default configuration (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../../config/default.toml");

/// Environment variable prefix, e.g. `KUBECAST_SERVER__PORT`
pub const ENV_PREFIX: &str = "KUBECAST";

/// Load configuration from files and environment
pub fn load_config() -> Result<AppConfig> {
    load_config_with(env_source())
}

fn env_source() -> Environment {
    // prefix_separator("_") keeps KUBECAST_HUB__QUEUE_CAPACITY working; config-rs
    // otherwise reuses "__" after the prefix as well
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn load_config_with(environment: Environment) -> Result<AppConfig> {
    let profile = std::env::var("KUBECAST_ENV").unwrap_or_else(|_| "development".to_string());

    let config = Config::builder()
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{profile}")).required(false))
        .add_source(File::with_name("config/local").required(false))
        .add_source(environment)
        .build()
        .context("Failed to build configuration")?;

    let app: AppConfig = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;
    app.validate().context("Invalid configuration")?;
    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubecast_core::OverflowPolicy;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        load_config_with(env_source().source(Some(vars)))
    }

    #[test]
    fn test_embedded_defaults() {
        let config = load(&[]).unwrap();
        let defaults = AppConfig::default();

        assert_eq!(config.server.port, defaults.server.port);
        assert_eq!(config.server.path, defaults.server.path);
        assert_eq!(config.hub.queue_capacity, defaults.hub.queue_capacity);
        assert_eq!(config.hub.overflow_policy, defaults.hub.overflow_policy);
        assert_eq!(config.watch.timeout_secs, defaults.watch.timeout_secs);
        assert_eq!(config.shutdown.grace_secs, defaults.shutdown.grace_secs);
    }

    #[test]
    fn test_environment_overrides() {
        let config = load(&[
            ("KUBECAST_SERVER__PORT", "9000"),
            ("KUBECAST_HUB__OVERFLOW_POLICY", "drop_oldest"),
            ("KUBECAST_HUB__QUEUE_CAPACITY", "16"),
            ("KUBECAST_WATCH__NAMESPACE", "payments"),
        ])
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.hub.overflow_policy, OverflowPolicy::DropOldest);
        assert_eq!(config.hub.queue_capacity, 16);
        assert_eq!(config.watch.namespace, "payments");
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        assert!(load(&[("KUBECAST_HUB__QUEUE_CAPACITY", "0")]).is_err());
        assert!(load(&[("KUBECAST_HUB__OVERFLOW_POLICY", "block")]).is_err());
    }
}
