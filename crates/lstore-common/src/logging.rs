//! Tracing subscriber setup

use tracing::Subscriber;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Build the fmt subscriber for `config`. `RUST_LOG` overrides the configured level.
pub fn subscriber(config: &LoggingConfig) -> Result<Box<dyn Subscriber + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| Error::Config(format!("Invalid log filter '{}': {}", config.level, e)))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    Ok(if config.json {
        Box::new(builder.json().finish())
    } else {
        Box::new(builder.finish())
    })
}

/// Install the subscriber for `config` as the global default
pub fn init(config: &LoggingConfig) -> Result<()> {
    tracing::subscriber::set_global_default(subscriber(config)?)
        .map_err(|e| Error::Internal(format!("Failed to install subscriber: {}", e)))?;
    tracing::debug!(level = %config.level, json = config.json, "logging initialized");
    Ok(())
}

/// Install a test-writer subscriber, ignoring the error if one is already set
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lstore=debug")),
        )
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_is_config_error() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = LoggingConfig {
            level: "lstore=notalevel".to_string(),
            json: false,
        };
        assert!(matches!(init(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_subscriber_builds_plain_and_json() {
        for json in [false, true] {
            let config = LoggingConfig {
                level: "lstore=debug".to_string(),
                json,
            };
            let subscriber = subscriber(&config).unwrap();
            tracing::subscriber::with_default(subscriber, || {
                tracing::info!(json, "scoped subscriber");
            });
        }
    }

    #[test]
    fn test_init_for_tests_is_idempotent() {
        init_for_tests();
        init_for_tests();
        tracing::debug!("subscriber installed");
    }
}
