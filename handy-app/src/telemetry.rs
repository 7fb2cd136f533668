//! Tracing initialization.

use handy_core::{ConfigError, LoggingConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const HANDY_TARGETS: &[&str] = &[
    "handy_app",
    "handy_core",
    "handy_query",
    "handy_session",
    "handy_storage",
];

/// Filter used when `RUST_LOG` is not set: the configured level for Handy
/// crates, `warn` for everything else.
pub fn default_directive(config: &LoggingConfig) -> String {
    let level = config.level.to_ascii_lowercase();
    let mut directives: Vec<String> = HANDY_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect();
    directives.push("warn".to_string());
    directives.join(",")
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the configured level. Output is JSON when
/// `logging.json` is set. Fails if a global subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), ConfigError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config)));

    let json_layer = config.json.then(|| tracing_subscriber::fmt::layer().json());
    let text_layer = (!config.json).then(|| tracing_subscriber::fmt::layer());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e| ConfigError::InvalidValue {
            field: "logging".to_string(),
            reason: format!("failed to install subscriber: {e}"),
        })?;

    tracing::info!(level = %config.level, json = config.json, "Tracing initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        let config = LoggingConfig {
            level: "DEBUG".to_string(),
            json: false,
        };
        let directive = default_directive(&config);
        assert!(directive.starts_with("handy_app=debug,"));
        assert!(directive.contains("handy_storage=debug"));
        assert!(directive.ends_with(",warn"));
    }

    #[test]
    fn test_second_init_is_rejected() {
        let config = LoggingConfig {
            level: "info".to_string(),
            json: true,
        };
        let _ = init_tracing(&config);
        let err = init_tracing(&config).expect_err("subscriber already installed");
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "logging"));
    }
}
