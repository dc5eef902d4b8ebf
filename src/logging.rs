//! Structured logging setup.
//!
//! Logs go to stderr so that decoding results on stdout stay machine-readable.

use tracing::info;
use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Registry,
};

use crate::error::{DecoderError, Result};

/// Configuration for log output.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    pub log_level: String,
    /// Emit one JSON object per event instead of compact text.
    pub json: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

impl TracingConfig {
    /// Read overrides from `WFST_LOG_LEVEL` and `WFST_LOG_JSON`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(level) = std::env::var("WFST_LOG_LEVEL") {
            config.log_level = level;
        }
        if let Ok(json) = std::env::var("WFST_LOG_JSON") {
            config.json = matches!(json.as_str(), "1" | "true" | "yes");
        }
        config
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(config: TracingConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let subscriber = Registry::default().with(env_filter);

    let installed = if config.json {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        subscriber
            .with(
                fmt::layer()
                    .compact()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
    installed.map_err(|e| DecoderError::Configuration(format!("cannot install logger: {}", e)))?;

    info!(level = %config.log_level, json = config.json, "logging initialized");
    Ok(())
}
