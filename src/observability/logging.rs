//! # Structured Logging
//!
//! Sets up the global `tracing` subscriber from [`LoggingConfig`].
//!
//! `RUST_LOG` takes precedence over the configured level. Request and response bodies,
//! `Authorization` headers and bearer tokens are never recorded by any gateway span or
//! event; the HTTP trace layer is left at its defaults, which omit headers.

use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::core::config::LoggingConfig;

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    pub fn parse(format: &str) -> Self {
        match format.to_lowercase().as_str() {
            "text" => Self::Text,
            _ => Self::Json,
        }
    }
}

/// Build the filter: `RUST_LOG` if set, otherwise the configured level for this crate
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "intake_gateway={level},tower_http={level}",
            level = config.level.to_lowercase()
        ))
    })
}

/// Initialize the tracing subscriber
///
/// Calling this twice is harmless: the second call logs a warning and keeps the
/// subscriber that is already installed.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = env_filter(config);

    let result = match LogFormat::parse(&config.format) {
        LogFormat::Json => Registry::default()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init(),
        LogFormat::Text => Registry::default()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init(),
    };

    match result {
        Ok(()) => info!(
            level = %config.level,
            format = %config.format,
            "Structured logging initialized"
        ),
        Err(_) => warn!("Tracing subscriber already initialized, skipping initialization"),
    }
}
