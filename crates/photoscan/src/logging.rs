//! Tracing subscriber setup.
//!
//! `log` records from the worker pool and database layer are bridged into
//! tracing by the subscriber's `tracing-log` integration.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Builds the filter: `RUST_LOG` wins, then the configured directive.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("photoscan=info"))
}

/// Installs the global subscriber.
///
/// Returns `false` when a subscriber was already installed, so calling this
/// more than once (tests, embedding hosts) is harmless.
pub fn init(config: &LoggingConfig) -> bool {
    let (pretty, json) = match config.format {
        LogFormat::Pretty => (Some(tracing_subscriber::fmt::layer().with_target(true)), None),
        LogFormat::Json => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(pretty)
        .with(json)
        .try_init()
        .is_ok()
}
