//! services/app/src/telemetry.rs
//!
//! Tracing subscriber setup: an env-filter at the configured level and either
//! human-readable or JSON log lines.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, LogFormat};

/// Initialise the global tracing subscriber. Call once, at startup.
pub fn init_tracing(config: &Config) {
    let env_filter = tracing_subscriber::EnvFilter::new(config.log_level.to_string());
    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}
