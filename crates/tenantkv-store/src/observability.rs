//! Tracing setup for processes embedding the access layer.
//!
//! The filter is installed behind a reload layer so an operator can change
//! verbosity after startup without reinstalling the subscriber.

use std::sync::OnceLock;
use tenantkv_config::LoggingConfig;
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

static LOG_RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, tracing_subscriber::Registry>> =
    OnceLock::new();

/// Build the filter for `level`, letting `RUST_LOG` win when it parses.
fn filter_for(level: &str) -> EnvFilter {
    std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level))
}

/// Install the global subscriber from logging configuration.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    init_tracing_with_level(&config.level)
}

/// Install the global subscriber with `level` as the default filter.
///
/// Returns `false` if a global subscriber was already installed, in which
/// case the existing one is left untouched.
pub fn init_tracing_with_level(level: &str) -> bool {
    let (reload_layer, handle) = reload::Layer::new(filter_for(level));

    let installed = tracing_subscriber::registry()
        .with(reload_layer)
        .with(fmt::layer().with_target(true))
        .try_init()
        .is_ok();

    if installed {
        let _ = LOG_RELOAD_HANDLE.set(handle);
        tracing::debug!(level, "tracing initialized");
    }
    installed
}

/// Swap the active filter. No-op when [`init_tracing`] did not install the
/// subscriber.
pub fn apply_logging_level(level: &str) {
    if let Some(handle) = LOG_RELOAD_HANDLE.get() {
        if let Err(e) = handle.modify(|f| *f = EnvFilter::new(level)) {
            tracing::warn!(error = %e, level, "failed to apply logging level");
        }
    }
}
