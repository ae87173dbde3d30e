//! Diagnostics bootstrap for hosts that do not install their own subscriber.

use crate::config::{LogFormat, LogLevel};
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Noisy dependencies kept at `warn` regardless of the requested level.
const DEFAULT_DIRECTIVES: &[(&str, LogLevel)] = &[
    ("hyper", LogLevel::Warn),
    ("hyper_util", LogLevel::Warn),
    ("reqwest", LogLevel::Warn),
    ("h2", LogLevel::Warn),
    ("tower", LogLevel::Warn),
];

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid filter '{filter}': {message}")]
    InvalidFilter { filter: String, message: String },
    #[error("A global subscriber is already installed: {0}")]
    AlreadyInitialized(String),
}

/// Builds the filter string: the default level followed by the per-target
/// overrides.
pub fn build_filter_string(level: LogLevel) -> String {
    std::iter::once(level.as_str().to_string())
        .chain(
            DEFAULT_DIRECTIVES
                .iter()
                .map(|(target, level)| format!("{target}={}", level.as_str())),
        )
        .collect::<Vec<_>>()
        .join(",")
}

/// Installs a global `tracing` subscriber.
///
/// `RUST_LOG` wins over `level` when set.
pub fn init_tracing(level: LogLevel, format: LogFormat) -> Result<(), LoggingError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let filter = build_filter_string(level);
            EnvFilter::try_new(&filter).map_err(|e| LoggingError::InvalidFilter {
                filter,
                message: e.to_string(),
            })?
        }
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match format {
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_target(true).with_thread_ids(false))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init(),
    };

    result.map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}
