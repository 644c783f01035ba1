// crates/tenant-gate-cli/src/logging.rs
// ============================================================================
// Module: Logging
// Description: Process-wide tracing subscriber setup.
// Purpose: Route engine and store events to stderr in text or JSON form.
// Dependencies: tenant-gate-config, tracing-subscriber
// ============================================================================

//! ## Overview
//! `RUST_LOG` wins over `[logging].level`. Events go to stderr so command
//! output on stdout stays machine-readable.

use tenant_gate_config::LogFormat;
use tenant_gate_config::LoggingConfig;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Logging setup errors.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// Level directive could not be parsed.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// A global subscriber is already installed.
    #[error("failed to install log subscriber: {0}")]
    Install(String),
}

/// Builds the level filter, preferring `RUST_LOG` when it is set and valid.
///
/// # Errors
///
/// Returns [`LoggingError::Filter`] when the configured level is not a valid
/// directive.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(config.level.trim().to_ascii_lowercase())
        .map_err(|err| LoggingError::Filter(err.to_string()))
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns [`LoggingError`] when the filter is invalid or a subscriber is
/// already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = build_filter(config)?;
    let builder =
        tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    let installed = match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|err| LoggingError::Install(err.to_string()))
}
