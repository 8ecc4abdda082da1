//! Structured logging for hosts embedding the session codec.
//!
//! The codec itself only emits `tracing` events; installing a subscriber is
//! the host's call. [`init_from_config`] is the usual entry point.
//!
//! # Telemetry invariants
//!
//! - **No secret material** (entropy, session IDs, derived keys, plaintext)
//!   may appear in any log field. Storage keys and cipher names may.
//! - Log level comes from configuration; `RUST_LOG` overrides it.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::config::SessionConfig;

/// Build the level filter for `log_level`, letting `RUST_LOG` take precedence.
///
/// # Errors
///
/// Returns an error if `log_level` is not a valid filter directive. An
/// invalid `RUST_LOG` is ignored in favour of `log_level`.
pub fn filter(log_level: &str) -> Result<EnvFilter> {
    let configured = EnvFilter::try_new(log_level)
        .with_context(|| format!("invalid log filter {log_level:?}"))?;
    Ok(EnvFilter::try_from_default_env().unwrap_or(configured))
}

/// Initialise the global JSON subscriber at `log_level`.
///
/// # Errors
///
/// Returns an error if `log_level` is invalid or a global subscriber has
/// already been set.
pub fn init(log_level: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter(log_level)?)
        .try_init()
        .map_err(|e| anyhow::anyhow!("session-seal tracing subscriber already installed: {e}"))
}

/// Initialise logging at the level named by `config.log_level`.
pub fn init_from_config(config: &SessionConfig) -> Result<()> {
    init(&config.log_level)
}
