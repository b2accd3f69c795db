// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Unified logging initialization for fconn
//!
//! Installs a console subscriber with an env-filter. Per-crate verbosity is
//! driven by the usual `RUST_LOG` syntax (e.g. `fconn_core=debug,info`).

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Initialize logging with console output
///
/// # Arguments
/// * `filter` - An env-filter directive string; `None` reads `RUST_LOG` and
///   falls back to `info`
///
/// # Errors
///
/// Fails when the filter directive cannot be parsed or a global subscriber
/// is already installed.
pub fn init_logging(filter: Option<&str>) -> Result<()> {
    let env_filter = match filter {
        Some(directives) => EnvFilter::try_new(directives)
            .with_context(|| format!("Invalid log filter directives: {}", directives))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    // Console layer (human-readable)
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_filter(env_filter);

    Registry::default()
        .with(console_layer.boxed())
        .try_init()
        .context("Logging subscriber already installed")?;

    Ok(())
}

/// Initialize logging with default settings
pub fn init_logging_default() -> Result<()> {
    init_logging(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_rejected() {
        assert!(init_logging(Some("fconn_core=notalevel")).is_err());
    }
}
