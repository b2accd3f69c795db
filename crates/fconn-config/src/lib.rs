// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # fconn Configuration System
//!
//! Type-safe run configuration for the tangent-connectivity pipeline:
//! - TOML parsing from caller-provided text (no file discovery here; the
//!   wrapper layer owns paths and environment handling)
//! - Explicit, enumerated hyperparameter options
//! - Eager validation: a `RunConfig` that reaches the pipeline is valid
//!
//! ## Usage
//!
//! ```rust
//! use fconn_config::RunConfig;
//!
//! let config = RunConfig::from_toml_str("[split]\nouter_folds = 5").unwrap();
//! assert_eq!(config.split.outer_folds, 5);
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod loader;
pub mod types;
pub mod validation;

pub use types::*;
pub use validation::{validate_config, ConfigValidationError};

/// Re-export for convenience
pub use serde;

/// Configuration error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid TOML syntax: {0}")]
    ParseError(String),

    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Insufficient samples for {group} '{name}': {actual} < {required}")]
    InsufficientSamples {
        group: &'static str,
        name: String,
        actual: usize,
        required: usize,
    },
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
