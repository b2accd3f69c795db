// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # fconn-observability
//!
//! Unified observability infrastructure for fconn (logging initialization).
//!
//! Library crates only emit `tracing` events; this crate is the one place a
//! subscriber gets installed. The wrapper binary calls [`init_logging`] (or
//! [`init_logging_default`]) once at startup; artifact and metrics surfaces
//! live outside the pipeline entirely.

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod init;

// Re-export commonly used items
pub use init::*;

/// Known fconn crate names for per-crate filtering
pub const KNOWN_CRATES: &[&str] = &[
    "fconn",
    "fconn-config",
    "fconn-core",
    "fconn-model",
];
