// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # fconn Core Computation
//!
//! ALL per-subject and per-fold feature computation in one place:
//! - **Dataset**: subject model, screening, exclusion records
//! - **Connectivity**: first-order R×R matrices with shrinkage regularization
//! - **Tangent**: Riemannian tangent-space embedding at a training-only
//!   geometric mean
//! - **SecondOrder**: "Tangent Pearson" correlation-of-correlations features
//! - **Adapter**: per-site moment alignment toward the pooled training
//!   distribution
//! - **Rng**: deterministic seed splitting for reproducible parallel runs
//!
//! The no-leakage rule threads through everything here: any statistic fit
//! for a fold (reference point, adaptation transform) is computed from that
//! fold's training indices only, and applying it never mutates it.

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod adapter;
pub mod connectivity;
pub mod dataset;
pub mod error;
pub mod rng;
pub mod second_order;
pub mod spd;
pub mod tangent;

// Re-export the working set
pub use adapter::{SiteAdaptationTransform, SiteAdapter, OTHER_SITE_BUCKET};
pub use connectivity::ConnectivityExtractor;
pub use dataset::{Dataset, ExclusionRecord, Subject, SubjectMeta};
pub use error::{Error, ErrorKind, FconnError, Result};
pub use second_order::{feature_dim, SecondOrderCorrelator};
pub use tangent::{tangent_dim, ReferencePoint, TangentProjector};
