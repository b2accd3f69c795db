// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # fconn - Tangent-Space Functional Connectivity Pipeline
//!
//! Second-order ("Tangent Pearson") functional-connectivity features from
//! per-subject brain-region time series, multi-site bias correction via
//! domain adaptation, and classifier selection through nested
//! cross-validation.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! fconn = "0.1"
//! ```
//!
//! ```rust,no_run
//! use fconn::{run_pipeline, RunConfig, Subject};
//!
//! # fn load_subjects() -> Vec<Subject> { Vec::new() }
//! let subjects = load_subjects(); // from the data-loading layer
//! let config = RunConfig::from_toml_str("[split]\nouter_folds = 5").unwrap();
//! let output = run_pipeline(subjects, config, 42).unwrap();
//! println!("mean test score: {:.3}", output.summary.mean_test_score);
//! ```
//!
//! ## Components
//!
//! - [`fconn_core`]: connectivity extraction, tangent geometry, second-order
//!   features, site adaptation
//! - [`fconn_model`]: splitters, classifiers, nested CV selection,
//!   aggregation
//! - [`fconn_config`]: validated run configuration
//! - [`fconn_observability`]: logging initialization for wrapper binaries
//!
//! ## Reproducibility
//!
//! Every stochastic component draws from a stream derived from the single
//! top-level seed, so two runs over the same dataset with the same seed
//! produce bit-identical summaries and fitted parameters, independent of
//! worker count.

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use fconn_config as config;
pub use fconn_core as core;
pub use fconn_model as model;
pub use fconn_observability as observability;

// The working set, flattened for the common case
pub use fconn_config::{RunConfig, SmallSitePolicy};
pub use fconn_core::{
    Dataset, ExclusionRecord, FconnError, Result, SiteAdapter, Subject, SubjectMeta,
    TangentProjector,
};
pub use fconn_model::{
    run_pipeline, Candidate, FittedPipeline, FoldResult, ModelSelector, ResultAggregator,
    RunOutput, RunSummary,
};
