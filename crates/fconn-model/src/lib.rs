// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # fconn Model Selection
//!
//! Nested cross-validation on top of `fconn-core`:
//! - **Split**: stratified K-fold (joint diagnosis × site strata, optional
//!   repeats) and leave-p-sites-out
//! - **Classifier**: deterministic linear models (ridge, logistic)
//! - **Scoring**: accuracy, balanced accuracy, rank-based ROC-AUC
//! - **Pipeline**: the fused extract→project→correlate→adapt→classify unit
//! - **Selector**: inner-loop hyperparameter search with NaN-on-failure
//!   candidate semantics
//! - **Aggregate**: run summary plus the final full-cohort refit

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod aggregate;
pub mod classifier;
pub mod pipeline;
pub mod run;
pub mod scoring;
pub mod selector;
pub mod split;

// Re-export the working set
pub use aggregate::{ResultAggregator, RunOutput, RunSummary};
pub use classifier::{fit_classifier, FittedClassifier};
pub use pipeline::{fit_pipeline, Candidate, FittedPipeline};
pub use run::run_pipeline;
pub use scoring::{evaluate, ScoreSet};
pub use selector::{CandidateReport, FoldResult, ModelSelector};
pub use split::{inner_splits, outer_splits, FoldIndices};
