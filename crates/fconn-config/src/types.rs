// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! This module defines all configuration structs that map to sections of a
//! run-configuration TOML document. Every recognized option is enumerated
//! here; unknown strings fail at parse time rather than deep inside a fold.

use serde::{Deserialize, Serialize};

/// Root run configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RunConfig {
    pub cohort: CohortConfig,
    pub connectivity: ConnectivityConfig,
    pub tangent: TangentConfig,
    pub adaptation: AdaptationConfig,
    pub classifier: ClassifierConfig,
    pub search: SearchConfig,
    pub split: SplitConfig,
    pub scoring: ScoringConfig,
    pub system: SystemConfig,
}

/// Cohort screening thresholds
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CohortConfig {
    /// Expected region count R; `None` accepts whatever the first subject has
    pub expected_regions: Option<usize>,
    /// Minimum surviving subjects per diagnosis class after exclusions
    pub min_class_samples: usize,
}

impl Default for CohortConfig {
    fn default() -> Self {
        Self {
            expected_regions: None,
            min_class_samples: 2,
        }
    }
}

/// First-order connectivity measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasureKind {
    Pearson,
    Covariance,
    Precision,
}

/// First-order connectivity extraction configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    pub measure: MeasureKind,
    /// Shrinkage coefficients searched by the inner loop, each in [0, 1)
    pub shrinkage_grid: Vec<f64>,
    /// Column variance below this is treated as zero (degenerate region)
    pub variance_floor: f64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            measure: MeasureKind::Pearson,
            shrinkage_grid: vec![0.01, 0.05, 0.1],
            variance_floor: 1e-10,
        }
    }
}

/// Geometric (Karcher) mean iteration bounds
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TangentConfig {
    /// Convergence threshold on the Frobenius norm of the mean log
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for TangentConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-7,
            max_iterations: 50,
        }
    }
}

/// What to do with sites below `min_site_samples` in a training partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SmallSitePolicy {
    /// Pool undersized sites into a shared "other" bucket before fitting
    Merge,
    /// Fail the run with a `ConfigError`
    Fail,
}

/// Site adaptation configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AdaptationConfig {
    /// Adaptation strengths searched by the inner loop, each in [0, 1]
    pub strength_grid: Vec<f64>,
    /// Minimum training subjects a site needs for its own statistics
    pub min_site_samples: usize,
    pub small_site_policy: SmallSitePolicy,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            strength_grid: vec![0.0, 0.5, 1.0],
            min_site_samples: 3,
            small_site_policy: SmallSitePolicy::Merge,
        }
    }
}

/// Classifier family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    Ridge,
    Logistic,
}

/// Classifier configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub kind: ClassifierKind,
    /// L2 regularization strengths searched by the inner loop, each > 0
    pub regularization_grid: Vec<f64>,
    /// Iteration cap for iterative solvers (ignored by closed-form ridge)
    pub num_solver_iterations: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            kind: ClassifierKind::Ridge,
            regularization_grid: vec![0.01, 0.1, 1.0, 10.0, 100.0],
            num_solver_iterations: 100,
        }
    }
}

/// Hyperparameter search strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// Exhaustive sweep over the full candidate grid
    Grid,
    /// Uniform sample of `num_search_iterations` candidates from the grid
    Random,
}

/// Hyperparameter search configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SearchConfig {
    pub strategy: SearchStrategy,
    /// Candidate budget for `SearchStrategy::Random`
    pub num_search_iterations: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            strategy: SearchStrategy::Grid,
            num_search_iterations: 10,
        }
    }
}

/// Outer resampling strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategyKind {
    /// K-fold stratified jointly by (diagnosis, site), optionally repeated
    Stratified,
    /// Every combination of `num_test_sites` sites held out as the test set
    LeaveSitesOut,
}

/// Cross-validation split configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SplitConfig {
    pub strategy: SplitStrategyKind,
    pub outer_folds: usize,
    /// Outer repetitions (stratified strategy only)
    pub num_repeats: usize,
    /// Inner folds; 1 degenerates to resubstitution scoring for tiny cohorts
    pub inner_folds: usize,
    /// Sites held out per fold (leave-sites-out strategy only)
    pub num_test_sites: usize,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            strategy: SplitStrategyKind::Stratified,
            outer_folds: 5,
            num_repeats: 1,
            inner_folds: 3,
            num_test_sites: 1,
        }
    }
}

/// Selection/evaluation metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Accuracy,
    BalancedAccuracy,
    RocAuc,
}

/// Scoring configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Metric that drives candidate selection; all metrics are still reported
    pub metric: Metric,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            metric: Metric::BalancedAccuracy,
        }
    }
}

/// System-level configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Worker threads for per-subject and per-candidate fan-out; 0 = auto
    pub num_workers: usize,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self { num_workers: 0 }
    }
}
