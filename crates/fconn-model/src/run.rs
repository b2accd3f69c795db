// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Run orchestration
//!
//! The single entry point the wrapper layer calls: screen the cohort, run
//! nested cross-validation, aggregate. Configuration arrives as an already
//! validated value and the seed is an explicit argument; nothing here reads
//! files or environment variables.

use tracing::info;

use fconn_config::{validate_config, ConfigError, RunConfig};
use fconn_core::dataset::{Dataset, Subject};
use fconn_core::error::Result;

use crate::aggregate::{ResultAggregator, RunOutput};
use crate::selector::ModelSelector;

/// Execute the full pipeline on a raw subject list.
///
/// # Arguments
/// * `subjects` - the loaded cohort, pre-screening
/// * `config` - validated run configuration (re-validated here defensively)
/// * `seed` - top-level seed; all stochastic components derive from it
///
/// # Errors
///
/// Fatal configuration problems, an unusable cohort, or a fold where every
/// hyperparameter candidate failed.
pub fn run_pipeline(subjects: Vec<Subject>, config: RunConfig, seed: u64) -> Result<RunOutput> {
    validate_config(&config)?;

    let (dataset, exclusions) = Dataset::screen(subjects, &config)?;
    info!(
        subjects = dataset.len(),
        excluded = exclusions.len(),
        regions = dataset.num_regions(),
        sites = dataset.site_counts().len(),
        "cohort screened"
    );

    let classes = dataset.classes();
    if classes.len() != 2 {
        return Err(ConfigError::InvalidValue(format!(
            "diagnosis label must be binary, found {} classes",
            classes.len()
        ))
        .into());
    }
    let positive_class = classes[1];

    let num_workers = config.system.num_workers;
    let execute = move || -> Result<RunOutput> {
        let selector = ModelSelector::new(&config, seed, positive_class);
        let folds = selector.run(&dataset)?;
        ResultAggregator::aggregate(config, seed, &dataset, exclusions, folds, positive_class)
    };

    if num_workers > 0 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_workers)
            .build()
            .map_err(|e| ConfigError::InvalidValue(format!("worker pool: {}", e)))?;
        pool.install(execute)
    } else {
        execute()
    }
}
