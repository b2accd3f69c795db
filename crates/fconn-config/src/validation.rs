// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! This module provides validation logic to ensure configuration values are
//! consistent, within valid ranges, and don't conflict with each other.
//! All violations are collected before failing so a bad config reports
//! everything wrong with it at once.

use crate::{ConfigError, ConfigResult, RunConfig, SplitStrategyKind};

/// Validation errors that can occur during config validation
#[derive(Debug, Clone)]
pub enum ConfigValidationError {
    EmptyGrid { field: String },
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyGrid { field } => {
                write!(f, "Hyperparameter grid {} must not be empty", field)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

/// Validate the complete run configuration
///
/// Checks for:
/// - Non-empty hyperparameter grids
/// - Value ranges (shrinkage in [0, 1), strength in [0, 1], regularization > 0)
/// - Split geometry (fold counts, repeats, leave-out site counts)
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` with details if validation fails
pub fn validate_config(config: &RunConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    validate_grids(config, &mut errors);
    validate_value_ranges(config, &mut errors);
    validate_split(config, &mut errors);

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }

    Ok(())
}

fn validate_grids(config: &RunConfig, errors: &mut Vec<ConfigValidationError>) {
    if config.connectivity.shrinkage_grid.is_empty() {
        errors.push(ConfigValidationError::EmptyGrid {
            field: "connectivity.shrinkage_grid".to_string(),
        });
    }
    if config.adaptation.strength_grid.is_empty() {
        errors.push(ConfigValidationError::EmptyGrid {
            field: "adaptation.strength_grid".to_string(),
        });
    }
    if config.classifier.regularization_grid.is_empty() {
        errors.push(ConfigValidationError::EmptyGrid {
            field: "classifier.regularization_grid".to_string(),
        });
    }
}

fn validate_value_ranges(config: &RunConfig, errors: &mut Vec<ConfigValidationError>) {
    for &gamma in &config.connectivity.shrinkage_grid {
        if !gamma.is_finite() || !(0.0..1.0).contains(&gamma) {
            errors.push(ConfigValidationError::InvalidValue {
                field: "connectivity.shrinkage_grid".to_string(),
                reason: format!("shrinkage {} must be in [0, 1)", gamma),
            });
        }
    }

    if !(config.connectivity.variance_floor.is_finite() && config.connectivity.variance_floor > 0.0)
    {
        errors.push(ConfigValidationError::InvalidValue {
            field: "connectivity.variance_floor".to_string(),
            reason: "must be positive and finite".to_string(),
        });
    }

    if !(config.tangent.tolerance.is_finite() && config.tangent.tolerance > 0.0) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "tangent.tolerance".to_string(),
            reason: "must be positive and finite".to_string(),
        });
    }
    if config.tangent.max_iterations == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "tangent.max_iterations".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    for &beta in &config.adaptation.strength_grid {
        if !beta.is_finite() || !(0.0..=1.0).contains(&beta) {
            errors.push(ConfigValidationError::InvalidValue {
                field: "adaptation.strength_grid".to_string(),
                reason: format!("strength {} must be in [0, 1]", beta),
            });
        }
    }
    if config.adaptation.min_site_samples == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "adaptation.min_site_samples".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    for &alpha in &config.classifier.regularization_grid {
        if !alpha.is_finite() || alpha <= 0.0 {
            errors.push(ConfigValidationError::InvalidValue {
                field: "classifier.regularization_grid".to_string(),
                reason: format!("regularization {} must be positive", alpha),
            });
        }
    }
    if config.classifier.num_solver_iterations == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "classifier.num_solver_iterations".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    if config.search.num_search_iterations == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "search.num_search_iterations".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    if config.cohort.min_class_samples == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "cohort.min_class_samples".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
}

fn validate_split(config: &RunConfig, errors: &mut Vec<ConfigValidationError>) {
    match config.split.strategy {
        SplitStrategyKind::Stratified => {
            if config.split.outer_folds < 2 {
                errors.push(ConfigValidationError::InvalidValue {
                    field: "split.outer_folds".to_string(),
                    reason: "must be at least 2".to_string(),
                });
            }
            if config.split.num_repeats == 0 {
                errors.push(ConfigValidationError::InvalidValue {
                    field: "split.num_repeats".to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        SplitStrategyKind::LeaveSitesOut => {
            if config.split.num_test_sites == 0 {
                errors.push(ConfigValidationError::InvalidValue {
                    field: "split.num_test_sites".to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
        }
    }

    // inner_folds == 1 degenerates to resubstitution scoring
    if config.split.inner_folds == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "split.inner_folds".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RunConfig;

    #[test]
    fn test_default_config_is_valid() {
        let config = RunConfig::default();
        let result = validate_config(&config);
        if let Err(e) = &result {
            eprintln!("Validation error: {}", e);
        }
        assert!(result.is_ok());
    }

    #[test]
    fn test_empty_shrinkage_grid() {
        let mut config = RunConfig::default();
        config.connectivity.shrinkage_grid.clear();

        let result = validate_config(&config);
        assert!(result.is_err());

        if let Err(ConfigError::ValidationError(msg)) = result {
            assert!(msg.contains("connectivity.shrinkage_grid"));
        }
    }

    #[test]
    fn test_shrinkage_out_of_range() {
        let mut config = RunConfig::default();
        config.connectivity.shrinkage_grid = vec![1.5];

        let result = validate_config(&config);
        assert!(result.is_err());

        if let Err(ConfigError::ValidationError(msg)) = result {
            assert!(msg.contains("[0, 1)"));
        }
    }

    #[test]
    fn test_negative_regularization() {
        let mut config = RunConfig::default();
        config.classifier.regularization_grid = vec![-1.0];

        let result = validate_config(&config);
        assert!(result.is_err());

        if let Err(ConfigError::ValidationError(msg)) = result {
            assert!(msg.contains("regularization"));
        }
    }

    #[test]
    fn test_outer_folds_too_small() {
        let mut config = RunConfig::default();
        config.split.outer_folds = 1;

        let result = validate_config(&config);
        assert!(result.is_err());

        if let Err(ConfigError::ValidationError(msg)) = result {
            assert!(msg.contains("split.outer_folds"));
        }
    }

    #[test]
    fn test_single_inner_fold_is_allowed() {
        let mut config = RunConfig::default();
        config.split.inner_folds = 1;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_multiple_errors_reported_together() {
        let mut config = RunConfig::default();
        config.connectivity.shrinkage_grid.clear();
        config.split.outer_folds = 0;

        let result = validate_config(&config);
        if let Err(ConfigError::ValidationError(msg)) = result {
            assert!(msg.contains("connectivity.shrinkage_grid"));
            assert!(msg.contains("split.outer_folds"));
        } else {
            panic!("expected validation failure");
        }
    }
}
