// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration loading
//!
//! Parses a run configuration from TOML text and validates it. File
//! discovery, environment overrides, and CLI flags belong to the wrapper
//! layer; the core only ever sees text it was handed.

use crate::{validate_config, ConfigResult, RunConfig};

impl RunConfig {
    /// Parse a `RunConfig` from TOML text and validate it.
    ///
    /// Missing sections and fields take their defaults, so partial documents
    /// are fine. Unknown option strings (measure kinds, policies, metrics)
    /// fail at parse time.
    ///
    /// # Errors
    ///
    /// `ConfigError::ParseError` on malformed TOML or unrecognized options,
    /// `ConfigError::ValidationError` on out-of-range values.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: RunConfig = toml::from_str(text)?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Validated default configuration.
    pub fn validated_default() -> ConfigResult<Self> {
        let config = RunConfig::default();
        validate_config(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClassifierKind, Metric, SearchStrategy, SmallSitePolicy};

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = RunConfig::from_toml_str("").unwrap();
        assert_eq!(config, RunConfig::default());
    }

    #[test]
    fn test_partial_document_overrides() {
        let text = r#"
            [split]
            outer_folds = 10
            inner_folds = 5

            [classifier]
            kind = "logistic"
            regularization_grid = [0.5, 5.0]

            [scoring]
            metric = "roc_auc"
        "#;
        let config = RunConfig::from_toml_str(text).unwrap();
        assert_eq!(config.split.outer_folds, 10);
        assert_eq!(config.split.inner_folds, 5);
        assert_eq!(config.classifier.kind, ClassifierKind::Logistic);
        assert_eq!(config.classifier.regularization_grid, vec![0.5, 5.0]);
        assert_eq!(config.scoring.metric, Metric::RocAuc);
        // Untouched sections keep their defaults
        assert_eq!(config.adaptation.small_site_policy, SmallSitePolicy::Merge);
        assert_eq!(config.search.strategy, SearchStrategy::Grid);
    }

    #[test]
    fn test_unknown_option_string_rejected() {
        let text = r#"
            [classifier]
            kind = "perceptron"
        "#;
        assert!(RunConfig::from_toml_str(text).is_err());
    }

    #[test]
    fn test_out_of_range_value_rejected() {
        let text = r#"
            [adaptation]
            strength_grid = [0.0, 2.0]
        "#;
        assert!(RunConfig::from_toml_str(text).is_err());
    }
}
