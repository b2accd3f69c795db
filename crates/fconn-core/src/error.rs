// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for fconn operations
//!
//! One enum for the whole workspace, grouped into the three propagation
//! classes the pipeline distinguishes: data errors (per-subject, usually
//! recoverable by exclusion), numeric errors (per-fold or per-candidate),
//! and configuration errors (always fatal).

use fconn_config::ConfigError;
use thiserror::Error;

/// Propagation class of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or inconsistent subject data
    Data,
    /// Numerical failure (non-PD matrix, divergence, singular fit)
    Numeric,
    /// Invalid or unsatisfiable configuration
    Config,
}

/// Error types for fconn operations
#[derive(Debug, Error)]
pub enum FconnError {
    // === Data errors ===
    #[error("Subject '{subject}': {reason}")]
    MalformedSubject { subject: String, reason: String },

    #[error("Subject '{subject}': expected {expected} regions, found {actual}")]
    RegionCountMismatch {
        subject: String,
        expected: usize,
        actual: usize,
    },

    #[error("Empty cohort: {0}")]
    EmptyCohort(String),

    // === Numeric errors ===
    #[error("Connectivity matrix for subject '{subject}' is not positive-definite at shrinkage {shrinkage}")]
    NotPositiveDefinite { subject: String, shrinkage: f64 },

    #[error("Subject '{subject}': time series is constant across all regions")]
    ConstantSignal { subject: String },

    #[error(
        "Geometric mean did not converge after {iterations} iterations \
         (residual {residual:.3e}, tolerance {tolerance:.3e})"
    )]
    MeanNotConverged {
        iterations: usize,
        residual: f64,
        tolerance: f64,
    },

    #[error("Non-positive eigenvalue {value:.3e} in {context}")]
    NonPositiveEigenvalue { context: String, value: f64 },

    #[error("Eigendecomposition did not converge in {context}")]
    EigenNotConverged { context: String },

    #[error("Singular system in {context}")]
    SingularSystem { context: String },

    #[error("Non-finite value in {context}")]
    NonFinite { context: String },

    #[error("All {candidates} hyperparameter candidates failed in fold {fold}")]
    AllCandidatesFailed { fold: usize, candidates: usize },

    // === Config errors ===
    #[error("Inconsistent dimensions in {context}: expected {expected}, found {actual}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl FconnError {
    /// Propagation class of this error (see the policy in the crate docs)
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedSubject { .. }
            | Self::RegionCountMismatch { .. }
            | Self::EmptyCohort(_) => ErrorKind::Data,

            Self::NotPositiveDefinite { .. }
            | Self::ConstantSignal { .. }
            | Self::MeanNotConverged { .. }
            | Self::NonPositiveEigenvalue { .. }
            | Self::EigenNotConverged { .. }
            | Self::SingularSystem { .. }
            | Self::NonFinite { .. }
            | Self::AllCandidatesFailed { .. } => ErrorKind::Numeric,

            Self::DimensionMismatch { .. } | Self::Config(_) => ErrorKind::Config,
        }
    }

    /// True for errors a hyperparameter search records as a failed score
    /// instead of aborting the fold
    pub fn is_numeric(&self) -> bool {
        self.kind() == ErrorKind::Numeric
    }
}

pub type Result<T> = core::result::Result<T, FconnError>;
pub type Error = FconnError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let data = FconnError::EmptyCohort("no subjects".into());
        assert_eq!(data.kind(), ErrorKind::Data);

        let numeric = FconnError::SingularSystem {
            context: "ridge normal equations".into(),
        };
        assert_eq!(numeric.kind(), ErrorKind::Numeric);
        assert!(numeric.is_numeric());

        let config = FconnError::Config(ConfigError::InvalidValue("folds".into()));
        assert_eq!(config.kind(), ErrorKind::Config);
        assert!(!config.is_numeric());
    }
}
