// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! First-order functional connectivity extraction
//!
//! One R×R connectivity matrix per subject from its T×R time series:
//! Pearson correlation (default), covariance, or precision. Shrinkage
//! blends the empirical matrix toward a scaled identity so the result is
//! strictly positive-definite even when T < R or a region is nearly flat;
//! the gate at the end is an actual Cholesky factorization, not a hope.

use nalgebra::{Cholesky, DMatrix};
use rayon::prelude::*;

use fconn_config::{ConnectivityConfig, MeasureKind};

use crate::dataset::{Dataset, Subject};
use crate::error::{FconnError, Result};

/// Per-subject connectivity matrix extractor.
///
/// Stateless across subjects: nothing here is fit on a cohort, so the same
/// extractor may serve train and test indices of any fold.
#[derive(Debug, Clone)]
pub struct ConnectivityExtractor {
    measure: MeasureKind,
    shrinkage: f64,
    variance_floor: f64,
}

impl ConnectivityExtractor {
    pub fn new(measure: MeasureKind, shrinkage: f64, variance_floor: f64) -> Self {
        Self {
            measure,
            shrinkage,
            variance_floor,
        }
    }

    /// Extractor for one shrinkage candidate out of the configured grid.
    pub fn from_config(config: &ConnectivityConfig, shrinkage: f64) -> Self {
        Self::new(config.measure, shrinkage, config.variance_floor)
    }

    pub fn shrinkage(&self) -> f64 {
        self.shrinkage
    }

    /// Extract the connectivity matrix for one subject.
    ///
    /// # Errors
    ///
    /// `ConstantSignal` when every region is flat, `NotPositiveDefinite`
    /// when shrinkage cannot restore a Cholesky-decomposable matrix.
    pub fn extract(&self, subject: &Subject) -> Result<DMatrix<f64>> {
        let cov = sample_covariance(subject);
        let r = cov.nrows();

        let degenerate: Vec<bool> = (0..r).map(|i| cov[(i, i)] < self.variance_floor).collect();
        if degenerate.iter().all(|&d| d) {
            return Err(FconnError::ConstantSignal {
                subject: subject.id().to_string(),
            });
        }

        let matrix = match self.measure {
            MeasureKind::Pearson => {
                let corr = correlation_from_covariance(&cov, &degenerate);
                shrink_toward_identity(&corr, self.shrinkage)
            }
            MeasureKind::Covariance => shrink_toward_identity(&cov, self.shrinkage),
            MeasureKind::Precision => {
                let shrunk = shrink_toward_identity(&cov, self.shrinkage);
                let chol = Cholesky::new(shrunk).ok_or_else(|| FconnError::NotPositiveDefinite {
                    subject: subject.id().to_string(),
                    shrinkage: self.shrinkage,
                })?;
                chol.inverse()
            }
        };

        if !crate::spd::is_positive_definite(&matrix) {
            return Err(FconnError::NotPositiveDefinite {
                subject: subject.id().to_string(),
                shrinkage: self.shrinkage,
            });
        }

        Ok(matrix)
    }

    /// Extract connectivity matrices for a fold's index set, in index order.
    ///
    /// Per-subject work is independent and fans out across the rayon pool;
    /// collection preserves the input order so downstream statistics do not
    /// depend on scheduling.
    pub fn extract_cohort(&self, dataset: &Dataset, indices: &[usize]) -> Result<Vec<DMatrix<f64>>> {
        indices
            .par_iter()
            .map(|&i| self.extract(dataset.subject(i)))
            .collect()
    }
}

/// Sample covariance (denominator T − 1) of the subject's regions.
fn sample_covariance(subject: &Subject) -> DMatrix<f64> {
    let series = subject.series();
    let (t, r) = series.dim();
    let tf = t as f64;
    let denom = (t - 1) as f64;

    let means: Vec<f64> = (0..r).map(|j| series.column(j).sum() / tf).collect();
    let mut centered = series.to_owned();
    for (j, mut col) in centered.columns_mut().into_iter().enumerate() {
        let m = means[j];
        col.mapv_inplace(|v| v - m);
    }

    let mut cov = DMatrix::<f64>::zeros(r, r);
    for i in 0..r {
        let ci = centered.column(i);
        for j in i..r {
            let v = ci.dot(&centered.column(j)) / denom;
            cov[(i, j)] = v;
            cov[(j, i)] = v;
        }
    }
    cov
}

/// Pearson correlation from a covariance matrix. Degenerate regions keep a
/// unit diagonal and zero cross-correlations, which preserves semi-definiteness.
fn correlation_from_covariance(cov: &DMatrix<f64>, degenerate: &[bool]) -> DMatrix<f64> {
    let r = cov.nrows();
    let mut corr = DMatrix::<f64>::identity(r, r);
    for i in 0..r {
        if degenerate[i] {
            continue;
        }
        let si = cov[(i, i)].sqrt();
        for j in (i + 1)..r {
            if degenerate[j] {
                continue;
            }
            let sj = cov[(j, j)].sqrt();
            let v = (cov[(i, j)] / (si * sj)).clamp(-1.0, 1.0);
            corr[(i, j)] = v;
            corr[(j, i)] = v;
        }
    }
    corr
}

/// Linear blend toward a scaled identity: (1 − γ)·M + γ·(tr(M)/R)·I.
///
/// The target keeps the matrix's overall scale, so the same formula serves
/// correlation (tr/R = 1) and covariance inputs.
fn shrink_toward_identity(m: &DMatrix<f64>, gamma: f64) -> DMatrix<f64> {
    if gamma == 0.0 {
        return m.clone();
    }
    let r = m.nrows();
    let mu = m.trace() / r as f64;
    let mut out = m * (1.0 - gamma);
    for i in 0..r {
        out[(i, i)] += gamma * mu;
    }
    out
}
