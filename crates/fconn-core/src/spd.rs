// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Symmetric positive-definite matrix functions
//!
//! Spectral log/exp/sqrt on symmetric matrices via eigendecomposition.
//! These are the only primitives the tangent geometry needs, implemented
//! directly so the pipeline carries no LAPACK backend requirement.

use nalgebra::{Cholesky, DMatrix, SymmetricEigen};

use crate::error::{FconnError, Result};

/// Iteration cap for the symmetric eigensolver
const EIGEN_MAX_ITERATIONS: usize = 1000;

/// Force exact symmetry: (M + Mᵀ) / 2
pub fn symmetrize(m: &DMatrix<f64>) -> DMatrix<f64> {
    let mut out = m.transpose();
    out += m;
    out *= 0.5;
    out
}

/// True when the matrix admits a Cholesky factorization
pub fn is_positive_definite(m: &DMatrix<f64>) -> bool {
    Cholesky::new(m.clone()).is_some()
}

fn spectral_decompose(m: &DMatrix<f64>, context: &str) -> Result<SymmetricEigen<f64, nalgebra::Dyn>> {
    if m.iter().any(|v| !v.is_finite()) {
        return Err(FconnError::NonFinite {
            context: context.to_string(),
        });
    }
    SymmetricEigen::try_new(m.clone(), 1.0e-13, EIGEN_MAX_ITERATIONS).ok_or_else(|| {
        FconnError::EigenNotConverged {
            context: context.to_string(),
        }
    })
}

fn recompose(eigen: &SymmetricEigen<f64, nalgebra::Dyn>, mapped: &[f64]) -> DMatrix<f64> {
    let d = DMatrix::from_diagonal(&nalgebra::DVector::from_row_slice(mapped));
    let vt = eigen.eigenvectors.transpose();
    symmetrize(&(&eigen.eigenvectors * d * vt))
}

/// Apply a scalar function to the spectrum of a symmetric matrix,
/// requiring strictly positive eigenvalues first.
fn apply_positive_spectral(
    m: &DMatrix<f64>,
    context: &str,
    f: impl Fn(f64) -> f64,
) -> Result<DMatrix<f64>> {
    let eigen = spectral_decompose(m, context)?;
    let mut mapped = Vec::with_capacity(eigen.eigenvalues.len());
    for &lambda in eigen.eigenvalues.iter() {
        if lambda <= 0.0 {
            return Err(FconnError::NonPositiveEigenvalue {
                context: context.to_string(),
                value: lambda,
            });
        }
        mapped.push(f(lambda));
    }
    Ok(recompose(&eigen, &mapped))
}

/// Matrix logarithm of an SPD matrix
pub fn log_spd(m: &DMatrix<f64>, context: &str) -> Result<DMatrix<f64>> {
    apply_positive_spectral(m, context, f64::ln)
}

/// Matrix square root of an SPD matrix
pub fn sqrt_spd(m: &DMatrix<f64>, context: &str) -> Result<DMatrix<f64>> {
    apply_positive_spectral(m, context, f64::sqrt)
}

/// Inverse matrix square root of an SPD matrix
pub fn inv_sqrt_spd(m: &DMatrix<f64>, context: &str) -> Result<DMatrix<f64>> {
    apply_positive_spectral(m, context, |lambda| 1.0 / lambda.sqrt())
}

/// Matrix exponential of a symmetric matrix
pub fn exp_sym(m: &DMatrix<f64>, context: &str) -> Result<DMatrix<f64>> {
    let eigen = spectral_decompose(m, context)?;
    let mapped: Vec<f64> = eigen.eigenvalues.iter().map(|&l| l.exp()).collect();
    if mapped.iter().any(|v| !v.is_finite()) {
        return Err(FconnError::NonFinite {
            context: context.to_string(),
        });
    }
    Ok(recompose(&eigen, &mapped))
}
