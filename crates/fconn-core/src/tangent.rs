// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Tangent-space projection of connectivity matrices
//!
//! The manifold of SPD matrices is linearized at a reference point — the
//! geometric (Karcher) mean of the training matrices under the
//! affine-invariant metric — and every subject is projected into that
//! tangent space, where Euclidean statistics are valid.
//!
//! Vectorization convention (fixed for the whole run): the upper triangle
//! including the diagonal, off-diagonal entries scaled by √2, dimension
//! R(R+1)/2. With this scaling the Euclidean inner product of two tangent
//! vectors equals the Frobenius inner product of the symmetric matrices.

use nalgebra::DMatrix;
use ndarray::Array1;
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use fconn_config::TangentConfig;

use crate::error::{FconnError, Result};
use crate::spd::{exp_sym, inv_sqrt_spd, log_spd, sqrt_spd, symmetrize};

/// Tangent vector length for R regions (diagonal retained).
pub fn tangent_dim(num_regions: usize) -> usize {
    num_regions * (num_regions + 1) / 2
}

/// Fold-owned reference for tangent projection: the geometric mean of the
/// fold's training matrices, with its square root and inverse square root
/// cached for whitening.
#[derive(Debug, Clone, Serialize)]
pub struct ReferencePoint {
    mean: DMatrix<f64>,
    sqrt: DMatrix<f64>,
    inv_sqrt: DMatrix<f64>,
}

impl ReferencePoint {
    pub fn mean(&self) -> &DMatrix<f64> {
        &self.mean
    }

    pub fn num_regions(&self) -> usize {
        self.mean.nrows()
    }
}

/// Riemannian tangent-space embedding relative to a training-only reference.
#[derive(Debug, Clone, Serialize)]
pub struct TangentProjector {
    tolerance: f64,
    max_iterations: usize,
}

impl TangentProjector {
    pub fn new(tolerance: f64, max_iterations: usize) -> Self {
        Self {
            tolerance,
            max_iterations,
        }
    }

    pub fn from_config(config: &TangentConfig) -> Self {
        Self::new(config.tolerance, config.max_iterations)
    }

    /// Compute the geometric (Karcher) mean of SPD matrices.
    ///
    /// Fixed-point iteration: starting from the arithmetic mean G₀,
    /// G ← G^{1/2} exp( (1/n) Σᵢ log(G^{-1/2} Mᵢ G^{-1/2}) ) G^{1/2}
    /// until the Frobenius norm of the mean log drops below the tolerance.
    ///
    /// Must be called with training matrices only; the returned reference
    /// is owned by one fold and never refit at test time.
    ///
    /// # Errors
    ///
    /// `MeanNotConverged` when the iteration cap is reached first — an
    /// unconverged mean is never returned silently.
    pub fn fit(&self, matrices: &[DMatrix<f64>]) -> Result<ReferencePoint> {
        if matrices.is_empty() {
            return Err(FconnError::EmptyCohort(
                "no training matrices for reference fit".into(),
            ));
        }

        let r = matrices[0].nrows();
        let n = matrices.len() as f64;

        // Arithmetic mean of SPD matrices is SPD: a safe starting point.
        let mut mean = DMatrix::<f64>::zeros(r, r);
        for m in matrices {
            mean += m;
        }
        mean /= n;

        let mut residual = f64::INFINITY;
        for iteration in 0..self.max_iterations {
            let sqrt = sqrt_spd(&mean, "geometric mean")?;
            let inv_sqrt = inv_sqrt_spd(&mean, "geometric mean")?;

            let mut tangent_mean = DMatrix::<f64>::zeros(r, r);
            for m in matrices {
                let whitened = symmetrize(&(&inv_sqrt * m * &inv_sqrt));
                tangent_mean += log_spd(&whitened, "whitened training matrix")?;
            }
            tangent_mean /= n;

            residual = tangent_mean.norm();
            if residual < self.tolerance {
                debug!(iteration, residual, "geometric mean converged");
                return Ok(ReferencePoint {
                    mean,
                    sqrt,
                    inv_sqrt,
                });
            }

            let step = exp_sym(&tangent_mean, "geometric mean update")?;
            mean = symmetrize(&(&sqrt * step * &sqrt));
        }

        Err(FconnError::MeanNotConverged {
            iterations: self.max_iterations,
            residual,
            tolerance: self.tolerance,
        })
    }

    /// Project an SPD matrix into the tangent space at the reference:
    /// vec(log(P^{-1/2} M P^{-1/2})).
    pub fn project(&self, matrix: &DMatrix<f64>, reference: &ReferencePoint) -> Result<Array1<f64>> {
        let whitened = symmetrize(&(&reference.inv_sqrt * matrix * &reference.inv_sqrt));
        let log = log_spd(&whitened, "tangent projection")?;
        Ok(vectorize_sym(&log))
    }

    /// Exponential map at the reference: inverse of [`project`](Self::project).
    pub fn reconstruct(
        &self,
        tangent: &Array1<f64>,
        reference: &ReferencePoint,
    ) -> Result<DMatrix<f64>> {
        let log = devectorize_sym(tangent, reference.num_regions())?;
        let exp = exp_sym(&log, "tangent reconstruction")?;
        Ok(symmetrize(&(&reference.sqrt * exp * &reference.sqrt)))
    }

    /// Project a fold's matrices, in input order, across the rayon pool.
    pub fn project_cohort(
        &self,
        matrices: &[DMatrix<f64>],
        reference: &ReferencePoint,
    ) -> Result<Vec<Array1<f64>>> {
        matrices
            .par_iter()
            .map(|m| self.project(m, reference))
            .collect()
    }
}

const SQRT_2: f64 = std::f64::consts::SQRT_2;

/// Upper triangle (diagonal included) of a symmetric matrix, off-diagonal
/// entries scaled by √2. Row-major pair order: (0,0), (0,1), ..., (1,1), ...
pub fn vectorize_sym(m: &DMatrix<f64>) -> Array1<f64> {
    let r = m.nrows();
    let mut out = Vec::with_capacity(tangent_dim(r));
    for i in 0..r {
        out.push(m[(i, i)]);
        for j in (i + 1)..r {
            out.push(m[(i, j)] * SQRT_2);
        }
    }
    Array1::from_vec(out)
}

/// Inverse of [`vectorize_sym`].
pub fn devectorize_sym(v: &Array1<f64>, num_regions: usize) -> Result<DMatrix<f64>> {
    if v.len() != tangent_dim(num_regions) {
        return Err(FconnError::DimensionMismatch {
            context: format!("devectorizing a {}-region tangent vector", num_regions),
            expected: tangent_dim(num_regions),
            actual: v.len(),
        });
    }
    let mut m = DMatrix::<f64>::zeros(num_regions, num_regions);
    let mut k = 0;
    for i in 0..num_regions {
        m[(i, i)] = v[k];
        k += 1;
        for j in (i + 1)..num_regions {
            let value = v[k] / SQRT_2;
            m[(i, j)] = value;
            m[(j, i)] = value;
            k += 1;
        }
    }
    Ok(m)
}
