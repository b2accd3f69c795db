// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Second-order "Tangent Pearson" features
//!
//! Within one subject, the tangent matrix's column i is region i's
//! connectivity profile. The second-order matrix correlates those profiles:
//! entry (i, j) is the Pearson correlation of columns i and j, each treated
//! as an R-sample vector (diagonal entries of the tangent matrix included in
//! the profiles). This measures similarity of connectivity *patterns*
//! between regions rather than raw connectivity strength.
//!
//! The result is symmetric with unit diagonal; its upper triangle excluding
//! the diagonal is the subject's feature vector, dimension R(R−1)/2.

use nalgebra::DMatrix;
use ndarray::{Array1, Array2};
use rayon::prelude::*;

use crate::error::{FconnError, Result};
use crate::tangent::devectorize_sym;

/// Profile std below this means a constant profile and an undefined
/// correlation
const PROFILE_STD_FLOOR: f64 = 1e-12;

/// Feature vector length for R regions (diagonal discarded).
pub fn feature_dim(num_regions: usize) -> usize {
    num_regions * (num_regions - 1) / 2
}

/// Correlation-of-correlations feature construction.
#[derive(Debug, Clone, Default)]
pub struct SecondOrderCorrelator;

impl SecondOrderCorrelator {
    pub fn new() -> Self {
        Self
    }

    /// Full second-order R×R matrix for one subject's tangent vector.
    ///
    /// # Errors
    ///
    /// `NonFinite` when a region's profile is constant, leaving its
    /// correlations undefined.
    pub fn correlation_matrix(
        &self,
        tangent: &Array1<f64>,
        num_regions: usize,
    ) -> Result<DMatrix<f64>> {
        let t = devectorize_sym(tangent, num_regions)?;
        let r = num_regions;
        let rf = r as f64;

        // Center and normalize each profile (column) to unit norm.
        let mut profiles = DMatrix::<f64>::zeros(r, r);
        for j in 0..r {
            let col = t.column(j);
            let mean = col.sum() / rf;
            let mut norm_sq = 0.0;
            for i in 0..r {
                let c = col[i] - mean;
                profiles[(i, j)] = c;
                norm_sq += c * c;
            }
            let norm = norm_sq.sqrt();
            if norm < PROFILE_STD_FLOOR {
                return Err(FconnError::NonFinite {
                    context: format!("second-order correlation: region {} profile is constant", j),
                });
            }
            for i in 0..r {
                profiles[(i, j)] /= norm;
            }
        }

        let mut out = DMatrix::<f64>::identity(r, r);
        for i in 0..r {
            for j in (i + 1)..r {
                let v = profiles.column(i).dot(&profiles.column(j)).clamp(-1.0, 1.0);
                out[(i, j)] = v;
                out[(j, i)] = v;
            }
        }
        Ok(out)
    }

    /// Feature vector for one subject: upper triangle of the second-order
    /// matrix, diagonal discarded (it is 1 by construction).
    pub fn features(&self, tangent: &Array1<f64>, num_regions: usize) -> Result<Array1<f64>> {
        let m = self.correlation_matrix(tangent, num_regions)?;
        let r = num_regions;
        let mut out = Vec::with_capacity(feature_dim(r));
        for i in 0..r {
            for j in (i + 1)..r {
                out.push(m[(i, j)]);
            }
        }
        Ok(Array1::from_vec(out))
    }

    /// Feature matrix (subjects × R(R−1)/2) for a fold's tangent vectors,
    /// rows in input order.
    pub fn features_cohort(
        &self,
        tangents: &[Array1<f64>],
        num_regions: usize,
    ) -> Result<Array2<f64>> {
        let rows: Vec<Array1<f64>> = tangents
            .par_iter()
            .map(|t| self.features(t, num_regions))
            .collect::<Result<_>>()?;

        let d = feature_dim(num_regions);
        let mut out = Array2::<f64>::zeros((rows.len(), d));
        for (i, row) in rows.into_iter().enumerate() {
            out.row_mut(i).assign(&row);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tangent::vectorize_sym;
    use approx::assert_relative_eq;

    fn tangent_fixture() -> (Array1<f64>, usize) {
        let m = DMatrix::from_row_slice(
            4,
            4,
            &[
                0.5, 0.2, -0.1, 0.4, //
                0.2, -0.3, 0.6, 0.0, //
                -0.1, 0.6, 0.1, -0.2, //
                0.4, 0.0, -0.2, 0.8,
            ],
        );
        (vectorize_sym(&m), 4)
    }

    #[test]
    fn test_symmetric_with_unit_diagonal() {
        let (tangent, r) = tangent_fixture();
        let m = SecondOrderCorrelator::new()
            .correlation_matrix(&tangent, r)
            .unwrap();
        for i in 0..r {
            assert_eq!(m[(i, i)], 1.0);
            for j in 0..r {
                assert_relative_eq!(m[(i, j)], m[(j, i)], epsilon = 1e-15);
                assert!(m[(i, j)].abs() <= 1.0);
            }
        }
    }

    #[test]
    fn test_feature_dim_independent_of_cohort() {
        let (tangent, r) = tangent_fixture();
        let correlator = SecondOrderCorrelator::new();
        let features = correlator.features(&tangent, r).unwrap();
        assert_eq!(features.len(), feature_dim(r));

        let cohort = vec![tangent.clone(); 7];
        let matrix = correlator.features_cohort(&cohort, r).unwrap();
        assert_eq!(matrix.dim(), (7, feature_dim(r)));
    }

    #[test]
    fn test_shifted_profiles_correlate_to_one() {
        // m[i][j] = a_i + a_j is symmetric and every column is a shifted
        // copy of every other, so all off-diagonal correlations are 1
        let a = [0.3, -1.2, 0.7];
        let mut m = DMatrix::<f64>::zeros(3, 3);
        for i in 0..3 {
            for j in 0..3 {
                m[(i, j)] = a[i] + a[j];
            }
        }
        let tangent = vectorize_sym(&m);
        let out = SecondOrderCorrelator::new()
            .correlation_matrix(&tangent, 3)
            .unwrap();
        for i in 0..3 {
            for j in 0..3 {
                if i != j {
                    assert_relative_eq!(out[(i, j)], 1.0, epsilon = 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_constant_profile_is_numeric_error() {
        let m = DMatrix::from_element(3, 3, 0.25);
        let tangent = vectorize_sym(&m);
        let err = SecondOrderCorrelator::new()
            .correlation_matrix(&tangent, 3)
            .unwrap_err();
        assert!(err.is_numeric());
    }

    #[test]
    fn test_feature_dim_values() {
        assert_eq!(feature_dim(3), 3);
        assert_eq!(feature_dim(4), 6);
        assert_eq!(feature_dim(116), 6670);
    }
}
