// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Linear classifiers
//!
//! Two families, both linear and both deterministic:
//! - **Ridge**: closed-form least-squares on ±1 targets, solved by Cholesky
//!   on whichever of the primal (p×p) or dual (n×n) normal equations is
//!   smaller.
//! - **Logistic**: L2-penalized logistic regression by fixed-step gradient
//!   descent from a zero initialization, capped at the configured iteration
//!   count.
//!
//! Decision scores are signed distances f(x) = w·x + b; the positive class
//! is predicted when f(x) > 0.

use nalgebra::{Cholesky, DMatrix, DVector};
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::Serialize;

use fconn_config::ClassifierKind;
use fconn_core::error::{FconnError, Result};

/// A fitted linear decision function.
#[derive(Debug, Clone, Serialize)]
pub struct FittedClassifier {
    kind: ClassifierKind,
    regularization: f64,
    weights: Array1<f64>,
    intercept: f64,
    positive_class: u8,
}

impl FittedClassifier {
    pub fn kind(&self) -> ClassifierKind {
        self.kind
    }

    pub fn regularization(&self) -> f64 {
        self.regularization
    }

    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Signed decision score for one sample.
    pub fn decision(&self, x: ArrayView1<f64>) -> f64 {
        self.weights.dot(&x) + self.intercept
    }

    /// Signed decision scores, one per row.
    pub fn decision_batch(&self, x: ArrayView2<f64>) -> Vec<f64> {
        x.rows().into_iter().map(|row| self.decision(row)).collect()
    }

    /// Predicted label for one sample.
    pub fn predict(&self, x: ArrayView1<f64>) -> bool {
        self.decision(x) > 0.0
    }

    pub fn positive_class(&self) -> u8 {
        self.positive_class
    }
}

/// Fit a classifier on a training partition.
///
/// # Arguments
/// * `regularization` - L2 strength α > 0
/// * `max_iterations` - solver cap (iterative solvers only)
/// * `positive_class` - the label mapped to +1; everything else maps to −1
///
/// # Errors
///
/// `SingularSystem` when the partition holds a single class or the normal
/// equations cannot be factorized; `NonFinite` on non-finite inputs.
pub fn fit_classifier(
    kind: ClassifierKind,
    regularization: f64,
    max_iterations: usize,
    features: ArrayView2<f64>,
    labels: &[u8],
    positive_class: u8,
) -> Result<FittedClassifier> {
    debug_assert_eq!(features.nrows(), labels.len());

    if features.iter().any(|v| !v.is_finite()) {
        return Err(FconnError::NonFinite {
            context: "classifier training features".into(),
        });
    }
    let has_pos = labels.iter().any(|&l| l == positive_class);
    let has_neg = labels.iter().any(|&l| l != positive_class);
    if !has_pos || !has_neg {
        return Err(FconnError::SingularSystem {
            context: "single-class training partition".into(),
        });
    }

    let (weights, intercept) = match kind {
        ClassifierKind::Ridge => fit_ridge(regularization, features, labels, positive_class)?,
        ClassifierKind::Logistic => fit_logistic(
            regularization,
            max_iterations,
            features,
            labels,
            positive_class,
        ),
    };

    Ok(FittedClassifier {
        kind,
        regularization,
        weights,
        intercept,
        positive_class,
    })
}

fn signed_targets(labels: &[u8], positive_class: u8) -> Vec<f64> {
    labels
        .iter()
        .map(|&l| if l == positive_class { 1.0 } else { -1.0 })
        .collect()
}

/// Closed-form ridge on centered data. The intercept falls out of the
/// centering: b = ȳ − w·x̄.
fn fit_ridge(
    alpha: f64,
    features: ArrayView2<f64>,
    labels: &[u8],
    positive_class: u8,
) -> Result<(Array1<f64>, f64)> {
    let (n, p) = features.dim();
    let y = signed_targets(labels, positive_class);
    let y_mean = y.iter().sum::<f64>() / n as f64;

    let col_means: Vec<f64> = (0..p)
        .map(|j| features.column(j).sum() / n as f64)
        .collect();

    let mut xc = DMatrix::<f64>::zeros(n, p);
    for i in 0..n {
        for j in 0..p {
            xc[(i, j)] = features[[i, j]] - col_means[j];
        }
    }
    let yc = DVector::from_iterator(n, y.iter().map(|v| v - y_mean));

    let weights = if p <= n {
        // Primal: (XᵀX + αI) w = Xᵀy
        let mut gram = xc.transpose() * &xc;
        for j in 0..p {
            gram[(j, j)] += alpha;
        }
        let rhs = xc.transpose() * &yc;
        let chol = Cholesky::new(gram).ok_or_else(|| FconnError::SingularSystem {
            context: "ridge primal normal equations".into(),
        })?;
        chol.solve(&rhs)
    } else {
        // Dual: w = Xᵀ(XXᵀ + αI)⁻¹ y
        let mut gram = &xc * xc.transpose();
        for i in 0..n {
            gram[(i, i)] += alpha;
        }
        let chol = Cholesky::new(gram).ok_or_else(|| FconnError::SingularSystem {
            context: "ridge dual normal equations".into(),
        })?;
        let dual = chol.solve(&yc);
        xc.transpose() * dual
    };

    let weights = Array1::from_iter(weights.iter().copied());
    let intercept = y_mean
        - weights
            .iter()
            .zip(col_means.iter())
            .map(|(w, m)| w * m)
            .sum::<f64>();
    Ok((weights, intercept))
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// L2 logistic regression by fixed-step gradient descent. The step is the
/// inverse of a Lipschitz bound on the mean-loss gradient, so the descent
/// cannot diverge; zero initialization keeps the fit deterministic.
fn fit_logistic(
    alpha: f64,
    max_iterations: usize,
    features: ArrayView2<f64>,
    labels: &[u8],
    positive_class: u8,
) -> (Array1<f64>, f64) {
    let (n, p) = features.dim();
    let nf = n as f64;
    let y01: Vec<f64> = labels
        .iter()
        .map(|&l| if l == positive_class { 1.0 } else { 0.0 })
        .collect();

    // Lipschitz bound: (Σᵢ (‖xᵢ‖² + 1)) / (4n) for the loss plus α/n for
    // the penalty; the +1 accounts for the intercept coordinate.
    let sum_sq: f64 = features
        .rows()
        .into_iter()
        .map(|row| row.dot(&row) + 1.0)
        .sum();
    let step = 1.0 / (sum_sq / (4.0 * nf) + alpha / nf);

    let mut weights = Array1::<f64>::zeros(p);
    let mut intercept = 0.0;

    for _ in 0..max_iterations {
        let mut grad_w = Array1::<f64>::zeros(p);
        let mut grad_b = 0.0;
        for (row, &target) in features.rows().into_iter().zip(y01.iter()) {
            let margin = weights.dot(&row) + intercept;
            let residual = sigmoid(margin) - target;
            grad_w.scaled_add(residual, &row);
            grad_b += residual;
        }
        grad_w.mapv_inplace(|g| g / nf);
        grad_b /= nf;
        grad_w.scaled_add(alpha / nf, &weights);

        weights.scaled_add(-step, &grad_w);
        intercept -= step * grad_b;
    }

    (weights, intercept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn separable() -> (ndarray::Array2<f64>, Vec<u8>) {
        let x = array![
            [2.0, 1.0],
            [1.5, 2.0],
            [2.5, 1.5],
            [-2.0, -1.0],
            [-1.5, -2.0],
            [-2.5, -1.5],
        ];
        let y = vec![1, 1, 1, 0, 0, 0];
        (x, y)
    }

    #[test]
    fn test_ridge_separates() {
        let (x, y) = separable();
        let clf = fit_classifier(ClassifierKind::Ridge, 0.1, 100, x.view(), &y, 1).unwrap();
        for (row, &label) in x.rows().into_iter().zip(y.iter()) {
            assert_eq!(clf.predict(row), label == 1);
        }
    }

    #[test]
    fn test_logistic_separates() {
        let (x, y) = separable();
        let clf = fit_classifier(ClassifierKind::Logistic, 0.1, 200, x.view(), &y, 1).unwrap();
        for (row, &label) in x.rows().into_iter().zip(y.iter()) {
            assert_eq!(clf.predict(row), label == 1);
        }
    }

    #[test]
    fn test_dual_path_when_wide() {
        // 4 samples, 10 features: dual normal equations
        let mut x = ndarray::Array2::<f64>::zeros((4, 10));
        for i in 0..4 {
            for j in 0..10 {
                x[[i, j]] = ((i * 10 + j) as f64 * 0.13).sin() + if i < 2 { 1.0 } else { -1.0 };
            }
        }
        let y = vec![1, 1, 0, 0];
        let clf = fit_classifier(ClassifierKind::Ridge, 1.0, 100, x.view(), &y, 1).unwrap();
        assert_eq!(clf.weights().len(), 10);
        for (row, &label) in x.rows().into_iter().zip(y.iter()) {
            assert_eq!(clf.predict(row), label == 1);
        }
    }

    #[test]
    fn test_single_class_rejected() {
        let x = array![[1.0, 2.0], [2.0, 1.0]];
        let y = vec![1, 1];
        let err = fit_classifier(ClassifierKind::Ridge, 1.0, 100, x.view(), &y, 1).unwrap_err();
        assert!(err.is_numeric());
    }

    #[test]
    fn test_stronger_regularization_shrinks_weights() {
        let (x, y) = separable();
        let loose = fit_classifier(ClassifierKind::Ridge, 0.01, 100, x.view(), &y, 1).unwrap();
        let tight = fit_classifier(ClassifierKind::Ridge, 100.0, 100, x.view(), &y, 1).unwrap();
        let norm = |w: &Array1<f64>| w.dot(w).sqrt();
        assert!(norm(tight.weights()) < norm(loose.weights()));
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (x, y) = separable();
        let a = fit_classifier(ClassifierKind::Logistic, 0.5, 150, x.view(), &y, 1).unwrap();
        let b = fit_classifier(ClassifierKind::Logistic, 0.5, 150, x.view(), &y, 1).unwrap();
        assert_eq!(a.weights(), b.weights());
        assert_eq!(a.intercept(), b.intercept());
    }
}
