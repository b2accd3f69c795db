// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Evaluation metrics
//!
//! All metrics are computed from decision scores against true labels.
//! Thresholded metrics predict the positive class at score > 0; ROC-AUC is
//! rank-based with tie averaging and is undefined (None) when only one
//! class is present.

use serde::Serialize;

use fconn_config::Metric;
use fconn_core::error::{FconnError, Result};

/// All reported metrics for one evaluation.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScoreSet {
    pub accuracy: f64,
    pub balanced_accuracy: f64,
    pub roc_auc: Option<f64>,
}

impl ScoreSet {
    /// Value of the configured selection metric; NaN when undefined.
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Accuracy => self.accuracy,
            Metric::BalancedAccuracy => self.balanced_accuracy,
            Metric::RocAuc => self.roc_auc.unwrap_or(f64::NAN),
        }
    }
}

/// Evaluate decision scores against true labels.
///
/// # Errors
///
/// `NonFinite` when any score is NaN or infinite.
pub fn evaluate(labels: &[u8], scores: &[f64], positive_class: u8) -> Result<ScoreSet> {
    debug_assert_eq!(labels.len(), scores.len());
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(FconnError::NonFinite {
            context: "decision scores".into(),
        });
    }

    let n = labels.len() as f64;
    let mut tp = 0usize;
    let mut tn = 0usize;
    let mut n_pos = 0usize;
    let mut n_neg = 0usize;
    for (&label, &score) in labels.iter().zip(scores.iter()) {
        let truth = label == positive_class;
        let predicted = score > 0.0;
        if truth {
            n_pos += 1;
            if predicted {
                tp += 1;
            }
        } else {
            n_neg += 1;
            if !predicted {
                tn += 1;
            }
        }
    }

    let accuracy = (tp + tn) as f64 / n;

    // Mean of per-class recalls over the classes actually present
    let mut recalls = Vec::with_capacity(2);
    if n_pos > 0 {
        recalls.push(tp as f64 / n_pos as f64);
    }
    if n_neg > 0 {
        recalls.push(tn as f64 / n_neg as f64);
    }
    let balanced_accuracy = recalls.iter().sum::<f64>() / recalls.len() as f64;

    let roc_auc = if n_pos > 0 && n_neg > 0 {
        Some(rank_auc(labels, scores, positive_class, n_pos, n_neg))
    } else {
        None
    };

    Ok(ScoreSet {
        accuracy,
        balanced_accuracy,
        roc_auc,
    })
}

/// Mann-Whitney formulation: AUC from the rank sum of positive samples,
/// with ties assigned their average rank.
fn rank_auc(labels: &[u8], scores: &[f64], positive_class: u8, n_pos: usize, n_neg: usize) -> f64 {
    let n = scores.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0f64; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // Average 1-based rank for the tie block [i, j]
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = rank;
        }
        i = j + 1;
    }

    let rank_sum_pos: f64 = labels
        .iter()
        .zip(ranks.iter())
        .filter(|(&l, _)| l == positive_class)
        .map(|(_, &r)| r)
        .sum();

    let np = n_pos as f64;
    let nn = n_neg as f64;
    (rank_sum_pos - np * (np + 1.0) / 2.0) / (np * nn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_perfect_predictor() {
        let labels = vec![1, 1, 0, 0];
        let scores = vec![2.0, 1.0, -1.0, -2.0];
        let s = evaluate(&labels, &scores, 1).unwrap();
        assert_relative_eq!(s.accuracy, 1.0);
        assert_relative_eq!(s.balanced_accuracy, 1.0);
        assert_relative_eq!(s.roc_auc.unwrap(), 1.0);
    }

    #[test]
    fn test_inverted_predictor() {
        let labels = vec![1, 1, 0, 0];
        let scores = vec![-2.0, -1.0, 1.0, 2.0];
        let s = evaluate(&labels, &scores, 1).unwrap();
        assert_relative_eq!(s.balanced_accuracy, 0.0);
        assert_relative_eq!(s.roc_auc.unwrap(), 0.0);
    }

    #[test]
    fn test_balanced_accuracy_weighs_classes_equally() {
        // 3 positives all correct, 1 negative wrong:
        // accuracy 0.75, balanced accuracy 0.5
        let labels = vec![1, 1, 1, 0];
        let scores = vec![1.0, 1.0, 1.0, 1.0];
        let s = evaluate(&labels, &scores, 1).unwrap();
        assert_relative_eq!(s.accuracy, 0.75);
        assert_relative_eq!(s.balanced_accuracy, 0.5);
    }

    #[test]
    fn test_auc_with_ties() {
        // All scores tied: AUC must be exactly 0.5
        let labels = vec![1, 0, 1, 0];
        let scores = vec![0.3, 0.3, 0.3, 0.3];
        let s = evaluate(&labels, &scores, 1).unwrap();
        assert_relative_eq!(s.roc_auc.unwrap(), 0.5);
    }

    #[test]
    fn test_auc_undefined_for_single_class() {
        let labels = vec![1, 1];
        let scores = vec![0.5, -0.5];
        let s = evaluate(&labels, &scores, 1).unwrap();
        assert!(s.roc_auc.is_none());
        assert!(s.get(Metric::RocAuc).is_nan());
    }

    #[test]
    fn test_non_finite_scores_rejected() {
        let labels = vec![1, 0];
        let scores = vec![f64::NAN, 0.1];
        assert!(evaluate(&labels, &scores, 1).is_err());
    }

    #[test]
    fn test_scores_in_unit_interval() {
        let labels = vec![1, 0, 1, 0, 1];
        let scores = vec![0.2, 0.4, -0.3, -0.1, 0.9];
        let s = evaluate(&labels, &scores, 1).unwrap();
        for v in [s.accuracy, s.balanced_accuracy, s.roc_auc.unwrap()] {
            assert!((0.0..=1.0).contains(&v));
        }
    }
}
