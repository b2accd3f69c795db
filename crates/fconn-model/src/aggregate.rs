// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Result aggregation
//!
//! Collects fold results into a [`RunSummary`] and refits one final
//! pipeline on the full post-exclusion dataset. The final hyperparameters
//! come from a majority vote over the outer-fold winners; a tie goes to the
//! tied candidate with the highest mean inner-validation score across
//! folds, and a remaining tie to first-selected order. No file I/O happens
//! here: the summary, pipeline, adapted features and metadata are exposed
//! as values for the external artifact writer.

use ndarray::Array2;
use serde::Serialize;
use tracing::info;

use fconn_config::RunConfig;
use fconn_core::dataset::{Dataset, ExclusionRecord, SubjectMeta};
use fconn_core::error::{FconnError, Result};

use crate::pipeline::{fit_with_retry, Candidate, FittedPipeline};
use crate::selector::FoldResult;

/// Aggregate record of a whole run, serializable for the artifact writer.
///
/// Wall-clock timings aside, every field is bit-stable for a fixed dataset
/// and seed.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub seed: u64,
    /// Configuration snapshot the run actually used
    pub config: RunConfig,
    pub num_subjects: usize,
    pub exclusions: Vec<ExclusionRecord>,
    pub folds: Vec<FoldResult>,
    pub final_candidate: Candidate,
    /// Set when the final refit needed the strengthened-shrinkage retry
    pub final_retry_shrinkage: Option<f64>,
    /// Mean/std of the selection metric over outer folds
    pub mean_test_score: f64,
    pub std_test_score: f64,
}

/// Everything the pipeline exposes to the artifact-writing collaborator.
#[derive(Debug)]
pub struct RunOutput {
    pub summary: RunSummary,
    pub final_pipeline: FittedPipeline,
    /// Adapted feature matrix of the full post-exclusion cohort
    pub final_features: Array2<f64>,
    pub final_labels: Vec<u8>,
    pub metadata: Vec<SubjectMeta>,
}

/// Collects fold outcomes and produces the final model.
pub struct ResultAggregator;

impl ResultAggregator {
    /// Build the run summary and refit the final pipeline.
    pub fn aggregate(
        config: RunConfig,
        seed: u64,
        dataset: &Dataset,
        exclusions: Vec<ExclusionRecord>,
        folds: Vec<FoldResult>,
        positive_class: u8,
    ) -> Result<RunOutput> {
        if folds.is_empty() {
            return Err(FconnError::EmptyCohort("no fold results to aggregate".into()));
        }

        let final_candidate = Self::final_candidate(&folds);
        info!(?final_candidate, "refitting final pipeline on the full cohort");

        let all_indices: Vec<usize> = (0..dataset.len()).collect();
        let (final_pipeline, final_retry_shrinkage) = fit_with_retry(
            dataset,
            &all_indices,
            final_candidate,
            &config,
            positive_class,
        )?;
        let final_features = final_pipeline.transform(dataset, &all_indices)?;

        let metric = config.scoring.metric;
        let scores: Vec<f64> = folds.iter().map(|f| f.test_scores.get(metric)).collect();
        let mean_test_score = scores.iter().sum::<f64>() / scores.len() as f64;
        let std_test_score = (scores
            .iter()
            .map(|s| (s - mean_test_score) * (s - mean_test_score))
            .sum::<f64>()
            / scores.len() as f64)
            .sqrt();

        let summary = RunSummary {
            seed,
            config,
            num_subjects: dataset.len(),
            exclusions,
            folds,
            final_candidate,
            final_retry_shrinkage,
            mean_test_score,
            std_test_score,
        };

        Ok(RunOutput {
            summary,
            final_pipeline,
            final_features,
            final_labels: dataset.labels(),
            metadata: dataset.metadata(),
        })
    }

    /// Majority vote over outer-fold winners; ties go to the tied candidate
    /// with the highest mean inner score across all folds.
    fn final_candidate(folds: &[FoldResult]) -> Candidate {
        let mut tally: Vec<(Candidate, usize)> = Vec::new();
        for fold in folds {
            match tally
                .iter_mut()
                .find(|(c, _)| same_candidate(c, &fold.selected))
            {
                Some((_, count)) => *count += 1,
                None => tally.push((fold.selected, 1)),
            }
        }

        let top_votes = tally.iter().map(|(_, c)| *c).max().unwrap_or(0);
        let tied: Vec<Candidate> = tally
            .iter()
            .filter(|(_, count)| *count == top_votes)
            .map(|(c, _)| *c)
            .collect();
        if tied.len() == 1 {
            return tied[0];
        }

        // Tie: highest mean inner score across every fold that scored it
        let mut best = tied[0];
        let mut best_score = f64::NEG_INFINITY;
        for candidate in tied {
            let mut sum = 0.0;
            let mut count = 0usize;
            for fold in folds {
                for report in &fold.candidate_reports {
                    if same_candidate(&report.candidate, &candidate) && report.mean_score.is_finite()
                    {
                        sum += report.mean_score;
                        count += 1;
                    }
                }
            }
            let mean = if count > 0 { sum / count as f64 } else { f64::NEG_INFINITY };
            if mean > best_score {
                best_score = mean;
                best = candidate;
            }
        }
        best
    }
}

/// Bitwise equality: grid candidates are copies of the same literals, so
/// comparing bit patterns is exact and total.
fn same_candidate(a: &Candidate, b: &Candidate) -> bool {
    a.shrinkage.to_bits() == b.shrinkage.to_bits()
        && a.adaptation_strength.to_bits() == b.adaptation_strength.to_bits()
        && a.regularization.to_bits() == b.regularization.to_bits()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_candidate_is_exact() {
        let a = Candidate {
            shrinkage: 0.1,
            adaptation_strength: 0.5,
            regularization: 1.0,
        };
        let mut b = a;
        assert!(same_candidate(&a, &b));
        b.regularization = 1.0 + 1e-16; // rounds to the same f64
        assert!(same_candidate(&a, &b));
        b.regularization = 2.0;
        assert!(!same_candidate(&a, &b));
    }
}
