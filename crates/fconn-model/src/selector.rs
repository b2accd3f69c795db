// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Nested cross-validation model selection
//!
//! Outer folds estimate generalization; inner folds drive the
//! hyperparameter search. For every candidate the entire pipeline is refit
//! from scratch on inner-training indices, so no statistic ever crosses a
//! validation boundary. Candidates sharing a shrinkage value also share the
//! expensive extraction/projection stage within an inner split; those
//! stages fan out across the rayon pool, grouped so the score table is
//! assembled in deterministic candidate order.
//!
//! A numeric failure for one candidate is recorded as a NaN score and the
//! search moves on; the fold itself fails only when every candidate failed.
//! Tie-breaking prefers the least complex candidate: highest classifier
//! regularization, then lowest adaptation strength, then highest shrinkage,
//! then grid order.

use std::time::Instant;

use ndarray::Array2;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, info_span};

use fconn_config::{RunConfig, SearchStrategy};
use fconn_core::dataset::Dataset;
use fconn_core::error::{FconnError, Result};
use fconn_core::rng::{derive_rng, derive_seed, stream};
use fconn_core::second_order::SecondOrderCorrelator;
use fconn_core::adapter::SiteAdapter;
use fconn_core::connectivity::ConnectivityExtractor;
use fconn_core::tangent::TangentProjector;

use crate::classifier::fit_classifier;
use crate::pipeline::{fit_with_retry, Candidate, FittedPipeline};
use crate::scoring::{evaluate, ScoreSet};
use crate::split::{inner_splits, outer_splits, FoldIndices};

/// Inner-loop outcome for one candidate.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateReport {
    pub candidate: Candidate,
    /// Selection-metric score per inner fold; NaN marks a numeric failure
    pub inner_scores: Vec<f64>,
    /// Mean inner score; NaN when any inner fold failed
    pub mean_score: f64,
}

impl CandidateReport {
    pub fn failed(&self) -> bool {
        !self.mean_score.is_finite()
    }
}

/// Outcome of one outer fold.
#[derive(Debug, Clone, Serialize)]
pub struct FoldResult {
    pub fold_id: usize,
    pub selected: Candidate,
    /// Set when the outer refit needed the strengthened-shrinkage retry
    pub retry_shrinkage: Option<f64>,
    pub test_scores: ScoreSet,
    pub num_train: usize,
    pub num_test: usize,
    pub elapsed_secs: f64,
    pub candidate_reports: Vec<CandidateReport>,
    /// The pipeline refit on the full outer-training partition. Excluded
    /// from serialization; the artifact writer receives it as a value.
    #[serde(skip)]
    pub pipeline: FittedPipeline,
}

/// Nested cross-validation driver.
pub struct ModelSelector<'a> {
    config: &'a RunConfig,
    seed: u64,
    positive_class: u8,
}

impl<'a> ModelSelector<'a> {
    pub fn new(config: &'a RunConfig, seed: u64, positive_class: u8) -> Self {
        Self {
            config,
            seed,
            positive_class,
        }
    }

    /// Run the full outer loop. Fold failure is all-or-nothing: the first
    /// fold-level error aborts the run.
    pub fn run(&self, dataset: &Dataset) -> Result<Vec<FoldResult>> {
        let folds = outer_splits(dataset, &self.config.split, self.seed)?;
        info!(folds = folds.len(), "starting nested cross-validation");
        folds
            .iter()
            .enumerate()
            .map(|(fold_id, fold)| self.evaluate_fold(dataset, fold_id, fold))
            .collect()
    }

    /// Candidate list for one fold, in deterministic grid order.
    ///
    /// Grid search enumerates the full cartesian product. Randomized search
    /// samples `num_search_iterations` distinct grid points with the fold's
    /// derived stream, then keeps them in grid order.
    pub fn candidates(&self, fold_id: usize) -> Vec<Candidate> {
        let grid: Vec<Candidate> = self
            .config
            .connectivity
            .shrinkage_grid
            .iter()
            .flat_map(|&shrinkage| {
                self.config.adaptation.strength_grid.iter().flat_map(move |&beta| {
                    self.config
                        .classifier
                        .regularization_grid
                        .iter()
                        .map(move |&alpha| Candidate {
                            shrinkage,
                            adaptation_strength: beta,
                            regularization: alpha,
                        })
                })
            })
            .collect();

        match self.config.search.strategy {
            SearchStrategy::Grid => grid,
            SearchStrategy::Random => {
                let budget = self.config.search.num_search_iterations.min(grid.len());
                let mut rng = derive_rng(self.seed, &[stream::SEARCH, fold_id as u64]);
                let mut picked = rand::seq::index::sample(&mut rng, grid.len(), budget).into_vec();
                picked.sort_unstable();
                picked.into_iter().map(|i| grid[i]).collect()
            }
        }
    }

    fn evaluate_fold(
        &self,
        dataset: &Dataset,
        fold_id: usize,
        fold: &FoldIndices,
    ) -> Result<FoldResult> {
        let span = info_span!("outer_fold", fold = fold_id);
        let _entered = span.enter();
        let started = Instant::now();

        let labels = dataset.labels();
        let sites = dataset.sites();
        let inner_seed = derive_seed(self.seed, &[stream::INNER_SPLIT, fold_id as u64]);
        let inner = inner_splits(
            &labels,
            &sites,
            &fold.train,
            self.config.split.inner_folds,
            inner_seed,
        )?;

        let candidates = self.candidates(fold_id);
        let mut table: Vec<Vec<f64>> = vec![Vec::with_capacity(inner.len()); candidates.len()];
        for split in &inner {
            let scores = self.score_candidates_on_split(dataset, &candidates, split)?;
            for (column, score) in scores.into_iter().enumerate() {
                table[column].push(score);
            }
        }

        let reports: Vec<CandidateReport> = candidates
            .iter()
            .zip(table.into_iter())
            .map(|(&candidate, inner_scores)| {
                let mean_score = if inner_scores.iter().any(|s| !s.is_finite()) {
                    f64::NAN
                } else {
                    inner_scores.iter().sum::<f64>() / inner_scores.len() as f64
                };
                CandidateReport {
                    candidate,
                    inner_scores,
                    mean_score,
                }
            })
            .collect();

        let selected = select_best(&reports).ok_or(FconnError::AllCandidatesFailed {
            fold: fold_id,
            candidates: reports.len(),
        })?;
        debug!(?selected, "selected candidate");

        let (pipeline, retry_shrinkage) =
            fit_with_retry(dataset, &fold.train, selected, self.config, self.positive_class)?;

        let scores = pipeline.decision_scores(dataset, &fold.test)?;
        let test_labels: Vec<u8> = fold
            .test
            .iter()
            .map(|&i| dataset.subject(i).diagnosis())
            .collect();
        let test_scores = evaluate(&test_labels, &scores, self.positive_class)?;

        let elapsed_secs = started.elapsed().as_secs_f64();
        info!(
            score = test_scores.get(self.config.scoring.metric),
            elapsed_secs, "outer fold finished"
        );

        Ok(FoldResult {
            fold_id,
            selected,
            retry_shrinkage,
            test_scores,
            num_train: fold.train.len(),
            num_test: fold.test.len(),
            elapsed_secs,
            candidate_reports: reports,
            pipeline,
        })
    }

    /// Selection-metric score for every candidate on one inner split,
    /// indexed like `candidates`. Candidates sharing a shrinkage share the
    /// staged features; shrinkage groups run across the rayon pool.
    fn score_candidates_on_split(
        &self,
        dataset: &Dataset,
        candidates: &[Candidate],
        split: &FoldIndices,
    ) -> Result<Vec<f64>> {
        // Group candidate indices by exact shrinkage value, preserving order
        let mut groups: Vec<(f64, Vec<usize>)> = Vec::new();
        for (idx, candidate) in candidates.iter().enumerate() {
            match groups
                .iter_mut()
                .find(|(g, _)| g.to_bits() == candidate.shrinkage.to_bits())
            {
                Some((_, members)) => members.push(idx),
                None => groups.push((candidate.shrinkage, vec![idx])),
            }
        }

        let outcomes: Vec<Vec<(usize, f64)>> = groups
            .par_iter()
            .map(|(shrinkage, members)| {
                self.score_shrinkage_group(dataset, candidates, *shrinkage, members, split)
            })
            .collect::<Result<_>>()?;

        let mut scores = vec![f64::NAN; candidates.len()];
        for group in outcomes {
            for (idx, score) in group {
                scores[idx] = score;
            }
        }
        Ok(scores)
    }

    fn score_shrinkage_group(
        &self,
        dataset: &Dataset,
        candidates: &[Candidate],
        shrinkage: f64,
        members: &[usize],
        split: &FoldIndices,
    ) -> Result<Vec<(usize, f64)>> {
        let staged = match self.stage_features(dataset, shrinkage, split) {
            Ok(staged) => staged,
            Err(err) if err.is_numeric() => {
                debug!(shrinkage, error = %err, "feature stage failed, failing group");
                return Ok(members.iter().map(|&idx| (idx, f64::NAN)).collect());
            }
            Err(err) => return Err(err),
        };

        let train_sites: Vec<&str> = split
            .train
            .iter()
            .map(|&i| dataset.subject(i).site())
            .collect();
        let val_sites: Vec<&str> = split
            .test
            .iter()
            .map(|&i| dataset.subject(i).site())
            .collect();
        let train_labels: Vec<u8> = split
            .train
            .iter()
            .map(|&i| dataset.subject(i).diagnosis())
            .collect();
        let val_labels: Vec<u8> = split
            .test
            .iter()
            .map(|&i| dataset.subject(i).diagnosis())
            .collect();

        let adapter = SiteAdapter::from_config(&self.config.adaptation);
        let metric = self.config.scoring.metric;

        let mut out = Vec::with_capacity(members.len());
        for &idx in members {
            let candidate = candidates[idx];
            let score = (|| -> Result<f64> {
                let transform = adapter.fit(
                    staged.train.view(),
                    &train_sites,
                    candidate.adaptation_strength,
                )?;
                let adapted_train = transform.apply(staged.train.view(), &train_sites);
                let adapted_val = transform.apply(staged.val.view(), &val_sites);

                let classifier = fit_classifier(
                    self.config.classifier.kind,
                    candidate.regularization,
                    self.config.classifier.num_solver_iterations,
                    adapted_train.view(),
                    &train_labels,
                    self.positive_class,
                )?;
                let scores = classifier.decision_batch(adapted_val.view());
                Ok(evaluate(&val_labels, &scores, self.positive_class)?.get(metric))
            })();

            match score {
                Ok(value) => out.push((idx, value)),
                Err(err) if err.is_numeric() => {
                    debug!(?candidate, error = %err, "candidate failed");
                    out.push((idx, f64::NAN));
                }
                Err(err) => return Err(err),
            }
        }
        Ok(out)
    }

    /// Extraction → reference fit → tangent projection → second-order
    /// features for one inner split at one shrinkage. The reference is fit
    /// on the split's training matrices only.
    fn stage_features(
        &self,
        dataset: &Dataset,
        shrinkage: f64,
        split: &FoldIndices,
    ) -> Result<StagedFeatures> {
        let extractor = ConnectivityExtractor::from_config(&self.config.connectivity, shrinkage);
        let train_matrices = extractor.extract_cohort(dataset, &split.train)?;
        let val_matrices = extractor.extract_cohort(dataset, &split.test)?;

        let projector = TangentProjector::from_config(&self.config.tangent);
        let reference = projector.fit(&train_matrices)?;
        let train_tangents = projector.project_cohort(&train_matrices, &reference)?;
        let val_tangents = projector.project_cohort(&val_matrices, &reference)?;

        let correlator = SecondOrderCorrelator::new();
        let num_regions = dataset.num_regions();
        Ok(StagedFeatures {
            train: correlator.features_cohort(&train_tangents, num_regions)?,
            val: correlator.features_cohort(&val_tangents, num_regions)?,
        })
    }
}

struct StagedFeatures {
    train: Array2<f64>,
    val: Array2<f64>,
}

/// Best finite mean score; ties broken toward the least complex candidate.
fn select_best(reports: &[CandidateReport]) -> Option<Candidate> {
    let mut best: Option<&CandidateReport> = None;
    for report in reports {
        if !report.mean_score.is_finite() {
            continue;
        }
        best = Some(match best {
            None => report,
            Some(current) => {
                if prefer(report, current) {
                    report
                } else {
                    current
                }
            }
        });
    }
    best.map(|r| r.candidate)
}

/// True when `a` should replace the incumbent `b`.
fn prefer(a: &CandidateReport, b: &CandidateReport) -> bool {
    if a.mean_score != b.mean_score {
        return a.mean_score > b.mean_score;
    }
    let ca = &a.candidate;
    let cb = &b.candidate;
    if ca.regularization != cb.regularization {
        return ca.regularization > cb.regularization;
    }
    if ca.adaptation_strength != cb.adaptation_strength {
        return ca.adaptation_strength < cb.adaptation_strength;
    }
    if ca.shrinkage != cb.shrinkage {
        return ca.shrinkage > cb.shrinkage;
    }
    false // keep the earlier grid entry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(mean: f64, shrinkage: f64, beta: f64, alpha: f64) -> CandidateReport {
        CandidateReport {
            candidate: Candidate {
                shrinkage,
                adaptation_strength: beta,
                regularization: alpha,
            },
            inner_scores: vec![mean],
            mean_score: mean,
        }
    }

    #[test]
    fn test_select_best_by_mean() {
        let reports = vec![
            report(0.6, 0.01, 0.0, 1.0),
            report(0.8, 0.05, 0.5, 10.0),
            report(0.7, 0.1, 1.0, 0.1),
        ];
        let best = select_best(&reports).unwrap();
        assert_eq!(best.regularization, 10.0);
    }

    #[test]
    fn test_ties_prefer_stronger_regularization() {
        let reports = vec![
            report(0.8, 0.01, 0.0, 1.0),
            report(0.8, 0.01, 0.0, 100.0),
        ];
        let best = select_best(&reports).unwrap();
        assert_eq!(best.regularization, 100.0);
    }

    #[test]
    fn test_ties_then_prefer_lower_adaptation() {
        let reports = vec![
            report(0.8, 0.01, 1.0, 10.0),
            report(0.8, 0.01, 0.0, 10.0),
        ];
        let best = select_best(&reports).unwrap();
        assert_eq!(best.adaptation_strength, 0.0);
    }

    #[test]
    fn test_failed_candidates_ignored() {
        let reports = vec![report(f64::NAN, 0.01, 0.0, 1.0), report(0.5, 0.05, 0.5, 1.0)];
        let best = select_best(&reports).unwrap();
        assert_eq!(best.shrinkage, 0.05);
    }

    #[test]
    fn test_all_failed_selects_nothing() {
        let reports = vec![report(f64::NAN, 0.01, 0.0, 1.0)];
        assert!(select_best(&reports).is_none());
    }

    #[test]
    fn test_grid_enumeration_order() {
        let config = RunConfig::default();
        let selector = ModelSelector::new(&config, 1, 1);
        let candidates = selector.candidates(0);
        let expected = config.connectivity.shrinkage_grid.len()
            * config.adaptation.strength_grid.len()
            * config.classifier.regularization_grid.len();
        assert_eq!(candidates.len(), expected);
        // shrinkage is the slowest-varying axis
        assert_eq!(candidates[0].shrinkage, config.connectivity.shrinkage_grid[0]);
        assert_eq!(
            candidates.last().unwrap().shrinkage,
            *config.connectivity.shrinkage_grid.last().unwrap()
        );
    }

    #[test]
    fn test_random_search_is_seed_deterministic() {
        let mut config = RunConfig::default();
        config.search.strategy = SearchStrategy::Random;
        config.search.num_search_iterations = 5;
        let selector = ModelSelector::new(&config, 9, 1);
        let a = selector.candidates(2);
        let b = selector.candidates(2);
        assert_eq!(a.len(), 5);
        assert_eq!(a, b);
        // Different folds draw different subsets
        let c = selector.candidates(3);
        assert!(a != c || a.len() == 45);
    }
}
