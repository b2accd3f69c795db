// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! The end-to-end Tangent Pearson pipeline
//!
//! connectivity → tangent projection → second-order correlation → site
//! adaptation → linear classifier, fit as one unit on a training index set.
//! Everything fit here (reference point, adaptation transform, classifier
//! weights) derives from the training indices alone; `transform` and
//! `decision_scores` then apply those frozen parameters to any index set.

use ndarray::Array2;
use serde::Serialize;
use tracing::warn;

use fconn_config::RunConfig;
use fconn_core::adapter::{SiteAdaptationTransform, SiteAdapter};
use fconn_core::connectivity::ConnectivityExtractor;
use fconn_core::dataset::Dataset;
use fconn_core::error::Result;
use fconn_core::second_order::SecondOrderCorrelator;
use fconn_core::tangent::{ReferencePoint, TangentProjector};

use crate::classifier::{fit_classifier, FittedClassifier};

/// One point in the hyperparameter search space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Candidate {
    /// Connectivity shrinkage coefficient γ
    pub shrinkage: f64,
    /// Site adaptation strength β
    pub adaptation_strength: f64,
    /// Classifier L2 strength α
    pub regularization: f64,
}

/// A pipeline fit on one training partition, frozen for evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct FittedPipeline {
    candidate: Candidate,
    num_regions: usize,
    positive_class: u8,
    extractor: ExtractorParams,
    reference: ReferencePoint,
    adaptation: SiteAdaptationTransform,
    classifier: FittedClassifier,
    #[serde(skip)]
    projector: TangentProjector,
}

/// Extraction parameters recorded with the fitted pipeline.
#[derive(Debug, Clone, Serialize)]
struct ExtractorParams {
    measure: fconn_config::MeasureKind,
    shrinkage: f64,
    variance_floor: f64,
}

impl FittedPipeline {
    pub fn candidate(&self) -> &Candidate {
        &self.candidate
    }

    pub fn reference(&self) -> &ReferencePoint {
        &self.reference
    }

    pub fn adaptation(&self) -> &SiteAdaptationTransform {
        &self.adaptation
    }

    pub fn classifier(&self) -> &FittedClassifier {
        &self.classifier
    }

    /// Adapted feature matrix for an index set, using the frozen fold
    /// parameters.
    pub fn transform(&self, dataset: &Dataset, indices: &[usize]) -> Result<Array2<f64>> {
        let extractor = ConnectivityExtractor::new(
            self.extractor.measure,
            self.extractor.shrinkage,
            self.extractor.variance_floor,
        );
        let matrices = extractor.extract_cohort(dataset, indices)?;
        let tangents = self.projector.project_cohort(&matrices, &self.reference)?;
        let features = SecondOrderCorrelator::new().features_cohort(&tangents, self.num_regions)?;
        let sites: Vec<&str> = indices.iter().map(|&i| dataset.subject(i).site()).collect();
        Ok(self.adaptation.apply(features.view(), &sites))
    }

    /// Decision scores for an index set.
    pub fn decision_scores(&self, dataset: &Dataset, indices: &[usize]) -> Result<Vec<f64>> {
        let adapted = self.transform(dataset, indices)?;
        Ok(self.classifier.decision_batch(adapted.view()))
    }
}

/// Fit the full pipeline on a training index set.
pub fn fit_pipeline(
    dataset: &Dataset,
    train: &[usize],
    candidate: Candidate,
    config: &RunConfig,
    positive_class: u8,
) -> Result<FittedPipeline> {
    let extractor = ConnectivityExtractor::from_config(&config.connectivity, candidate.shrinkage);
    let matrices = extractor.extract_cohort(dataset, train)?;

    let projector = TangentProjector::from_config(&config.tangent);
    let reference = projector.fit(&matrices)?;
    let tangents = projector.project_cohort(&matrices, &reference)?;

    let num_regions = dataset.num_regions();
    let features = SecondOrderCorrelator::new().features_cohort(&tangents, num_regions)?;

    let sites: Vec<&str> = train.iter().map(|&i| dataset.subject(i).site()).collect();
    let adapter = SiteAdapter::from_config(&config.adaptation);
    let adaptation = adapter.fit(features.view(), &sites, candidate.adaptation_strength)?;
    let adapted = adaptation.apply(features.view(), &sites);

    let labels: Vec<u8> = train
        .iter()
        .map(|&i| dataset.subject(i).diagnosis())
        .collect();
    let classifier = fit_classifier(
        config.classifier.kind,
        candidate.regularization,
        config.classifier.num_solver_iterations,
        adapted.view(),
        &labels,
        positive_class,
    )?;

    Ok(FittedPipeline {
        candidate,
        num_regions,
        positive_class,
        extractor: ExtractorParams {
            measure: config.connectivity.measure,
            shrinkage: candidate.shrinkage,
            variance_floor: config.connectivity.variance_floor,
        },
        reference,
        adaptation,
        classifier,
        projector,
    })
}

/// Shrinkage used for the one fold-level retry after a numeric failure.
pub(crate) fn strengthened_shrinkage(gamma: f64) -> f64 {
    (gamma * 2.0).max(0.1).min(0.9)
}

/// Fit with the fold-level retry policy: one numeric failure triggers a
/// single retry with strengthened shrinkage before the fold fails.
///
/// Returns the pipeline and the bumped shrinkage when the retry path ran.
pub(crate) fn fit_with_retry(
    dataset: &Dataset,
    train: &[usize],
    candidate: Candidate,
    config: &RunConfig,
    positive_class: u8,
) -> Result<(FittedPipeline, Option<f64>)> {
    match fit_pipeline(dataset, train, candidate, config, positive_class) {
        Ok(pipeline) => Ok((pipeline, None)),
        Err(err) if err.is_numeric() => {
            let bumped = strengthened_shrinkage(candidate.shrinkage);
            warn!(
                error = %err,
                shrinkage = candidate.shrinkage,
                retry_shrinkage = bumped,
                "pipeline fit failed, retrying with strengthened shrinkage"
            );
            let retried = Candidate {
                shrinkage: bumped,
                ..candidate
            };
            let pipeline = fit_pipeline(dataset, train, retried, config, positive_class)?;
            Ok((pipeline, Some(bumped)))
        }
        Err(err) => Err(err),
    }
}
