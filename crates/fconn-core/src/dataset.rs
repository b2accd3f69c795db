// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Subject and cohort data model
//!
//! A [`Subject`] is immutable once loaded: identifier, acquisition site,
//! diagnosis label, and a T×R region time series. A [`Dataset`] is the
//! ordered post-screening cohort. Screening drops malformed subjects into
//! [`ExclusionRecord`]s and continues, escalating to a fatal config error
//! only when a diagnosis class falls below the configured minimum.

use ahash::AHashMap;
use fconn_config::{ConfigError, RunConfig};
use ndarray::Array2;
use serde::Serialize;
use tracing::warn;

use crate::error::{FconnError, Result};

/// One participant: identifier, site label, diagnosis label, time series.
#[derive(Debug, Clone)]
pub struct Subject {
    id: String,
    site: String,
    diagnosis: u8,
    /// T timepoints × R regions
    series: Array2<f64>,
}

impl Subject {
    /// Create a subject from a T×R time series.
    ///
    /// # Errors
    ///
    /// `MalformedSubject` when the series has fewer than 2 timepoints or
    /// fewer than 2 regions. Value-level screening (non-finite entries,
    /// constant signal) happens in [`Dataset::screen`], which excludes
    /// rather than fails.
    pub fn new(
        id: impl Into<String>,
        site: impl Into<String>,
        diagnosis: u8,
        series: Array2<f64>,
    ) -> Result<Self> {
        let id = id.into();
        let (t, r) = series.dim();
        if t < 2 || r < 2 {
            return Err(FconnError::MalformedSubject {
                subject: id,
                reason: format!("series shape {}x{} is too small (need >= 2x2)", t, r),
            });
        }
        Ok(Self {
            id,
            site: site.into(),
            diagnosis,
            series,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn diagnosis(&self) -> u8 {
        self.diagnosis
    }

    /// T×R time series (timepoints × regions)
    pub fn series(&self) -> &Array2<f64> {
        &self.series
    }

    pub fn num_timepoints(&self) -> usize {
        self.series.nrows()
    }

    pub fn num_regions(&self) -> usize {
        self.series.ncols()
    }
}

/// Why a subject was dropped during screening.
#[derive(Debug, Clone, Serialize)]
pub struct ExclusionRecord {
    pub subject_id: String,
    pub reason: String,
}

/// Post-exclusion subject metadata, exposed to the artifact writer.
#[derive(Debug, Clone, Serialize)]
pub struct SubjectMeta {
    pub id: String,
    pub site: String,
    pub diagnosis: u8,
}

/// Ordered post-screening cohort.
#[derive(Debug, Clone)]
pub struct Dataset {
    subjects: Vec<Subject>,
    num_regions: usize,
}

impl Dataset {
    /// Screen raw subjects into a usable cohort.
    ///
    /// Exclusion rules (recorded, never fatal by themselves):
    /// - region count differs from `cohort.expected_regions` (or from the
    ///   first accepted subject when unset)
    /// - non-finite values anywhere in the series
    /// - constant signal: every region's variance below
    ///   `connectivity.variance_floor`
    ///
    /// # Errors
    ///
    /// `EmptyCohort` when nothing survives; `ConfigError` when a surviving
    /// diagnosis class has fewer than `cohort.min_class_samples` subjects.
    pub fn screen(
        subjects: Vec<Subject>,
        config: &RunConfig,
    ) -> Result<(Self, Vec<ExclusionRecord>)> {
        let mut accepted: Vec<Subject> = Vec::with_capacity(subjects.len());
        let mut exclusions = Vec::new();
        let mut expected_regions = config.cohort.expected_regions;

        for subject in subjects {
            let reason = screen_one(&subject, expected_regions, config.connectivity.variance_floor);
            match reason {
                Some(reason) => {
                    warn!(subject = subject.id(), %reason, "excluding subject");
                    exclusions.push(ExclusionRecord {
                        subject_id: subject.id().to_string(),
                        reason,
                    });
                }
                None => {
                    expected_regions.get_or_insert(subject.num_regions());
                    accepted.push(subject);
                }
            }
        }

        if accepted.is_empty() {
            return Err(FconnError::EmptyCohort(
                "no subjects survived screening".into(),
            ));
        }

        let mut class_counts: AHashMap<u8, usize> = AHashMap::new();
        for subject in &accepted {
            *class_counts.entry(subject.diagnosis()).or_insert(0) += 1;
        }
        for (&class, &count) in &class_counts {
            if count < config.cohort.min_class_samples {
                return Err(ConfigError::InsufficientSamples {
                    group: "class",
                    name: class.to_string(),
                    actual: count,
                    required: config.cohort.min_class_samples,
                }
                .into());
            }
        }

        let num_regions = accepted[0].num_regions();
        Ok((
            Self {
                subjects: accepted,
                num_regions,
            },
            exclusions,
        ))
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }

    pub fn subject(&self, index: usize) -> &Subject {
        &self.subjects[index]
    }

    /// Region count R, uniform across the cohort after screening.
    pub fn num_regions(&self) -> usize {
        self.num_regions
    }

    pub fn labels(&self) -> Vec<u8> {
        self.subjects.iter().map(|s| s.diagnosis()).collect()
    }

    pub fn sites(&self) -> Vec<&str> {
        self.subjects.iter().map(|s| s.site()).collect()
    }

    /// Distinct diagnosis labels, sorted.
    pub fn classes(&self) -> Vec<u8> {
        let mut classes: Vec<u8> = Vec::new();
        for subject in &self.subjects {
            if !classes.contains(&subject.diagnosis()) {
                classes.push(subject.diagnosis());
            }
        }
        classes.sort_unstable();
        classes
    }

    /// Subjects per site, in first-seen order.
    pub fn site_counts(&self) -> Vec<(String, usize)> {
        let mut order: Vec<String> = Vec::new();
        let mut counts: AHashMap<String, usize> = AHashMap::new();
        for subject in &self.subjects {
            if !counts.contains_key(subject.site()) {
                order.push(subject.site().to_string());
            }
            *counts.entry(subject.site().to_string()).or_insert(0) += 1;
        }
        order
            .into_iter()
            .map(|site| {
                let count = counts[&site];
                (site, count)
            })
            .collect()
    }

    pub fn metadata(&self) -> Vec<SubjectMeta> {
        self.subjects
            .iter()
            .map(|s| SubjectMeta {
                id: s.id().to_string(),
                site: s.site().to_string(),
                diagnosis: s.diagnosis(),
            })
            .collect()
    }
}

fn screen_one(
    subject: &Subject,
    expected_regions: Option<usize>,
    variance_floor: f64,
) -> Option<String> {
    if let Some(expected) = expected_regions {
        if subject.num_regions() != expected {
            return Some(format!(
                "expected {} regions, found {}",
                expected,
                subject.num_regions()
            ));
        }
    }

    if subject.series().iter().any(|v| !v.is_finite()) {
        return Some("non-finite values in time series".to_string());
    }

    let t = subject.num_timepoints() as f64;
    let all_constant = subject.series().columns().into_iter().all(|col| {
        let mean = col.sum() / t;
        let var = col.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / t;
        var < variance_floor
    });
    if all_constant {
        return Some("constant time series across all regions".to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn wiggly_subject(id: &str, site: &str, diagnosis: u8) -> Subject {
        let series = array![
            [1.0, 2.0, 0.5],
            [2.0, 1.0, 1.5],
            [0.0, 3.0, 0.0],
            [1.5, 0.5, 2.0],
        ];
        Subject::new(id, site, diagnosis, series).unwrap()
    }

    #[test]
    fn test_subject_shape_validation() {
        let too_small = Array2::<f64>::zeros((1, 3));
        assert!(Subject::new("s1", "A", 0, too_small).is_err());
    }

    #[test]
    fn test_constant_subject_is_excluded_not_fatal() {
        let constant = Subject::new("flat", "A", 0, Array2::from_elem((4, 3), 1.0)).unwrap();
        let subjects = vec![
            wiggly_subject("s1", "A", 0),
            wiggly_subject("s2", "A", 1),
            constant,
            wiggly_subject("s3", "B", 0),
            wiggly_subject("s4", "B", 1),
        ];
        let mut config = RunConfig::default();
        config.cohort.min_class_samples = 2;

        let (dataset, exclusions) = Dataset::screen(subjects, &config).unwrap();
        assert_eq!(dataset.len(), 4);
        assert_eq!(exclusions.len(), 1);
        assert_eq!(exclusions[0].subject_id, "flat");
    }

    #[test]
    fn test_region_mismatch_excluded() {
        let mut odd = Array2::<f64>::zeros((4, 4));
        odd[[0, 0]] = 1.0;
        odd[[1, 1]] = 1.0;
        let subjects = vec![
            wiggly_subject("s1", "A", 0),
            wiggly_subject("s2", "A", 1),
            Subject::new("odd", "B", 0, odd).unwrap(),
            wiggly_subject("s3", "B", 1),
        ];
        let mut config = RunConfig::default();
        config.cohort.min_class_samples = 1;

        let (dataset, exclusions) = Dataset::screen(subjects, &config).unwrap();
        assert_eq!(dataset.len(), 3);
        assert_eq!(exclusions[0].subject_id, "odd");
        assert_eq!(dataset.num_regions(), 3);
    }

    #[test]
    fn test_class_below_minimum_is_fatal() {
        let subjects = vec![
            wiggly_subject("s1", "A", 0),
            wiggly_subject("s2", "A", 0),
            wiggly_subject("s3", "A", 1),
        ];
        let mut config = RunConfig::default();
        config.cohort.min_class_samples = 2;

        let err = Dataset::screen(subjects, &config).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn test_empty_cohort() {
        let config = RunConfig::default();
        let constant = Subject::new("flat", "A", 0, Array2::from_elem((4, 3), 2.5)).unwrap();
        let err = Dataset::screen(vec![constant], &config).unwrap_err();
        assert!(matches!(err, FconnError::EmptyCohort(_)));
    }
}
