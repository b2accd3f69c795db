// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Site adaptation
//!
//! Multi-site cohorts carry scanner- and protocol-specific variance that a
//! classifier will happily latch onto. The adapter re-centers and re-scales
//! each site's features toward the pooled training distribution,
//! interpolated by an adaptation strength β:
//!
//!   x′ = (1 − β)·x + β·((x − μ_site)/σ_site · σ_pooled + μ_pooled)
//!
//! β = 0 is the identity, β = 1 fully aligns first and second moments per
//! site. The transform is fit on a fold's training partition only and
//! applied identically to train and held-out samples.

use ahash::AHashMap;
use fconn_config::{AdaptationConfig, ConfigError, SmallSitePolicy};
use ndarray::{Array2, ArrayView2};
use serde::Serialize;
use tracing::warn;

use crate::error::Result;

/// Bucket that undersized sites are pooled into under
/// [`SmallSitePolicy::Merge`]
pub const OTHER_SITE_BUCKET: &str = "__other__";

/// Feature std below this is replaced to avoid division blow-ups
const STD_FLOOR: f64 = 1e-6;

/// Per-site (or pooled) first and second moments.
#[derive(Debug, Clone, Serialize)]
struct MomentStats {
    mean: Vec<f64>,
    std: Vec<f64>,
    count: usize,
}

impl MomentStats {
    fn from_rows(features: &ArrayView2<f64>, rows: &[usize]) -> Self {
        let d = features.ncols();
        let n = rows.len() as f64;

        let mut mean = vec![0.0; d];
        for &row in rows {
            for (f, m) in features.row(row).iter().zip(mean.iter_mut()) {
                *m += f;
            }
        }
        for m in mean.iter_mut() {
            *m /= n;
        }

        let mut std = vec![0.0; d];
        for &row in rows {
            for ((f, m), s) in features.row(row).iter().zip(mean.iter()).zip(std.iter_mut()) {
                let diff = f - m;
                *s += diff * diff;
            }
        }
        for s in std.iter_mut() {
            *s = (*s / n).sqrt().max(STD_FLOOR);
        }

        Self {
            mean,
            std,
            count: rows.len(),
        }
    }
}

/// Fitted site-adaptation parameters. Deterministic and stateless to apply;
/// owned by the fold that fit it.
#[derive(Debug, Clone, Serialize)]
pub struct SiteAdaptationTransform {
    strength: f64,
    pooled: MomentStats,
    site_stats: AHashMap<String, MomentStats>,
    /// Sites folded into [`OTHER_SITE_BUCKET`] during fitting
    merged_sites: Vec<String>,
}

impl SiteAdaptationTransform {
    pub fn strength(&self) -> f64 {
        self.strength
    }

    pub fn merged_sites(&self) -> &[String] {
        &self.merged_sites
    }

    fn stats_for(&self, site: &str) -> &MomentStats {
        let key: &str = if self.merged_sites.iter().any(|s| s == site) {
            OTHER_SITE_BUCKET
        } else {
            site
        };
        match self.site_stats.get(key) {
            Some(stats) => stats,
            None => {
                // Site unseen during fitting: pooled stats make the
                // alignment term the identity
                warn!(site, "site unseen at fit time, using pooled statistics");
                &self.pooled
            }
        }
    }

    /// Apply the transform to a feature matrix (rows aligned with `sites`).
    pub fn apply(&self, features: ArrayView2<f64>, sites: &[&str]) -> Array2<f64> {
        debug_assert_eq!(features.nrows(), sites.len());
        let beta = self.strength;
        let mut out = features.to_owned();

        for (mut row, &site) in out.rows_mut().into_iter().zip(sites.iter()) {
            let stats = self.stats_for(site);
            for (k, x) in row.iter_mut().enumerate() {
                let aligned =
                    (*x - stats.mean[k]) / stats.std[k] * self.pooled.std[k] + self.pooled.mean[k];
                *x = (1.0 - beta) * *x + beta * aligned;
            }
        }
        out
    }
}

/// Fits [`SiteAdaptationTransform`]s under the configured small-site policy.
#[derive(Debug, Clone)]
pub struct SiteAdapter {
    min_site_samples: usize,
    policy: SmallSitePolicy,
}

impl SiteAdapter {
    pub fn new(min_site_samples: usize, policy: SmallSitePolicy) -> Self {
        Self {
            min_site_samples,
            policy,
        }
    }

    pub fn from_config(config: &AdaptationConfig) -> Self {
        Self::new(config.min_site_samples, config.small_site_policy)
    }

    /// Fit per-site statistics from training features and site labels.
    ///
    /// # Errors
    ///
    /// `ConfigError::InsufficientSamples` when a site is below the minimum
    /// and the policy is [`SmallSitePolicy::Fail`].
    pub fn fit(
        &self,
        features: ArrayView2<f64>,
        sites: &[&str],
        strength: f64,
    ) -> Result<SiteAdaptationTransform> {
        debug_assert_eq!(features.nrows(), sites.len());

        // Rows per site, first-seen order for deterministic reporting
        let mut site_order: Vec<&str> = Vec::new();
        let mut site_rows: AHashMap<&str, Vec<usize>> = AHashMap::new();
        for (row, &site) in sites.iter().enumerate() {
            if !site_rows.contains_key(site) {
                site_order.push(site);
            }
            site_rows.entry(site).or_default().push(row);
        }

        let mut merged_sites: Vec<String> = Vec::new();
        let mut merged_rows: Vec<usize> = Vec::new();
        for &site in &site_order {
            let rows = &site_rows[site];
            if rows.len() < self.min_site_samples {
                match self.policy {
                    SmallSitePolicy::Fail => {
                        return Err(ConfigError::InsufficientSamples {
                            group: "site",
                            name: site.to_string(),
                            actual: rows.len(),
                            required: self.min_site_samples,
                        }
                        .into());
                    }
                    SmallSitePolicy::Merge => {
                        warn!(
                            site,
                            samples = rows.len(),
                            "merging undersized site into shared bucket"
                        );
                        merged_sites.push(site.to_string());
                        merged_rows.extend_from_slice(rows);
                    }
                }
            }
        }

        let all_rows: Vec<usize> = (0..features.nrows()).collect();
        let pooled = MomentStats::from_rows(&features, &all_rows);

        let mut site_stats: AHashMap<String, MomentStats> = AHashMap::new();
        for &site in &site_order {
            if merged_sites.iter().any(|s| s == site) {
                continue;
            }
            site_stats.insert(
                site.to_string(),
                MomentStats::from_rows(&features, &site_rows[site]),
            );
        }
        if !merged_rows.is_empty() {
            if merged_rows.len() < self.min_site_samples {
                warn!(
                    samples = merged_rows.len(),
                    "merged site bucket is still undersized"
                );
            }
            site_stats.insert(
                OTHER_SITE_BUCKET.to_string(),
                MomentStats::from_rows(&features, &merged_rows),
            );
        }

        Ok(SiteAdaptationTransform {
            strength,
            pooled,
            site_stats,
            merged_sites,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn two_site_features() -> (Array2<f64>, Vec<&'static str>) {
        // Site A sits around +1, site B around -1, same shape
        let features = array![
            [1.2, 2.0],
            [0.8, 2.4],
            [1.0, 1.6],
            [-1.2, -2.0],
            [-0.8, -2.4],
            [-1.0, -1.6],
        ];
        let sites = vec!["A", "A", "A", "B", "B", "B"];
        (features, sites)
    }

    #[test]
    fn test_zero_strength_is_identity() {
        let (features, sites) = two_site_features();
        let adapter = SiteAdapter::new(2, SmallSitePolicy::Merge);
        let transform = adapter.fit(features.view(), &sites, 0.0).unwrap();
        let out = transform.apply(features.view(), &sites);
        assert_relative_eq!(out, features, epsilon = 1e-12);
    }

    #[test]
    fn test_full_strength_equalizes_site_means() {
        let (features, sites) = two_site_features();
        let adapter = SiteAdapter::new(2, SmallSitePolicy::Merge);
        let transform = adapter.fit(features.view(), &sites, 1.0).unwrap();
        let out = transform.apply(features.view(), &sites);

        for col in 0..out.ncols() {
            let mean_a: f64 = (0..3).map(|i| out[[i, col]]).sum::<f64>() / 3.0;
            let mean_b: f64 = (3..6).map(|i| out[[i, col]]).sum::<f64>() / 3.0;
            assert_relative_eq!(mean_a, mean_b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_small_site_fail_policy() {
        let (features, mut sites) = two_site_features();
        sites[5] = "C"; // site C has a single subject
        let adapter = SiteAdapter::new(2, SmallSitePolicy::Fail);
        let err = adapter.fit(features.view(), &sites, 0.5).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn test_small_site_merge_policy() {
        let (features, mut sites) = two_site_features();
        sites[4] = "C";
        sites[5] = "D"; // C and D both undersized, pooled together
        let adapter = SiteAdapter::new(2, SmallSitePolicy::Merge);
        let transform = adapter.fit(features.view(), &sites, 0.5).unwrap();
        assert_eq!(transform.merged_sites(), &["C", "D"]);
        // Applying still works for merged and surviving sites alike
        let out = transform.apply(features.view(), &sites);
        assert_eq!(out.dim(), features.dim());
    }

    #[test]
    fn test_unseen_site_falls_back_to_pooled() {
        let (features, sites) = two_site_features();
        let adapter = SiteAdapter::new(2, SmallSitePolicy::Merge);
        let transform = adapter.fit(features.view(), &sites, 1.0).unwrap();

        let test_features = array![[0.5, 0.5]];
        let out = transform.apply(test_features.view(), &["UNSEEN"]);
        // Pooled fallback makes the alignment term the identity
        assert_relative_eq!(out, test_features, epsilon = 1e-9);
    }

    #[test]
    fn test_apply_is_deterministic() {
        let (features, sites) = two_site_features();
        let adapter = SiteAdapter::new(2, SmallSitePolicy::Merge);
        let transform = adapter.fit(features.view(), &sites, 0.7).unwrap();
        let a = transform.apply(features.view(), &sites);
        let b = transform.apply(features.view(), &sites);
        assert_eq!(a, b);
    }
}
