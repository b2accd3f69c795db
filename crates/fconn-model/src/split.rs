// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Cross-validation splitters
//!
//! Outer resampling is either K-fold stratified jointly by (diagnosis, site)
//! — optionally repeated — or leave-p-sites-out. Inner resampling is always
//! stratified. Strata are processed in sorted order and dealt round-robin
//! after a seeded shuffle, so for a fixed seed the splits are identical
//! regardless of thread count, and train/test sets of each fold are disjoint
//! and cover the parent set exactly once.

use ahash::AHashMap;
use rand::seq::SliceRandom;
use tracing::warn;

use fconn_config::{ConfigError, SplitConfig, SplitStrategyKind};
use fconn_core::dataset::Dataset;
use fconn_core::error::Result;
use fconn_core::rng::{derive_rng, derive_seed, stream};

/// One fold's disjoint train/test index sets (indices into the dataset).
#[derive(Debug, Clone)]
pub struct FoldIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Outer folds for the configured strategy.
pub fn outer_splits(dataset: &Dataset, config: &SplitConfig, seed: u64) -> Result<Vec<FoldIndices>> {
    let labels = dataset.labels();
    let sites = dataset.sites();
    let parent: Vec<usize> = (0..dataset.len()).collect();

    match config.strategy {
        SplitStrategyKind::Stratified => {
            let mut folds = Vec::new();
            for repeat in 0..config.num_repeats {
                let rng_seed = derive_seed(seed, &[stream::OUTER_SPLIT, repeat as u64]);
                folds.extend(stratified_folds(
                    &labels,
                    &sites,
                    &parent,
                    config.outer_folds,
                    rng_seed,
                )?);
            }
            Ok(folds)
        }
        SplitStrategyKind::LeaveSitesOut => {
            leave_sites_out(&labels, &sites, &parent, config.num_test_sites)
        }
    }
}

/// Inner folds over an outer-training partition.
///
/// `inner_folds == 1` degenerates to a single resubstitution evaluation:
/// candidates are fit and scored on the whole partition. That keeps tiny
/// cohorts selectable (a genuine holdout of a 2-subject partition leaves a
/// single-class training set); the outer test estimate stays untouched.
/// Disjoint train/validation splits require `inner_folds >= 2`.
pub fn inner_splits(
    labels: &[u8],
    sites: &[&str],
    parent: &[usize],
    inner_folds: usize,
    seed: u64,
) -> Result<Vec<FoldIndices>> {
    if inner_folds == 1 {
        warn!("inner_folds = 1: scoring candidates by resubstitution");
        return Ok(vec![FoldIndices {
            train: parent.to_vec(),
            test: parent.to_vec(),
        }]);
    }
    stratified_folds(labels, sites, parent, inner_folds, seed)
}

/// K folds stratified jointly by (diagnosis, site).
///
/// Each stratum is shuffled with the seeded stream, then samples are dealt
/// round-robin with a counter that carries across strata, so folds are
/// balanced both overall and within every stratum.
fn stratified_folds(
    labels: &[u8],
    sites: &[&str],
    parent: &[usize],
    k: usize,
    rng_seed: u64,
) -> Result<Vec<FoldIndices>> {
    if k < 2 {
        return Err(ConfigError::InvalidValue(format!("fold count {} must be at least 2", k)).into());
    }
    if parent.len() < k {
        return Err(ConfigError::InvalidValue(format!(
            "cannot split {} subjects into {} folds",
            parent.len(),
            k
        ))
        .into());
    }

    // Strata in sorted (label, site) order for determinism
    let mut strata: AHashMap<(u8, &str), Vec<usize>> = AHashMap::new();
    for &idx in parent {
        strata.entry((labels[idx], sites[idx])).or_default().push(idx);
    }
    let mut keys: Vec<(u8, &str)> = strata.keys().copied().collect();
    keys.sort_unstable();

    let mut rng = derive_rng(rng_seed, &[]);
    let mut assignment: Vec<Vec<usize>> = vec![Vec::new(); k];
    let mut counter = 0usize;
    for key in keys {
        let members = strata.get_mut(&key).expect("stratum key");
        members.shuffle(&mut rng);
        for &idx in members.iter() {
            assignment[counter % k].push(idx);
            counter += 1;
        }
    }

    let folds = (0..k)
        .map(|f| {
            let test = assignment[f].clone();
            let mut train: Vec<usize> = Vec::with_capacity(parent.len() - test.len());
            for (g, fold_members) in assignment.iter().enumerate() {
                if g != f {
                    train.extend_from_slice(fold_members);
                }
            }
            train.sort_unstable();
            let mut test = test;
            test.sort_unstable();
            FoldIndices { train, test }
        })
        .collect();
    Ok(folds)
}

/// Every combination of `p` sites held out as a test set. Combinations are
/// generated over the sorted site list; degenerate folds (test empty, or
/// training partition left with a single class) are skipped with a warning.
fn leave_sites_out(
    labels: &[u8],
    sites: &[&str],
    parent: &[usize],
    p: usize,
) -> Result<Vec<FoldIndices>> {
    let mut unique: Vec<&str> = Vec::new();
    for &idx in parent {
        if !unique.contains(&sites[idx]) {
            unique.push(sites[idx]);
        }
    }
    unique.sort_unstable();

    if p >= unique.len() {
        return Err(ConfigError::InvalidValue(format!(
            "cannot hold out {} of {} sites",
            p,
            unique.len()
        ))
        .into());
    }

    let mut folds = Vec::new();
    for combo in combinations(unique.len(), p) {
        let held: Vec<&str> = combo.iter().map(|&i| unique[i]).collect();
        let test: Vec<usize> = parent
            .iter()
            .copied()
            .filter(|&idx| held.contains(&sites[idx]))
            .collect();
        let train: Vec<usize> = parent
            .iter()
            .copied()
            .filter(|&idx| !held.contains(&sites[idx]))
            .collect();

        let single_class = train
            .iter()
            .all(|&idx| labels[idx] == labels[train[0]]);
        if test.is_empty() || train.is_empty() || single_class {
            warn!(?held, "skipping degenerate leave-sites-out fold");
            continue;
        }
        folds.push(FoldIndices { train, test });
    }

    if folds.is_empty() {
        return Err(
            ConfigError::InvalidValue("leave-sites-out produced no usable folds".into()).into(),
        );
    }
    Ok(folds)
}

/// Lexicographic k-combinations of 0..n.
fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    let mut current = Vec::with_capacity(k);
    fn recurse(n: usize, k: usize, start: usize, current: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if current.len() == k {
            out.push(current.clone());
            return;
        }
        for i in start..n {
            current.push(i);
            recurse(n, k, i + 1, current, out);
            current.pop();
        }
    }
    recurse(n, k, 0, &mut current, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use fconn_config::RunConfig;
    use fconn_core::dataset::Subject;
    use ndarray::Array2;

    fn subject(id: &str, site: &str, diagnosis: u8, jitter: f64) -> Subject {
        let mut series = Array2::<f64>::zeros((6, 3));
        for t in 0..6 {
            for r in 0..3 {
                series[[t, r]] = ((t * 3 + r) as f64 * 0.37 + jitter).sin();
            }
        }
        Subject::new(id, site, diagnosis, series).unwrap()
    }

    fn dataset(n_per_cell: usize) -> Dataset {
        // n_per_cell subjects for each (site, class) combination
        let mut subjects = Vec::new();
        let mut k = 0;
        for site in ["A", "B"] {
            for class in [0u8, 1u8] {
                for _ in 0..n_per_cell {
                    subjects.push(subject(&format!("s{}", k), site, class, k as f64));
                    k += 1;
                }
            }
        }
        let mut config = RunConfig::default();
        config.cohort.min_class_samples = 1;
        Dataset::screen(subjects, &config).unwrap().0
    }

    fn check_disjoint_cover(folds: &[FoldIndices], parent_len: usize) {
        for fold in folds {
            let mut seen = vec![0usize; parent_len];
            for &i in &fold.train {
                seen[i] += 1;
            }
            for &i in &fold.test {
                seen[i] += 1;
            }
            assert!(seen.iter().all(|&c| c == 1), "train/test must partition the parent");
            assert!(!fold.test.is_empty());
            assert!(!fold.train.is_empty());
        }
    }

    #[test]
    fn test_stratified_disjoint_and_exact_cover() {
        let data = dataset(3); // 12 subjects
        let config = SplitConfig::default(); // 5 folds won't divide evenly
        let folds = outer_splits(&data, &config, 42).unwrap();
        assert_eq!(folds.len(), 5);
        check_disjoint_cover(&folds, data.len());

        // Every subject is tested exactly once across folds
        let mut tested = vec![0usize; data.len()];
        for fold in &folds {
            for &i in &fold.test {
                tested[i] += 1;
            }
        }
        assert!(tested.iter().all(|&c| c == 1));
    }

    #[test]
    fn test_stratified_balances_strata() {
        let data = dataset(4); // 16 subjects, 4 per stratum
        let mut config = SplitConfig::default();
        config.outer_folds = 4;
        let folds = outer_splits(&data, &config, 7).unwrap();
        let labels = data.labels();
        let sites = data.sites();
        for fold in &folds {
            // Each test fold gets exactly one subject from each stratum
            let mut per_stratum: AHashMap<(u8, &str), usize> = AHashMap::new();
            for &i in &fold.test {
                *per_stratum.entry((labels[i], sites[i])).or_insert(0) += 1;
            }
            assert_eq!(per_stratum.len(), 4);
            assert!(per_stratum.values().all(|&c| c == 1));
        }
    }

    #[test]
    fn test_splits_deterministic_for_seed() {
        let data = dataset(3);
        let config = SplitConfig::default();
        let a = outer_splits(&data, &config, 99).unwrap();
        let b = outer_splits(&data, &config, 99).unwrap();
        for (fa, fb) in a.iter().zip(b.iter()) {
            assert_eq!(fa.train, fb.train);
            assert_eq!(fa.test, fb.test);
        }
        let some_seed_differs = (100u64..110).any(|seed| {
            let c = outer_splits(&data, &config, seed).unwrap();
            a.iter().zip(c.iter()).any(|(fa, fc)| fa.test != fc.test)
        });
        assert!(some_seed_differs);
    }

    #[test]
    fn test_repeats_extend_folds() {
        let data = dataset(3);
        let mut config = SplitConfig::default();
        config.outer_folds = 3;
        config.num_repeats = 2;
        let folds = outer_splits(&data, &config, 5).unwrap();
        assert_eq!(folds.len(), 6);
        check_disjoint_cover(&folds, data.len());
    }

    #[test]
    fn test_single_inner_fold_is_resubstitution() {
        let data = dataset(3);
        let labels = data.labels();
        let sites = data.sites();
        let parent: Vec<usize> = (0..data.len()).step_by(2).collect();
        let folds = inner_splits(&labels, &sites, &parent, 1, 11).unwrap();
        assert_eq!(folds.len(), 1);
        assert_eq!(folds[0].train, parent);
        assert_eq!(folds[0].test, parent);
    }

    #[test]
    fn test_inner_folds_disjoint_for_k_at_least_two() {
        let data = dataset(3);
        let labels = data.labels();
        let sites = data.sites();
        let parent: Vec<usize> = (0..data.len()).collect();
        for k in [2, 3, 4] {
            let folds = inner_splits(&labels, &sites, &parent, k, 17).unwrap();
            assert_eq!(folds.len(), k);
            check_disjoint_cover(&folds, data.len());
        }
    }

    #[test]
    fn test_inner_splits_respect_parent_subset() {
        let data = dataset(3);
        let labels = data.labels();
        let sites = data.sites();
        let parent: Vec<usize> = (0..data.len()).step_by(2).collect();
        let folds = inner_splits(&labels, &sites, &parent, 3, 13).unwrap();
        for fold in &folds {
            for &i in fold.train.iter().chain(fold.test.iter()) {
                assert!(parent.contains(&i));
            }
        }
    }

    #[test]
    fn test_leave_sites_out() {
        let data = dataset(3);
        let mut config = SplitConfig::default();
        config.strategy = SplitStrategyKind::LeaveSitesOut;
        config.num_test_sites = 1;
        let folds = outer_splits(&data, &config, 1).unwrap();
        assert_eq!(folds.len(), 2); // sites A and B each held out once
        let sites = data.sites();
        for fold in &folds {
            let test_sites: Vec<&str> = fold.test.iter().map(|&i| sites[i]).collect();
            let train_sites: Vec<&str> = fold.train.iter().map(|&i| sites[i]).collect();
            assert!(test_sites.iter().all(|s| !train_sites.contains(s)));
        }
    }

    #[test]
    fn test_too_many_folds_rejected() {
        let data = dataset(1); // 4 subjects
        let mut config = SplitConfig::default();
        config.outer_folds = 10;
        assert!(outer_splits(&data, &config, 3).is_err());
    }
}
