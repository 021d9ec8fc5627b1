//! # Hyperparameter Search
//!
//! Grid search for the gradient booster. Candidates are evaluated in
//! parallel with `rayon`; each worker gets the shared (read-only) matrix and
//! a seed derived from the base seed and its candidate id, so results are
//! reproducible regardless of scheduling order or worker count. A candidate
//! whose evaluation fails is logged and excluded; the rest proceed.

pub mod rank;

pub use rank::{RankedCandidate, Recommendations, rank_candidates, recommend};

use crate::config::{SearchConfig, SeedStage, derive_seed};
use crate::evaluate::{HarnessConfig, ImputePolicy, run_harness};
use crate::model::boost::{BoostParams, GradientBooster};
use crate::numeric::{mean, sample_sd};
use crate::types::FeatureMatrix;
use itertools::iproduct;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Axis values for the boosting grid; the candidate set is the cross product.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostGrid {
    pub n_trees: Vec<usize>,
    pub max_depth: Vec<usize>,
    pub learning_rate: Vec<f64>,
    pub subsample: Vec<f64>,
    pub colsample: Vec<f64>,
    pub min_child_weight: Vec<f64>,
    pub reg_alpha: Vec<f64>,
    pub reg_lambda: Vec<f64>,
}

impl Default for BoostGrid {
    fn default() -> Self {
        Self {
            n_trees: vec![100, 300],
            max_depth: vec![2, 3, 4],
            learning_rate: vec![0.01, 0.05],
            subsample: vec![0.7, 1.0],
            colsample: vec![0.7, 1.0],
            min_child_weight: vec![3.0],
            reg_alpha: vec![0.0],
            reg_lambda: vec![1.0],
        }
    }
}

/// Expands the grid row-major; the enumeration index is the candidate id.
pub fn expand_grid(grid: &BoostGrid) -> Vec<(usize, BoostParams)> {
    iproduct!(
        &grid.n_trees,
        &grid.max_depth,
        &grid.learning_rate,
        &grid.subsample,
        &grid.colsample,
        &grid.min_child_weight,
        &grid.reg_alpha,
        &grid.reg_lambda
    )
    .map(
        |(&n_trees, &max_depth, &learning_rate, &subsample, &colsample, &min_child_weight, &reg_alpha, &reg_lambda)| {
            BoostParams {
                n_trees,
                max_depth,
                learning_rate,
                subsample,
                colsample,
                min_child_weight,
                reg_alpha,
                reg_lambda,
            }
        },
    )
    .enumerate()
    .collect()
}

/// Aggregated outer-split performance for one candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub id: usize,
    pub params: BoostParams,
    pub mean_r2: f64,
    pub sd_r2: f64,
    pub mean_rmse: f64,
    pub sd_rmse: f64,
    /// Worst-case split R²; the robustness component.
    pub worst_r2: f64,
    /// 1 / (1 + sd of R²); the stability component.
    pub stability: f64,
    pub n_splits_ok: usize,
    pub n_splits_skipped: usize,
}

/// Evaluates every grid candidate over repeated outer splits of the
/// pre-completed matrix. Failed candidates are excluded with a warning.
pub fn evaluate_candidates(
    matrix: &FeatureMatrix,
    grid: &BoostGrid,
    config: &SearchConfig,
    correlation_cutoff: f64,
    base_seed: u64,
) -> Vec<CandidateRecord> {
    let candidates = expand_grid(grid);
    log::info!(
        "hyperparameter search: {} candidates x {} outer splits",
        candidates.len(),
        config.outer_splits
    );

    let mut records: Vec<CandidateRecord> = candidates
        .par_iter()
        .filter_map(|(id, params)| {
            let harness_config = HarnessConfig {
                splits: config.outer_splits,
                train_proportion: config.train_proportion,
                cv_folds: config.inner_folds,
                correlation_cutoff,
                base_seed: derive_seed(base_seed, SeedStage::Candidate, *id as u64),
                impute_policy: ImputePolicy::PreCompleted,
            };
            let fitter = GradientBooster::new(params.clone());
            match run_harness(matrix, &harness_config, &fitter) {
                Ok(report) => Some(summarize_candidate(*id, params.clone(), &report)),
                Err(err) => {
                    log::warn!("candidate {id} excluded: {err}");
                    None
                }
            }
        })
        .collect();

    // Parallel collection order depends on scheduling; re-establish id order.
    records.sort_by_key(|r| r.id);
    records
}

fn summarize_candidate(
    id: usize,
    params: BoostParams,
    report: &crate::evaluate::HarnessReport,
) -> CandidateRecord {
    let r2s: Vec<f64> = report
        .records
        .iter()
        .filter_map(|r| r.metrics.as_ref())
        .map(|m| m.r_squared)
        .filter(|v| v.is_finite())
        .collect();
    let rmses: Vec<f64> = report
        .records
        .iter()
        .filter_map(|r| r.metrics.as_ref())
        .map(|m| m.rmse)
        .filter(|v| v.is_finite())
        .collect();
    let sd_r2 = sample_sd(&r2s);
    CandidateRecord {
        id,
        params,
        mean_r2: mean(&r2s),
        sd_r2,
        mean_rmse: mean(&rmses),
        sd_rmse: sample_sd(&rmses),
        worst_r2: r2s.iter().cloned().fold(f64::INFINITY, f64::min),
        stability: 1.0 / (1.0 + sd_r2),
        n_splits_ok: report.n_succeeded,
        n_splits_skipped: report.n_skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_expansion_is_row_major_with_stable_ids() {
        let grid = BoostGrid {
            n_trees: vec![10, 20],
            max_depth: vec![2],
            learning_rate: vec![0.1, 0.2],
            subsample: vec![1.0],
            colsample: vec![1.0],
            min_child_weight: vec![1.0],
            reg_alpha: vec![0.0],
            reg_lambda: vec![1.0],
        };
        let expanded = expand_grid(&grid);
        assert_eq!(expanded.len(), 4);
        assert_eq!(expanded[0].0, 0);
        assert_eq!(expanded[0].1.n_trees, 10);
        assert_eq!(expanded[0].1.learning_rate, 0.1);
        assert_eq!(expanded[1].1.learning_rate, 0.2);
        assert_eq!(expanded[2].1.n_trees, 20);
        assert_eq!(expanded[3].0, 3);
    }
}
