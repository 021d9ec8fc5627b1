//! # Multiple Imputation
//!
//! Predictive-mean-matching (PMM) multiple imputation over an assembled
//! [`FeatureMatrix`](crate::types::FeatureMatrix):
//!
//! 1. [`predictor`] builds the predictor-selection matrix (which columns are
//!    allowed to impute which targets) from pairwise correlation and
//!    usable-case thresholds, auxiliary force-inclusions, and declarative
//!    group overrides.
//! 2. [`pmm`] runs the chained-equation PMM sweeps, once per imputation run,
//!    each run with its own deterministically derived seed.
//! 3. [`aggregate`] collapses the `m` completions into one analysis matrix by
//!    averaging only the originally-missing cells.
//! 4. [`batch`] is the job-array interface: one task id, one artifact, and a
//!    combiner that demands the exact expected artifact count.
//!
//! PMM never invents values: every imputed cell is an actually-observed value
//! drawn from the nearest-predicted donors, so imputations stay inside the
//! observed range by construction.

pub mod aggregate;
pub mod batch;
pub mod pmm;
pub mod predictor;

pub use aggregate::{AggregatedMatrix, DroppedColumn, average_completions};
pub use pmm::{ImputationEnsemble, impute_multiple, impute_once};
pub use predictor::build_predictor_matrix;

use crate::types::MatrixError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-column imputation method, decided by role and missingness state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImputationMethod {
    /// Predictive mean matching.
    Pmm,
    /// Excluded from imputation (identifier/outcome by role, or fully observed).
    None,
}

#[derive(Error, Debug)]
pub enum ImputeError {
    #[error(transparent)]
    Matrix(#[from] MatrixError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("artifact serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("column '{0}' has no observed values to donate from")]
    NoDonors(String),
    #[error("expected {expected} imputation artifacts in {dir}, found {found} (missing: {missing:?})")]
    MissingArtifacts {
        dir: String,
        expected: u32,
        found: usize,
        missing: Vec<String>,
    },
    #[error("completion count mismatch: aggregator was given {0} completed matrices")]
    NoCompletions(usize),
    #[error("completion shape differs from the source matrix")]
    CompletionShapeMismatch,
}

/// Imputation-quality evidence surfaced for human review. Non-fatal, but
/// never swallowed: it travels with every artifact that leaves this module.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityReport {
    /// Targets that had zero eligible predictors and degraded to
    /// unconditional mean matching.
    pub unconditional_targets: Vec<String>,
    /// Per-imputed-column value ranges, observed vs imputed.
    pub column_ranges: Vec<ColumnRangeReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnRangeReport {
    pub column: String,
    pub n_missing: usize,
    pub observed_min: f64,
    pub observed_max: f64,
    pub imputed_min: f64,
    pub imputed_max: f64,
}

impl QualityReport {
    /// Merges per-run reports into one artifact for the whole ensemble.
    pub fn merge(reports: &[QualityReport]) -> QualityReport {
        let mut merged = QualityReport::default();
        for report in reports {
            for target in &report.unconditional_targets {
                if !merged.unconditional_targets.contains(target) {
                    merged.unconditional_targets.push(target.clone());
                }
            }
            for range in &report.column_ranges {
                match merged
                    .column_ranges
                    .iter_mut()
                    .find(|r| r.column == range.column)
                {
                    Some(existing) => {
                        existing.imputed_min = existing.imputed_min.min(range.imputed_min);
                        existing.imputed_max = existing.imputed_max.max(range.imputed_max);
                    }
                    None => merged.column_ranges.push(range.clone()),
                }
            }
        }
        merged
    }
}
