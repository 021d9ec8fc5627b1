//! # Repeated-Split Evaluation
//!
//! The harness draws R random train/test partitions, and inside each one:
//! imputes (per the pipeline variant's policy), prunes pairwise-correlated
//! predictors using the training fold only, selects hyperparameters via
//! k-fold cross-validation confined to the training rows, fits the final
//! model on the full training fold, and scores the held-out test fold.
//!
//! The loop is partial-failure tolerant: a degenerate fit is recorded as-is
//! so aggregate statistics reflect true variability, and a hard fit error is
//! logged against its split index and skipped without aborting the run.

pub mod harness;
pub mod metrics;
pub mod split;

pub use harness::{
    HarnessConfig, HarnessReport, ImputePolicy, PredictionRecord, SplitMetrics, SplitRecord,
    run_harness,
};
pub use split::{Fold, Split, fold_seed, make_folds, make_split};

use crate::types::MatrixError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error(transparent)]
    Matrix(#[from] MatrixError),
    #[error("no rows with an observed outcome; nothing to split")]
    NoEligibleRows,
    #[error(
        "the pre-completed policy requires a fully imputed matrix, but column '{0}' still has missing cells"
    )]
    IncompleteMatrix(String),
    #[error("train proportion {0} leaves an empty train or test partition")]
    DegenerateProportion(f64),
    #[error("every split failed to fit; no results to aggregate")]
    AllSplitsFailed,
}
