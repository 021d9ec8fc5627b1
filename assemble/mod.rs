//! # Table Assembly
//!
//! Entry point for collaborator-provided data: per-domain wide CSV tables
//! (demographics, executive function, ERP, balance, spectral, connectivity),
//! each one row per participant, keyed by a shared participant column.
//! This module loads them, validates them against the integrity rules, and
//! joins them into one [`FeatureMatrix`](crate::types::FeatureMatrix).
//!
//! Integrity violations here are fatal: a duplicated participant or
//! a silently dropped join key would make every downstream statistic wrong.

pub mod io;
pub mod join;

pub use io::{DomainTable, load_domain_table};
pub use join::TableAssembler;

use crate::types::MatrixError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssembleError {
    #[error("error from the underlying Polars DataFrame library: {0}")]
    Polars(#[from] polars::prelude::PolarsError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Matrix(#[from] MatrixError),
    #[error("table '{table}' has no key column named '{key}'")]
    KeyColumnMissing { table: String, key: String },
    #[error("table '{table}' has a missing participant key at row {row}")]
    MissingKeyValue { table: String, row: usize },
    #[error(
        "column '{column}' in table '{table}' contains non-numeric data that is not a missing marker"
    )]
    NonNumericColumn { table: String, column: String },
    #[error("participant '{id}' appears more than once in table '{table}'")]
    DuplicateParticipant { table: String, id: String },
    #[error("column '{column}' appears in more than one table ('{first}' and '{second}')")]
    ColumnCollision {
        column: String,
        first: String,
        second: String,
    },
    #[error("outcome column '{0}' was not found in any input table")]
    OutcomeNotFound(String),
    #[error("table '{0}' contains no data rows")]
    EmptyTable(String),
}
