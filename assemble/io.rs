//! CSV loading for one per-domain wide table. A table is a participant key
//! column plus numeric feature columns; empty cells are missing, non-numeric
//! text in a feature column is a fatal integrity error (it would otherwise be
//! coerced to missing and silently change the analysis).

use super::AssembleError;
use crate::types::is_valid_participant_id;
use ndarray::Array2;
use polars::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

/// One loaded per-domain table, pre-join. Feature cells are `f64` with NaN
/// marking "not observed".
#[derive(Debug, Clone)]
pub struct DomainTable {
    pub name: String,
    pub participant_ids: Vec<String>,
    pub columns: Vec<String>,
    pub values: Array2<f64>,
}

impl DomainTable {
    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }
}

/// Loads one CSV table and validates its key column and numeric payload.
pub fn load_domain_table(
    path: &Path,
    key_column: &str,
) -> Result<DomainTable, AssembleError> {
    let table_name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    log::info!("Loading domain table '{table_name}' from {}", path.display());

    let df = CsvReader::new(File::open(path)?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_parse_options(CsvParseOptions::default().with_separator(b',')),
        )
        .finish()?;

    if df.height() == 0 {
        return Err(AssembleError::EmptyTable(table_name));
    }

    let column_names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    if !column_names.iter().any(|c| c == key_column) {
        return Err(AssembleError::KeyColumnMissing {
            table: table_name,
            key: key_column.to_string(),
        });
    }

    let participant_ids = extract_key_column(&df, key_column, &table_name)?;

    // Duplicate participants are a hard error: one row per participant.
    let mut seen = HashSet::new();
    for id in &participant_ids {
        if !seen.insert(id.clone()) {
            return Err(AssembleError::DuplicateParticipant {
                table: table_name,
                id: id.clone(),
            });
        }
    }

    let feature_names: Vec<String> = column_names
        .iter()
        .filter(|c| c.as_str() != key_column)
        .cloned()
        .collect();

    let n_rows = df.height();
    let mut values = Array2::from_elem((n_rows, feature_names.len()), f64::NAN);
    for (j, name) in feature_names.iter().enumerate() {
        let column = extract_feature_column(&df, name, &table_name)?;
        for (i, cell) in column.into_iter().enumerate() {
            if let Some(v) = cell {
                values[[i, j]] = v;
            }
        }
    }

    log::info!(
        "Table '{table_name}': {} participants, {} feature columns",
        n_rows,
        feature_names.len()
    );

    Ok(DomainTable {
        name: table_name,
        participant_ids,
        columns: feature_names,
        values,
    })
}

fn extract_key_column(
    df: &DataFrame,
    key_column: &str,
    table_name: &str,
) -> Result<Vec<String>, AssembleError> {
    let series = df.column(key_column)?;
    if series.null_count() > 0 {
        let row = (0..df.height())
            .find(|&i| series.get(i).map(|v| v.is_null()).unwrap_or(true))
            .unwrap_or(0);
        return Err(AssembleError::MissingKeyValue {
            table: table_name.to_string(),
            row,
        });
    }

    let ids: Vec<String> = match series.dtype() {
        DataType::String => series
            .str()?
            .into_iter()
            .map(|v| v.unwrap_or("").to_string())
            .collect(),
        _ => {
            let casted =
                series
                    .cast(&DataType::Int64)
                    .map_err(|_| AssembleError::NonNumericColumn {
                        table: table_name.to_string(),
                        column: key_column.to_string(),
                    })?;
            casted
                .i64()?
                .into_iter()
                .map(|v| v.map(|x| x.to_string()).unwrap_or_default())
                .collect()
        }
    };

    for (row, id) in ids.iter().enumerate() {
        if !is_valid_participant_id(id) {
            return Err(AssembleError::MissingKeyValue {
                table: table_name.to_string(),
                row,
            });
        }
    }
    Ok(ids)
}

fn extract_feature_column(
    df: &DataFrame,
    name: &str,
    table_name: &str,
) -> Result<Vec<Option<f64>>, AssembleError> {
    let series = df.column(name)?;
    let nulls_before = series.null_count();
    let casted = series
        .cast(&DataType::Float64)
        .map_err(|_| AssembleError::NonNumericColumn {
            table: table_name.to_string(),
            column: name.to_string(),
        })?;
    // A cell that fails the numeric cast becomes null; any increase in null
    // count means real text was present, which must not be silently treated
    // as missingness.
    if casted.null_count() > nulls_before {
        return Err(AssembleError::NonNumericColumn {
            table: table_name.to_string(),
            column: name.to_string(),
        });
    }
    Ok(casted.f64()?.rechunk().into_iter().collect())
}
