//! Joins per-domain tables into the single participant-indexed feature
//! matrix. The join is a full outer join on the participant key: a
//! participant absent from one domain gets missing cells for that domain's
//! columns, never a fabricated value.

use super::{AssembleError, DomainTable};
use crate::config::AssemblyConfig;
use crate::types::{FeatureMatrix, PredictorGroups, PredictorRole};
use ndarray::Array2;
use std::collections::BTreeSet;

/// Leaf utility joining domain tables into one [`FeatureMatrix`]. Carries no
/// statistical logic; all it enforces are the integrity invariants.
pub struct TableAssembler {
    tables: Vec<DomainTable>,
}

impl TableAssembler {
    pub fn new(tables: Vec<DomainTable>) -> Self {
        Self { tables }
    }

    /// Performs the outer join and attaches roles and predictor groups.
    pub fn assemble(
        &self,
        config: &AssemblyConfig,
    ) -> Result<(FeatureMatrix, PredictorGroups), AssembleError> {
        // Column collisions across tables are ambiguous and fatal.
        let mut owner_of: Vec<(String, String)> = Vec::new();
        for table in &self.tables {
            for column in &table.columns {
                if let Some((_, first)) = owner_of.iter().find(|(c, _)| c == column) {
                    return Err(AssembleError::ColumnCollision {
                        column: column.clone(),
                        first: first.clone(),
                        second: table.name.clone(),
                    });
                }
                owner_of.push((column.clone(), table.name.clone()));
            }
        }

        // Union of participants, sorted for a deterministic row order.
        let all_ids: BTreeSet<String> = self
            .tables
            .iter()
            .flat_map(|t| t.participant_ids.iter().cloned())
            .collect();
        let participant_ids: Vec<String> = all_ids.into_iter().collect();

        let column_names: Vec<String> = self
            .tables
            .iter()
            .flat_map(|t| t.columns.iter().cloned())
            .collect();

        let mut values = Array2::from_elem((participant_ids.len(), column_names.len()), f64::NAN);
        let mut col_offset = 0usize;
        for table in &self.tables {
            for (local_row, id) in table.participant_ids.iter().enumerate() {
                let row = participant_ids
                    .binary_search(id)
                    .expect("participant union contains every table's ids");
                for j in 0..table.columns.len() {
                    values[[row, col_offset + j]] = table.values[[local_row, j]];
                }
            }
            col_offset += table.columns.len();
        }

        if !column_names.iter().any(|c| *c == config.outcome) {
            return Err(AssembleError::OutcomeNotFound(config.outcome.clone()));
        }

        let roles: Vec<PredictorRole> = column_names
            .iter()
            .map(|name| {
                if *name == config.outcome {
                    PredictorRole::Outcome
                } else if config.auxiliaries.contains(name) {
                    PredictorRole::Auxiliary
                } else {
                    PredictorRole::Predictor
                }
            })
            .collect();

        let matrix = FeatureMatrix::new(participant_ids, column_names, roles, values)?;

        let groups = PredictorGroups::new(config.groups.clone());
        // Resolve once here so unknown group members fail at assembly, not at
        // first imputation use.
        groups.resolve(&matrix)?;

        log::info!(
            "Assembled feature matrix: {} participants x {} columns from {} tables",
            matrix.n_rows(),
            matrix.n_cols(),
            self.tables.len()
        );

        Ok((matrix, groups))
    }
}
