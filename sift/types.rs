//! # Core Data Model
//!
//! The central value type is [`FeatureMatrix`]: a participant-indexed table of
//! numeric predictors plus one designated outcome column. Missingness is an
//! explicit state (stored as NaN but only reachable through [`FeatureMatrix::value`]
//! and [`FeatureMatrix::is_missing`]), never silently coerced to zero.
//!
//! Pipeline stages never mutate a matrix in place across stage boundaries:
//! each stage takes a `FeatureMatrix` and returns a new one.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Per-column classification driving imputation predictor selection and
/// downstream modeling inclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictorRole {
    /// The modeled outcome. Excluded from imputation by role.
    Outcome,
    /// Row key. Never imputed, never used as a predictor.
    Identifier,
    /// Auxiliary predictor force-included in every imputation model.
    Auxiliary,
    /// Ordinary predictor.
    Predictor,
}

#[derive(Error, Debug)]
pub enum MatrixError {
    #[error("duplicate participant id '{0}': the matrix requires one row per participant")]
    DuplicateParticipant(String),
    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),
    #[error(
        "participant id '{0}' does not match the expected pattern (lowercase letters followed by digits, or purely numeric)"
    )]
    InvalidParticipantId(String),
    #[error(
        "value matrix shape [{value_rows}, {value_cols}] does not match {ids} participants x {names} columns"
    )]
    ShapeMismatch {
        value_rows: usize,
        value_cols: usize,
        ids: usize,
        names: usize,
    },
    #[error("expected exactly one outcome column, found {0}")]
    OutcomeCount(usize),
    #[error("column '{0}' not found in the matrix")]
    UnknownColumn(String),
}

/// Validates the participant-key pattern: `^[a-z]+[0-9]+$` or purely numeric.
pub fn is_valid_participant_id(id: &str) -> bool {
    if id.is_empty() {
        return false;
    }
    if id.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    let letters: String = id.chars().take_while(|c| c.is_ascii_lowercase()).collect();
    if letters.is_empty() {
        return false;
    }
    let rest = &id[letters.len()..];
    !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
}

/// Participant-indexed feature matrix with explicit missingness.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    participant_ids: Vec<String>,
    column_names: Vec<String>,
    roles: Vec<PredictorRole>,
    values: Array2<f64>,
}

impl FeatureMatrix {
    /// Builds a matrix, enforcing the invariants: one row per participant,
    /// unique column names, value shape consistent with the index vectors.
    pub fn new(
        participant_ids: Vec<String>,
        column_names: Vec<String>,
        roles: Vec<PredictorRole>,
        values: Array2<f64>,
    ) -> Result<Self, MatrixError> {
        let mut seen_ids = HashSet::new();
        for id in &participant_ids {
            if !is_valid_participant_id(id) {
                return Err(MatrixError::InvalidParticipantId(id.clone()));
            }
            if !seen_ids.insert(id.clone()) {
                return Err(MatrixError::DuplicateParticipant(id.clone()));
            }
        }
        let mut seen_cols = HashSet::new();
        for name in &column_names {
            if !seen_cols.insert(name.clone()) {
                return Err(MatrixError::DuplicateColumn(name.clone()));
            }
        }
        if values.nrows() != participant_ids.len()
            || values.ncols() != column_names.len()
            || roles.len() != column_names.len()
        {
            return Err(MatrixError::ShapeMismatch {
                value_rows: values.nrows(),
                value_cols: values.ncols(),
                ids: participant_ids.len(),
                names: column_names.len(),
            });
        }
        let outcomes = roles
            .iter()
            .filter(|r| **r == PredictorRole::Outcome)
            .count();
        if outcomes > 1 {
            return Err(MatrixError::OutcomeCount(outcomes));
        }
        Ok(Self {
            participant_ids,
            column_names,
            roles,
            values,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_cols(&self) -> usize {
        self.values.ncols()
    }

    pub fn participant_ids(&self) -> &[String] {
        &self.participant_ids
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn roles(&self) -> &[PredictorRole] {
        &self.roles
    }

    pub fn role(&self, col: usize) -> PredictorRole {
        self.roles[col]
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_names.iter().position(|n| n == name)
    }

    /// The cell value, or `None` when the cell was not observed.
    pub fn value(&self, row: usize, col: usize) -> Option<f64> {
        let v = self.values[[row, col]];
        if v.is_nan() { None } else { Some(v) }
    }

    pub fn is_missing(&self, row: usize, col: usize) -> bool {
        self.values[[row, col]].is_nan()
    }

    /// Raw storage view. Callers must treat NaN as "not observed".
    pub fn raw(&self) -> &Array2<f64> {
        &self.values
    }

    pub(crate) fn set_value(&mut self, row: usize, col: usize, value: f64) {
        self.values[[row, col]] = value;
    }

    pub fn outcome_index(&self) -> Result<usize, MatrixError> {
        let hits: Vec<usize> = self
            .roles
            .iter()
            .enumerate()
            .filter(|(_, r)| **r == PredictorRole::Outcome)
            .map(|(i, _)| i)
            .collect();
        match hits.as_slice() {
            [one] => Ok(*one),
            other => Err(MatrixError::OutcomeCount(other.len())),
        }
    }

    /// Column indices that enter modeling: ordinary and auxiliary predictors.
    pub fn modeling_columns(&self) -> Vec<usize> {
        self.roles
            .iter()
            .enumerate()
            .filter(|(_, r)| matches!(r, PredictorRole::Predictor | PredictorRole::Auxiliary))
            .map(|(i, _)| i)
            .collect()
    }

    /// Rows with an observed outcome; the eligible set for train/test splits.
    pub fn eligible_rows(&self) -> Result<Vec<usize>, MatrixError> {
        let outcome = self.outcome_index()?;
        Ok((0..self.n_rows())
            .filter(|&r| !self.is_missing(r, outcome))
            .collect())
    }

    pub fn missing_count(&self, col: usize) -> usize {
        (0..self.n_rows())
            .filter(|&r| self.is_missing(r, col))
            .count()
    }

    /// Row indices of missing cells in one column.
    pub fn missing_rows(&self, col: usize) -> Vec<usize> {
        (0..self.n_rows())
            .filter(|&r| self.is_missing(r, col))
            .collect()
    }

    /// Observed values of a column, in row order.
    pub fn observed_values(&self, col: usize) -> Vec<f64> {
        (0..self.n_rows())
            .filter_map(|r| self.value(r, col))
            .collect()
    }

    /// (min, max) over observed cells of a column, if any are observed.
    pub fn observed_range(&self, col: usize) -> Option<(f64, f64)> {
        let mut range: Option<(f64, f64)> = None;
        for r in 0..self.n_rows() {
            if let Some(v) = self.value(r, col) {
                range = Some(match range {
                    None => (v, v),
                    Some((lo, hi)) => (lo.min(v), hi.max(v)),
                });
            }
        }
        range
    }

    /// Extracts the design matrix (modeling columns) for the given rows,
    /// NaN retained for missing cells, together with the column names.
    pub fn design_for_rows(&self, rows: &[usize]) -> (Array2<f64>, Vec<String>) {
        let cols = self.modeling_columns();
        let mut data = Array2::zeros((rows.len(), cols.len()));
        for (i, &r) in rows.iter().enumerate() {
            for (j, &c) in cols.iter().enumerate() {
                data[[i, j]] = self.values[[r, c]];
            }
        }
        let names = cols
            .iter()
            .map(|&c| self.column_names[c].clone())
            .collect();
        (data, names)
    }

    /// Outcome values for the given rows. Callers are expected to have
    /// restricted `rows` to the eligible set first.
    pub fn outcome_for_rows(&self, rows: &[usize]) -> Result<Array1<f64>, MatrixError> {
        let outcome = self.outcome_index()?;
        Ok(Array1::from_iter(
            rows.iter().map(|&r| self.values[[r, outcome]]),
        ))
    }

    /// Returns a copy with the named columns removed.
    pub fn drop_columns(&self, names: &[String]) -> FeatureMatrix {
        let keep: Vec<usize> = (0..self.n_cols())
            .filter(|&c| !names.contains(&self.column_names[c]))
            .collect();
        let mut values = Array2::zeros((self.n_rows(), keep.len()));
        for (j, &c) in keep.iter().enumerate() {
            for r in 0..self.n_rows() {
                values[[r, j]] = self.values[[r, c]];
            }
        }
        FeatureMatrix {
            participant_ids: self.participant_ids.clone(),
            column_names: keep.iter().map(|&c| self.column_names[c].clone()).collect(),
            roles: keep.iter().map(|&c| self.roles[c]).collect(),
            values,
        }
    }
}

/// Serialization surface for [`FeatureMatrix`]. Missing cells are `None`
/// rather than NaN so round-trips through JSON stay lossless.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixArtifact {
    pub participant_ids: Vec<String>,
    pub column_names: Vec<String>,
    pub roles: Vec<PredictorRole>,
    /// Row-major cells; `None` marks a not-observed cell.
    pub cells: Vec<Option<f64>>,
}

impl From<&FeatureMatrix> for MatrixArtifact {
    fn from(m: &FeatureMatrix) -> Self {
        let mut cells = Vec::with_capacity(m.n_rows() * m.n_cols());
        for r in 0..m.n_rows() {
            for c in 0..m.n_cols() {
                cells.push(m.value(r, c));
            }
        }
        MatrixArtifact {
            participant_ids: m.participant_ids.clone(),
            column_names: m.column_names.clone(),
            roles: m.roles.clone(),
            cells,
        }
    }
}

impl TryFrom<MatrixArtifact> for FeatureMatrix {
    type Error = MatrixError;

    fn try_from(a: MatrixArtifact) -> Result<Self, MatrixError> {
        let n_rows = a.participant_ids.len();
        let n_cols = a.column_names.len();
        if a.cells.len() != n_rows * n_cols {
            return Err(MatrixError::ShapeMismatch {
                value_rows: a.cells.len() / n_cols.max(1),
                value_cols: n_cols,
                ids: n_rows,
                names: n_cols,
            });
        }
        let flat: Vec<f64> = a
            .cells
            .iter()
            .map(|c| c.unwrap_or(f64::NAN))
            .collect();
        let values = Array2::from_shape_vec((n_rows, n_cols), flat)
            .expect("cell count was validated against the matrix shape");
        FeatureMatrix::new(a.participant_ids, a.column_names, a.roles, values)
    }
}

/// Declarative group-name to column-name-set mapping, built once at assembly
/// time. Replaces ad-hoc name-pattern matching at use sites: imputation
/// overrides look groups up here instead of re-deriving them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictorGroups {
    groups: BTreeMap<String, Vec<String>>,
}

impl PredictorGroups {
    pub fn new(groups: BTreeMap<String, Vec<String>>) -> Self {
        Self { groups }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.groups.iter()
    }

    /// Resolves every group to column indices, erroring on unknown names.
    pub fn resolve(&self, matrix: &FeatureMatrix) -> Result<Vec<Vec<usize>>, MatrixError> {
        let mut resolved = Vec::with_capacity(self.groups.len());
        for (_, members) in self.groups.iter() {
            let mut indices = Vec::with_capacity(members.len());
            for name in members {
                match matrix.column_index(name) {
                    Some(i) => indices.push(i),
                    None => return Err(MatrixError::UnknownColumn(name.clone())),
                }
            }
            resolved.push(indices);
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn small_matrix() -> FeatureMatrix {
        FeatureMatrix::new(
            vec!["sub1".into(), "sub2".into(), "sub3".into()],
            vec!["age".into(), "score".into(), "outcome".into()],
            vec![
                PredictorRole::Predictor,
                PredictorRole::Predictor,
                PredictorRole::Outcome,
            ],
            array![
                [10.0, 1.0, 0.5],
                [12.0, f64::NAN, 0.7],
                [11.0, 3.0, f64::NAN]
            ],
        )
        .unwrap()
    }

    #[test]
    fn participant_id_pattern() {
        assert!(is_valid_participant_id("sub12"));
        assert!(is_valid_participant_id("adhd003"));
        assert!(is_valid_participant_id("42"));
        assert!(!is_valid_participant_id("SUB12"));
        assert!(!is_valid_participant_id("sub"));
        assert!(!is_valid_participant_id("12sub"));
        assert!(!is_valid_participant_id(""));
    }

    #[test]
    fn missingness_is_explicit() {
        let m = small_matrix();
        assert_eq!(m.value(0, 1), Some(1.0));
        assert_eq!(m.value(1, 1), None);
        assert!(m.is_missing(1, 1));
        assert_eq!(m.missing_count(1), 1);
        assert_eq!(m.missing_rows(1), vec![1]);
    }

    #[test]
    fn duplicate_participant_rejected() {
        let err = FeatureMatrix::new(
            vec!["sub1".into(), "sub1".into()],
            vec!["a".into()],
            vec![PredictorRole::Predictor],
            array![[1.0], [2.0]],
        )
        .unwrap_err();
        assert!(matches!(err, MatrixError::DuplicateParticipant(_)));
    }

    #[test]
    fn duplicate_column_rejected() {
        let err = FeatureMatrix::new(
            vec!["sub1".into()],
            vec!["a".into(), "a".into()],
            vec![PredictorRole::Predictor, PredictorRole::Predictor],
            array![[1.0, 2.0]],
        )
        .unwrap_err();
        assert!(matches!(err, MatrixError::DuplicateColumn(_)));
    }

    #[test]
    fn eligible_rows_require_observed_outcome() {
        let m = small_matrix();
        assert_eq!(m.eligible_rows().unwrap(), vec![0, 1]);
    }

    #[test]
    fn artifact_round_trip_preserves_missingness() {
        let m = small_matrix();
        let artifact = MatrixArtifact::from(&m);
        let text = serde_json::to_string(&artifact).unwrap();
        let back: MatrixArtifact = serde_json::from_str(&text).unwrap();
        let restored = FeatureMatrix::try_from(back).unwrap();
        assert_eq!(restored.n_rows(), 3);
        assert!(restored.is_missing(1, 1));
        assert_eq!(restored.value(0, 0), Some(10.0));
    }

    #[test]
    fn drop_columns_removes_named() {
        let m = small_matrix();
        let reduced = m.drop_columns(&["score".to_string()]);
        assert_eq!(reduced.n_cols(), 2);
        assert!(reduced.column_index("score").is_none());
        assert_eq!(reduced.value(0, 0), Some(10.0));
    }

    #[test]
    fn observed_range_skips_missing() {
        let m = small_matrix();
        assert_eq!(m.observed_range(1), Some((1.0, 3.0)));
    }
}
