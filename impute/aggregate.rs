//! Collapses an imputation ensemble into one analysis matrix.
//!
//! Observed cells are copied from the source unchanged; imputation must
//! never overwrite observed data. Originally-missing cells become the running
//! average of their imputed values across the `m` completions (numerically
//! equal to the simple mean). Columns that still contain missing values after
//! averaging (typically because no predictors were allowed to impute them)
//! are dropped and reported.

use super::ImputeError;
use crate::types::FeatureMatrix;
use serde::{Deserialize, Serialize};

/// A column removed after aggregation because it still carried missing cells.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DroppedColumn {
    pub name: String,
    pub n_missing: usize,
    pub missing_fraction: f64,
}

#[derive(Debug)]
pub struct AggregatedMatrix {
    pub matrix: FeatureMatrix,
    pub dropped: Vec<DroppedColumn>,
}

/// Averages `m` completions against the original matrix.
pub fn average_completions(
    original: &FeatureMatrix,
    completions: &[FeatureMatrix],
) -> Result<AggregatedMatrix, ImputeError> {
    if completions.is_empty() {
        return Err(ImputeError::NoCompletions(0));
    }
    for completion in completions {
        if completion.n_rows() != original.n_rows() || completion.n_cols() != original.n_cols() {
            return Err(ImputeError::CompletionShapeMismatch);
        }
    }

    let mut averaged = original.clone();
    for row in 0..original.n_rows() {
        for col in 0..original.n_cols() {
            if !original.is_missing(row, col) {
                continue;
            }
            // Running average over completions that produced a value here.
            let mut running = f64::NAN;
            let mut count = 0usize;
            for completion in completions {
                if let Some(v) = completion.value(row, col) {
                    count += 1;
                    running = if count == 1 {
                        v
                    } else {
                        running + (v - running) / count as f64
                    };
                }
            }
            if count > 0 {
                averaged.set_value(row, col, running);
            }
        }
    }

    let mut dropped = Vec::new();
    let mut dropped_names = Vec::new();
    for col in 0..averaged.n_cols() {
        let n_missing = averaged.missing_count(col);
        if n_missing > 0 {
            let name = averaged.column_names()[col].clone();
            dropped.push(DroppedColumn {
                name: name.clone(),
                n_missing,
                missing_fraction: n_missing as f64 / averaged.n_rows() as f64,
            });
            dropped_names.push(name);
        }
    }

    let matrix = if dropped_names.is_empty() {
        averaged
    } else {
        log::warn!(
            "dropping {} column(s) with residual missingness after aggregation: {:?}",
            dropped_names.len(),
            dropped_names
        );
        averaged.drop_columns(&dropped_names)
    };

    Ok(AggregatedMatrix { matrix, dropped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FeatureMatrix, PredictorRole};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn source() -> FeatureMatrix {
        FeatureMatrix::new(
            vec!["sub01".into(), "sub02".into(), "sub03".into()],
            vec!["a".into(), "b".into()],
            vec![PredictorRole::Predictor, PredictorRole::Predictor],
            array![[1.0, 10.0], [f64::NAN, 20.0], [3.0, f64::NAN]],
        )
        .unwrap()
    }

    fn completed(a_imputed: f64, b_imputed: f64) -> FeatureMatrix {
        FeatureMatrix::new(
            vec!["sub01".into(), "sub02".into(), "sub03".into()],
            vec!["a".into(), "b".into()],
            vec![PredictorRole::Predictor, PredictorRole::Predictor],
            array![[1.0, 10.0], [a_imputed, 20.0], [3.0, b_imputed]],
        )
        .unwrap()
    }

    #[test]
    fn averages_only_originally_missing_cells() {
        let original = source();
        let completions = vec![completed(2.0, 12.0), completed(4.0, 18.0), completed(3.0, 15.0)];
        let out = average_completions(&original, &completions).unwrap();
        assert_eq!(out.matrix.n_rows(), 3);
        assert_eq!(out.matrix.value(0, 0), Some(1.0));
        assert_eq!(out.matrix.value(1, 1), Some(20.0));
        assert_abs_diff_eq!(out.matrix.value(1, 0).unwrap(), 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.matrix.value(2, 1).unwrap(), 15.0, epsilon = 1e-12);
        assert!(out.dropped.is_empty());
    }

    #[test]
    fn running_average_matches_simple_mean() {
        let original = source();
        let values = [0.3, 1.7, 2.9, 0.1, 4.4];
        let completions: Vec<FeatureMatrix> =
            values.iter().map(|&v| completed(v, 1.0)).collect();
        let out = average_completions(&original, &completions).unwrap();
        let expected = values.iter().sum::<f64>() / values.len() as f64;
        assert_abs_diff_eq!(out.matrix.value(1, 0).unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn aggregation_of_identical_matrices_is_identity() {
        // No actual missingness: averaging m identical copies changes nothing.
        let full = completed(2.0, 12.0);
        let completions = vec![full.clone(), full.clone(), full.clone()];
        let out = average_completions(&full, &completions).unwrap();
        for r in 0..full.n_rows() {
            for c in 0..full.n_cols() {
                assert_eq!(out.matrix.value(r, c), full.value(r, c));
            }
        }
        assert!(out.dropped.is_empty());
    }

    #[test]
    fn residual_missing_columns_dropped_and_reported() {
        let original = FeatureMatrix::new(
            vec!["sub01".into(), "sub02".into()],
            vec!["a".into(), "y".into()],
            vec![PredictorRole::Predictor, PredictorRole::Outcome],
            array![[1.0, 0.5], [2.0, f64::NAN]],
        )
        .unwrap();
        // The outcome is excluded from imputation, so the completion still
        // carries its missing cell.
        let completions = vec![original.clone()];
        let out = average_completions(&original, &completions).unwrap();
        assert_eq!(out.matrix.n_cols(), 1);
        assert_eq!(out.dropped.len(), 1);
        assert_eq!(out.dropped[0].name, "y");
        assert_eq!(out.dropped[0].n_missing, 1);
        assert_abs_diff_eq!(out.dropped[0].missing_fraction, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn empty_ensemble_rejected() {
        let original = source();
        assert!(matches!(
            average_completions(&original, &[]).unwrap_err(),
            ImputeError::NoCompletions(0)
        ));
    }
}
