//! Predictor-selection matrix construction.
//!
//! For every imputation target the matrix records which columns may serve as
//! predictors in its PMM regression. Selection is automatic (correlation and
//! usable-case thresholds over jointly observed cases, mirroring `quickpred`)
//! with two kinds of overrides layered on top: auxiliary columns are always
//! included, and configured predictor groups force mutual inclusion among
//! semantically related columns regardless of the automatic filter.

use crate::config::ImputationConfig;
use crate::numeric::pairwise_stats;
use crate::types::{FeatureMatrix, MatrixError, PredictorGroups, PredictorRole};
use ndarray::Array2;

use super::ImputationMethod;

/// Per-column method assignment: PMM for predictor/auxiliary columns with
/// missing values; no imputation for identifier and outcome columns, which
/// are excluded by role even when fully observed.
pub fn assign_methods(matrix: &FeatureMatrix) -> Vec<ImputationMethod> {
    (0..matrix.n_cols())
        .map(|c| match matrix.role(c) {
            PredictorRole::Identifier | PredictorRole::Outcome => ImputationMethod::None,
            PredictorRole::Auxiliary | PredictorRole::Predictor => {
                if matrix.missing_count(c) > 0 {
                    ImputationMethod::Pmm
                } else {
                    ImputationMethod::None
                }
            }
        })
        .collect()
}

/// Builds the boolean predictor-selection matrix: `selection[[target, pred]]`
/// is true when `pred` participates in the imputation model for `target`.
pub fn build_predictor_matrix(
    matrix: &FeatureMatrix,
    groups: &PredictorGroups,
    config: &ImputationConfig,
) -> Result<Array2<bool>, MatrixError> {
    let n = matrix.n_cols();
    let mut selection = Array2::from_elem((n, n), false);

    for target in 0..n {
        if matrix.role(target) == PredictorRole::Identifier {
            continue;
        }
        for pred in 0..n {
            if pred == target {
                continue;
            }
            match matrix.role(pred) {
                // The identifier never predicts anything; the outcome is
                // likewise kept out of imputation models to avoid leaking it
                // into its own predictors.
                PredictorRole::Identifier | PredictorRole::Outcome => continue,
                PredictorRole::Auxiliary => {
                    selection[[target, pred]] = true;
                }
                PredictorRole::Predictor => {
                    let stats = pairwise_stats(
                        matrix.raw().column(pred),
                        matrix.raw().column(target),
                    );
                    if stats.correlation.abs() > config.min_correlation
                        && stats.usable_proportion > config.min_usable_cases
                    {
                        selection[[target, pred]] = true;
                    }
                }
            }
        }
    }

    // Group overrides: members of one group mutually predict each other,
    // bypassing the automatic filter for those pairs only.
    for members in groups.resolve(matrix)? {
        for &a in &members {
            for &b in &members {
                if a == b {
                    continue;
                }
                let a_ok = !matches!(
                    matrix.role(a),
                    PredictorRole::Identifier | PredictorRole::Outcome
                );
                let b_ok = !matches!(
                    matrix.role(b),
                    PredictorRole::Identifier | PredictorRole::Outcome
                );
                if a_ok && b_ok {
                    selection[[a, b]] = true;
                }
            }
        }
    }

    Ok(selection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PredictorRole;
    use ndarray::Array2;
    use std::collections::BTreeMap;

    fn matrix_with_roles(roles: Vec<PredictorRole>, values: Array2<f64>) -> FeatureMatrix {
        let n = values.nrows();
        let ids: Vec<String> = (1..=n).map(|i| format!("sub{i:02}")).collect();
        let names: Vec<String> = (0..values.ncols()).map(|j| format!("col{j}")).collect();
        FeatureMatrix::new(ids, names, roles, values).unwrap()
    }

    fn default_config() -> ImputationConfig {
        ImputationConfig {
            min_correlation: 0.1,
            min_usable_cases: 0.25,
            ..ImputationConfig::default()
        }
    }

    #[test]
    fn correlated_predictor_selected_uncorrelated_dropped() {
        // col1 tracks col0 linearly; col2 is constant (zero correlation).
        let mut values = Array2::zeros((10, 3));
        for i in 0..10 {
            values[[i, 0]] = i as f64;
            values[[i, 1]] = 2.0 * i as f64 + 1.0;
            values[[i, 2]] = 5.0;
        }
        values[[0, 0]] = f64::NAN;
        let m = matrix_with_roles(
            vec![
                PredictorRole::Predictor,
                PredictorRole::Predictor,
                PredictorRole::Predictor,
            ],
            values,
        );
        let sel =
            build_predictor_matrix(&m, &PredictorGroups::default(), &default_config()).unwrap();
        assert!(sel[[0, 1]]);
        assert!(!sel[[0, 2]]);
        assert!(!sel[[0, 0]], "a column never predicts itself");
    }

    #[test]
    fn auxiliary_forced_in_despite_zero_correlation() {
        let mut values = Array2::zeros((10, 2));
        for i in 0..10 {
            values[[i, 0]] = i as f64;
            values[[i, 1]] = 7.0;
        }
        let m = matrix_with_roles(
            vec![PredictorRole::Predictor, PredictorRole::Auxiliary],
            values,
        );
        let sel =
            build_predictor_matrix(&m, &PredictorGroups::default(), &default_config()).unwrap();
        assert!(sel[[0, 1]]);
    }

    #[test]
    fn outcome_never_used_as_predictor() {
        let mut values = Array2::zeros((10, 2));
        for i in 0..10 {
            values[[i, 0]] = i as f64;
            values[[i, 1]] = i as f64;
        }
        let m = matrix_with_roles(
            vec![PredictorRole::Predictor, PredictorRole::Outcome],
            values,
        );
        let sel =
            build_predictor_matrix(&m, &PredictorGroups::default(), &default_config()).unwrap();
        assert!(!sel[[0, 1]]);
    }

    #[test]
    fn group_override_forces_mutual_inclusion() {
        // col0 and col1 are uncorrelated noise; the group still links them.
        let values = ndarray::array![
            [1.0, 5.0],
            [2.0, 3.0],
            [3.0, 8.0],
            [4.0, 1.0],
            [5.0, 9.0],
            [6.0, 2.0],
            [7.0, 7.0],
            [8.0, 4.0]
        ];
        let m = matrix_with_roles(
            vec![PredictorRole::Predictor, PredictorRole::Predictor],
            values,
        );
        let mut groups = BTreeMap::new();
        groups.insert(
            "task".to_string(),
            vec!["col0".to_string(), "col1".to_string()],
        );
        let config = ImputationConfig {
            min_correlation: 0.99,
            ..default_config()
        };
        let without =
            build_predictor_matrix(&m, &PredictorGroups::default(), &config).unwrap();
        assert!(!without[[0, 1]]);
        let with =
            build_predictor_matrix(&m, &PredictorGroups::new(groups), &config).unwrap();
        assert!(with[[0, 1]]);
        assert!(with[[1, 0]]);
    }

    #[test]
    fn method_assignment_follows_role_then_missingness() {
        let values = ndarray::array![[1.0, 2.0, f64::NAN], [3.0, 4.0, 5.0]];
        let m = matrix_with_roles(
            vec![
                PredictorRole::Outcome,
                PredictorRole::Predictor,
                PredictorRole::Predictor,
            ],
            values,
        );
        let methods = assign_methods(&m);
        assert_eq!(methods[0], ImputationMethod::None, "outcome excluded by role");
        assert_eq!(methods[1], ImputationMethod::None, "fully observed");
        assert_eq!(methods[2], ImputationMethod::Pmm);
    }
}
