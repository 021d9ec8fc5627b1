//! # Model Fitters
//!
//! A [`ModelFitter`] turns one training design matrix into a [`FittedModel`]
//! exposing predictions, a coefficient/importance vector (same length and
//! order as the input columns, zeros preserved for unselected predictors),
//! and the numeric tuning criterion used for model selection. Two fitters:
//!
//! - [`linear::ElasticNet`]: L1/L2-mixed penalized regression over a warm-
//!   started penalty path, selected by k-fold cross-validated MSE
//!   (`lambda.min`, or `lambda.1se` when parsimony is requested).
//! - [`boost::GradientBooster`]: depth-limited gradient-boosted regression
//!   trees with gain-based importances.
//!
//! A degenerate-but-valid fit (all coefficients zero) is NOT an error; hard
//! failures (no usable rows, zero outcome variance) are.

pub mod boost;
pub mod linear;

use crate::evaluate::split::Fold;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FitError {
    #[error("design matrix has zero usable rows after removing rows with missing values")]
    NoUsableRows,
    #[error("outcome has zero variance in the training fold; nothing to fit")]
    ZeroVarianceOutcome,
    #[error("design matrix has {rows} rows but the outcome has {outcome} values")]
    ShapeMismatch { rows: usize, outcome: usize },
}

/// One trained model bound to the split that produced it.
pub trait FittedModel: Send + std::fmt::Debug {
    fn predict(&self, x: ArrayView2<f64>) -> Array1<f64>;
    /// Coefficients (linear) or normalized importances (boosting); one entry
    /// per input column, zeros preserved.
    fn coefficients(&self) -> &Array1<f64>;
    /// Cross-validated criterion used to select this model (MSE or RMSE).
    fn tuning_criterion(&self) -> f64;
}

/// Strategy interface the evaluation harness fits once per split.
pub trait ModelFitter: Sync {
    fn name(&self) -> &'static str;
    /// Fits on (x, y); `folds` drive hyperparameter selection and must index
    /// into x's rows. An empty fold list means a single plain fit. `seed`
    /// feeds any internal stochastic step (subsampling), keeping fits
    /// reproducible per split.
    fn fit(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        folds: &[Fold],
        seed: u64,
    ) -> Result<Box<dyn FittedModel>, FitError>;
}

/// Drops rows carrying any non-finite cell and validates what remains.
/// Returns the filtered copies plus the kept original row positions, so fold
/// definitions can be remapped by the caller.
pub(crate) fn usable_rows(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
) -> Result<(Array2<f64>, Array1<f64>, Vec<usize>), FitError> {
    if x.nrows() != y.len() {
        return Err(FitError::ShapeMismatch {
            rows: x.nrows(),
            outcome: y.len(),
        });
    }
    let kept: Vec<usize> = (0..x.nrows())
        .filter(|&r| y[r].is_finite() && x.row(r).iter().all(|v| v.is_finite()))
        .collect();
    if kept.is_empty() {
        return Err(FitError::NoUsableRows);
    }
    let mut xf = Array2::zeros((kept.len(), x.ncols()));
    let mut yf = Array1::zeros(kept.len());
    for (i, &r) in kept.iter().enumerate() {
        xf.row_mut(i).assign(&x.row(r));
        yf[i] = y[r];
    }
    let mean = yf.sum() / yf.len() as f64;
    if yf.iter().all(|v| (v - mean).abs() < 1e-12) {
        return Err(FitError::ZeroVarianceOutcome);
    }
    Ok((xf, yf, kept))
}

/// Remaps fold validation positions after row filtering, dropping positions
/// that were filtered away.
pub(crate) fn remap_folds(folds: &[Fold], kept: &[usize]) -> Vec<Fold> {
    let mut new_pos = vec![None; kept.iter().copied().max().map_or(0, |m| m + 1)];
    for (i, &r) in kept.iter().enumerate() {
        new_pos[r] = Some(i);
    }
    folds
        .iter()
        .map(|fold| Fold {
            index: fold.index,
            validation: fold
                .validation
                .iter()
                .filter_map(|&p| new_pos.get(p).copied().flatten())
                .collect(),
        })
        .filter(|fold| !fold.validation.is_empty())
        .collect()
}

pub(crate) fn soft_threshold(z: f64, gamma: f64) -> f64 {
    if z > gamma {
        z - gamma
    } else if z < -gamma {
        z + gamma
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn usable_rows_drops_nan_rows() {
        let x = array![[1.0, 2.0], [f64::NAN, 3.0], [4.0, 5.0]];
        let y = array![1.0, 2.0, 3.0];
        let (xf, yf, kept) = usable_rows(x.view(), y.view()).unwrap();
        assert_eq!(kept, vec![0, 2]);
        assert_eq!(xf.nrows(), 2);
        assert_eq!(yf.len(), 2);
    }

    #[test]
    fn all_nan_rows_is_distinct_error() {
        let x = array![[f64::NAN], [f64::NAN]];
        let y = array![1.0, 2.0];
        assert!(matches!(
            usable_rows(x.view(), y.view()).unwrap_err(),
            FitError::NoUsableRows
        ));
    }

    #[test]
    fn constant_outcome_is_distinct_error() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![4.0, 4.0, 4.0];
        assert!(matches!(
            usable_rows(x.view(), y.view()).unwrap_err(),
            FitError::ZeroVarianceOutcome
        ));
    }

    #[test]
    fn fold_remap_follows_filtering() {
        let folds = vec![
            Fold {
                index: 0,
                validation: vec![0, 1],
            },
            Fold {
                index: 1,
                validation: vec![2, 3],
            },
        ];
        // Row 1 was filtered out; rows 0,2,3 kept.
        let remapped = remap_folds(&folds, &[0, 2, 3]);
        assert_eq!(remapped[0].validation, vec![0]);
        assert_eq!(remapped[1].validation, vec![1, 2]);
    }

    #[test]
    fn soft_threshold_shrinks_toward_zero() {
        assert_eq!(soft_threshold(3.0, 1.0), 2.0);
        assert_eq!(soft_threshold(-3.0, 1.0), -2.0);
        assert_eq!(soft_threshold(0.5, 1.0), 0.0);
    }
}
