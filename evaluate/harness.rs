//! The repeated-split evaluation harness.
//!
//! One run = R independent splits. Everything inside a split is derived from
//! that split's seed and training rows only: the median imputation model (the
//! per-split policy), the correlated-predictor prune, and the fold layout for
//! hyperparameter selection all see training data exclusively, so the test
//! fold never leaks into model selection.

use super::split::{fold_seed, make_folds, make_split};
use super::{HarnessError, metrics};
use crate::config::{SeedStage, derive_seed};
use crate::model::ModelFitter;
use crate::numeric::{median, pairwise_stats};
use crate::types::FeatureMatrix;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::io::IsTerminal;

/// How a pipeline variant supplies complete data to the fitters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImputePolicy {
    /// Re-impute per split: medians fit on the training rows only, applied to
    /// both folds. Used by the penalized-regression pipeline.
    PerSplitMedian,
    /// Consume one globally pre-completed (averaged) matrix; any residual
    /// missingness is an error. Used by the boosting search.
    PreCompleted,
}

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub splits: usize,
    pub train_proportion: f64,
    pub cv_folds: usize,
    pub correlation_cutoff: f64,
    pub base_seed: u64,
    pub impute_policy: ImputePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub participant_id: String,
    pub actual: f64,
    pub predicted: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitMetrics {
    pub rmse: f64,
    pub mae: f64,
    pub r_squared: f64,
    /// The fitter's cross-validated selection criterion for this split.
    pub tuning_criterion: f64,
}

/// Everything recorded for one split, successful or not. Failed splits stay
/// in the report (with `failure` set) so the aggregate never silently
/// pretends completeness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitRecord {
    pub split_index: usize,
    pub seed: u64,
    pub metrics: Option<SplitMetrics>,
    /// One entry per feature (full order), zeros for unselected or removed.
    pub coefficients: Vec<f64>,
    pub n_predictors_retained: usize,
    pub removed_columns: Vec<String>,
    pub predictions: Vec<PredictionRecord>,
    pub failure: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HarnessReport {
    pub feature_names: Vec<String>,
    pub records: Vec<SplitRecord>,
    pub n_succeeded: usize,
    pub n_skipped: usize,
}

fn create_progress_bar(len: u64, message: &str) -> ProgressBar {
    let draw_target = if std::io::stderr().is_terminal() {
        ProgressDrawTarget::stderr_with_hz(20)
    } else {
        ProgressDrawTarget::hidden()
    };
    let pb = ProgressBar::with_draw_target(Some(len), draw_target);
    pb.set_style(
        ProgressStyle::with_template("> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress template is static"),
    );
    pb.set_message(message.to_string());
    pb
}

/// Runs R repeated train/test splits against one fitting strategy.
pub fn run_harness(
    matrix: &FeatureMatrix,
    config: &HarnessConfig,
    fitter: &dyn ModelFitter,
) -> Result<HarnessReport, HarnessError> {
    let eligible = matrix.eligible_rows()?;
    if eligible.is_empty() {
        return Err(HarnessError::NoEligibleRows);
    }

    let (full_x, feature_names) = matrix.design_for_rows(&eligible);
    let full_y = matrix.outcome_for_rows(&eligible)?;

    if config.impute_policy == ImputePolicy::PreCompleted {
        for (j, name) in feature_names.iter().enumerate() {
            if full_x.column(j).iter().any(|v| v.is_nan()) {
                return Err(HarnessError::IncompleteMatrix(name.clone()));
            }
        }
    }

    log::info!(
        "harness start: {} splits, {} eligible rows, {} predictors, fitter '{}'",
        config.splits,
        eligible.len(),
        feature_names.len(),
        fitter.name()
    );

    let pb = create_progress_bar(config.splits as u64, "repeated splits");
    let mut records = Vec::with_capacity(config.splits);

    for r in 1..=config.splits {
        let seed = derive_seed(config.base_seed, SeedStage::Split, r as u64);
        let split = make_split(
            &(0..eligible.len()).collect::<Vec<usize>>(),
            config.train_proportion,
            r,
            seed,
        );
        if split.train.is_empty() || split.test.is_empty() {
            return Err(HarnessError::DegenerateProportion(config.train_proportion));
        }

        let record = run_one_split(
            &full_x,
            &full_y,
            &feature_names,
            &eligible,
            matrix,
            &split.train,
            &split.test,
            r,
            seed,
            config,
            fitter,
        );
        match &record.failure {
            Some(reason) => {
                log::warn!("split {r} skipped: {reason}");
            }
            None => {}
        }
        records.push(record);
        pb.inc(1);
    }
    pb.finish_and_clear();

    let n_succeeded = records.iter().filter(|r| r.failure.is_none()).count();
    let n_skipped = records.len() - n_succeeded;
    if n_succeeded == 0 {
        return Err(HarnessError::AllSplitsFailed);
    }
    log::info!("harness done: {n_succeeded} splits succeeded, {n_skipped} skipped");

    Ok(HarnessReport {
        feature_names,
        records,
        n_succeeded,
        n_skipped,
    })
}

#[allow(clippy::too_many_arguments)]
fn run_one_split(
    full_x: &Array2<f64>,
    full_y: &Array1<f64>,
    feature_names: &[String],
    eligible: &[usize],
    matrix: &FeatureMatrix,
    train: &[usize],
    test: &[usize],
    split_index: usize,
    seed: u64,
    config: &HarnessConfig,
    fitter: &dyn ModelFitter,
) -> SplitRecord {
    let p = feature_names.len();

    // Extract fold-local design matrices.
    let take = |rows: &[usize]| -> (Array2<f64>, Array1<f64>) {
        let mut x = Array2::zeros((rows.len(), p));
        let mut y = Array1::zeros(rows.len());
        for (i, &r) in rows.iter().enumerate() {
            x.row_mut(i).assign(&full_x.row(r));
            y[i] = full_y[r];
        }
        (x, y)
    };
    let (mut x_train, y_train) = take(train);
    let (mut x_test, y_test) = take(test);

    // Per-split median imputation, fit on training rows only.
    if config.impute_policy == ImputePolicy::PerSplitMedian {
        for j in 0..p {
            let observed: Vec<f64> = x_train
                .column(j)
                .iter()
                .copied()
                .filter(|v| !v.is_nan())
                .collect();
            let fill = median(&observed);
            for x in [&mut x_train, &mut x_test] {
                for v in x.column_mut(j) {
                    if v.is_nan() {
                        *v = fill;
                    }
                }
            }
        }
    }

    // Prune pairwise-correlated predictors using the training fold only.
    let mut removed = vec![false; p];
    for j in 0..p {
        if removed[j] {
            continue;
        }
        for k in (j + 1)..p {
            if removed[k] {
                continue;
            }
            let stats = pairwise_stats(x_train.column(j), x_train.column(k));
            if stats.correlation.abs() > config.correlation_cutoff {
                removed[k] = true;
            }
        }
    }
    let kept_cols: Vec<usize> = (0..p).filter(|&j| !removed[j]).collect();
    let removed_columns: Vec<String> = (0..p)
        .filter(|&j| removed[j])
        .map(|j| feature_names[j].clone())
        .collect();

    let select_cols = |x: &Array2<f64>| -> Array2<f64> {
        let mut out = Array2::zeros((x.nrows(), kept_cols.len()));
        for (jj, &j) in kept_cols.iter().enumerate() {
            out.column_mut(jj).assign(&x.column(j));
        }
        out
    };
    let x_train_kept = select_cols(&x_train);
    let x_test_kept = select_cols(&x_test);

    // Inner folds live entirely inside the training rows.
    let folds = make_folds(train.len(), config.cv_folds, fold_seed(seed));

    let fit_result = fitter.fit(x_train_kept.view(), y_train.view(), &folds, seed);
    let model = match fit_result {
        Ok(model) => model,
        // Hard failure: record and move on; the harness is partial-failure
        // tolerant by design.
        Err(err) => {
            return SplitRecord {
                split_index,
                seed,
                metrics: None,
                coefficients: vec![0.0; p],
                n_predictors_retained: 0,
                removed_columns,
                predictions: Vec::new(),
                failure: Some(err.to_string()),
            };
        }
    };

    let predicted = model.predict(x_test_kept.view());
    let train_mean = y_train.sum() / y_train.len() as f64;
    let split_metrics = SplitMetrics {
        rmse: metrics::rmse(predicted.view(), y_test.view()),
        mae: metrics::mae(predicted.view(), y_test.view()),
        r_squared: metrics::r_squared(predicted.view(), y_test.view(), train_mean),
        tuning_criterion: model.tuning_criterion(),
    };

    // Map coefficients back to the full feature order; removed columns keep
    // an exact zero. A degenerate all-zero fit is recorded as-is.
    let inner = model.coefficients();
    let mut coefficients = vec![0.0; p];
    for (jj, &j) in kept_cols.iter().enumerate() {
        coefficients[j] = inner[jj];
    }
    let n_predictors_retained = coefficients.iter().filter(|c| **c != 0.0).count();

    let predictions = test
        .iter()
        .enumerate()
        .map(|(i, &local)| PredictionRecord {
            participant_id: matrix.participant_ids()[eligible[local]].clone(),
            actual: y_test[i],
            predicted: predicted[i],
        })
        .collect();

    SplitRecord {
        split_index,
        seed,
        metrics: Some(split_metrics),
        coefficients,
        n_predictors_retained,
        removed_columns,
        predictions,
        failure: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::linear::ElasticNet;
    use crate::types::{FeatureMatrix, PredictorRole};
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// 67 participants, outcome driven by two of five predictors, one pair
    /// nearly collinear, scattered missingness in one column.
    fn cohort() -> FeatureMatrix {
        let n = 67;
        let mut rng = StdRng::seed_from_u64(2024);
        let mut values = Array2::zeros((n, 6));
        for i in 0..n {
            let a = rng.gen_range(-1.0..1.0);
            let b = rng.gen_range(-1.0..1.0);
            let c = rng.gen_range(-1.0..1.0);
            values[[i, 0]] = a;
            values[[i, 1]] = b;
            values[[i, 2]] = c;
            values[[i, 3]] = a * 0.999 + 0.0001 * rng.gen_range(-1.0..1.0); // near-duplicate of col0
            values[[i, 4]] = rng.gen_range(-1.0..1.0);
            values[[i, 5]] = 2.0 * a - 1.5 * b + 0.1 * rng.gen_range(-1.0..1.0);
        }
        // A little missingness for the median policy to handle.
        values[[5, 2]] = f64::NAN;
        values[[40, 2]] = f64::NAN;
        let ids = (1..=n).map(|i| format!("sub{i:02}")).collect();
        FeatureMatrix::new(
            ids,
            vec![
                "erp_p3b".into(),
                "theta_power".into(),
                "tug_time".into(),
                "erp_p3b_alt".into(),
                "alpha_peak".into(),
                "brief_total".into(),
            ],
            vec![
                PredictorRole::Predictor,
                PredictorRole::Predictor,
                PredictorRole::Predictor,
                PredictorRole::Predictor,
                PredictorRole::Predictor,
                PredictorRole::Outcome,
            ],
            values,
        )
        .unwrap()
    }

    fn config() -> HarnessConfig {
        HarnessConfig {
            splits: 10,
            train_proportion: 0.7,
            cv_folds: 5,
            correlation_cutoff: 0.9,
            base_seed: 99,
            impute_policy: ImputePolicy::PerSplitMedian,
        }
    }

    #[test]
    fn harness_runs_all_splits_and_reports_counts() {
        let matrix = cohort();
        let report = run_harness(&matrix, &config(), &ElasticNet::lasso()).unwrap();
        assert_eq!(report.records.len(), 10);
        assert_eq!(report.n_succeeded + report.n_skipped, 10);
        assert!(report.n_succeeded > 0);
        assert_eq!(report.feature_names.len(), 5);
    }

    #[test]
    fn correlated_column_removed_and_recorded() {
        let matrix = cohort();
        let report = run_harness(&matrix, &config(), &ElasticNet::lasso()).unwrap();
        for record in report.records.iter().filter(|r| r.failure.is_none()) {
            // Exactly one of the collinear pair goes; the first-listed stays.
            assert_eq!(record.removed_columns, vec!["erp_p3b_alt".to_string()]);
            let alt = report
                .feature_names
                .iter()
                .position(|n| n == "erp_p3b_alt")
                .unwrap();
            assert_eq!(record.coefficients[alt], 0.0);
        }
    }

    #[test]
    fn harness_is_reproducible() {
        let matrix = cohort();
        let a = run_harness(&matrix, &config(), &ElasticNet::lasso()).unwrap();
        let b = run_harness(&matrix, &config(), &ElasticNet::lasso()).unwrap();
        for (ra, rb) in a.records.iter().zip(b.records.iter()) {
            assert_eq!(ra.seed, rb.seed);
            assert_eq!(ra.coefficients, rb.coefficients);
            let (ma, mb) = (ra.metrics.as_ref().unwrap(), rb.metrics.as_ref().unwrap());
            assert_eq!(ma.rmse, mb.rmse);
        }
    }

    #[test]
    fn precompleted_policy_rejects_missing_cells() {
        let matrix = cohort();
        let cfg = HarnessConfig {
            impute_policy: ImputePolicy::PreCompleted,
            ..config()
        };
        let err = run_harness(&matrix, &cfg, &ElasticNet::lasso()).unwrap_err();
        assert!(matches!(err, HarnessError::IncompleteMatrix(col) if col == "tug_time"));
    }

    #[test]
    fn coefficients_tagged_with_split_and_full_length() {
        let matrix = cohort();
        let report = run_harness(&matrix, &config(), &ElasticNet::lasso()).unwrap();
        for (i, record) in report.records.iter().enumerate() {
            assert_eq!(record.split_index, i + 1);
            assert_eq!(record.coefficients.len(), report.feature_names.len());
        }
    }
}
