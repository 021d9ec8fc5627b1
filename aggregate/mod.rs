//! # Cross-Split Result Aggregation
//!
//! Turns the harness's per-split records into publication-facing statistics:
//! selection frequency per predictor, coefficient statistics computed only
//! over the splits where the predictor was actually selected (never diluted
//! by zeros from excluded splits), and percentile-bootstrap confidence
//! intervals on the per-split test metrics.

use crate::evaluate::HarnessReport;
use crate::numeric::{mean, quantile, sample_sd};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Critical value for the normal-approximation 95% CI on coefficients.
const Z_95: f64 = 1.96;

/// Per-predictor stability summary across splits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorSummary {
    pub name: String,
    /// Fraction of successful splits with a non-zero coefficient.
    pub selection_frequency: f64,
    pub n_selected: usize,
    /// Statistics over the selected splits only.
    pub mean_coefficient: f64,
    pub sd_coefficient: f64,
    pub se_coefficient: f64,
    pub ci_low: f64,
    pub ci_high: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BootstrapCi {
    pub mean: f64,
    pub low: f64,
    pub high: f64,
}

/// Point estimates plus bootstrap CIs for the harness's test metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub n_succeeded: usize,
    pub n_skipped: usize,
    pub r_squared: BootstrapCi,
    pub rmse: BootstrapCi,
    pub mae: BootstrapCi,
}

/// Selection frequency and selected-only coefficient statistics, one row per
/// predictor, in the harness's feature order.
pub fn summarize_coefficients(report: &HarnessReport) -> Vec<PredictorSummary> {
    let succeeded: Vec<&Vec<f64>> = report
        .records
        .iter()
        .filter(|r| r.failure.is_none())
        .map(|r| &r.coefficients)
        .collect();
    let n_splits = succeeded.len();

    report
        .feature_names
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let selected: Vec<f64> = succeeded
                .iter()
                .map(|coefs| coefs[j])
                .filter(|c| *c != 0.0)
                .collect();
            let n_selected = selected.len();
            let sd = sample_sd(&selected);
            let se = if n_selected > 0 {
                sd / (n_selected as f64).sqrt()
            } else {
                f64::NAN
            };
            let m = mean(&selected);
            PredictorSummary {
                name: name.clone(),
                selection_frequency: if n_splits > 0 {
                    n_selected as f64 / n_splits as f64
                } else {
                    0.0
                },
                n_selected,
                mean_coefficient: m,
                sd_coefficient: sd,
                se_coefficient: se,
                ci_low: m - Z_95 * se,
                ci_high: m + Z_95 * se,
            }
        })
        .collect()
}

/// Percentile bootstrap over per-split metric values: resample with
/// replacement `b` times, take each resample's mean, report the 2.5th/97.5th
/// percentiles of those means.
pub fn bootstrap_ci(values: &[f64], b: usize, seed: u64) -> BootstrapCi {
    let usable: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if usable.is_empty() {
        return BootstrapCi {
            mean: f64::NAN,
            low: f64::NAN,
            high: f64::NAN,
        };
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut resample_means = Vec::with_capacity(b);
    for _ in 0..b {
        let total: f64 = (0..usable.len())
            .map(|_| usable[rng.gen_range(0..usable.len())])
            .sum();
        resample_means.push(total / usable.len() as f64);
    }
    resample_means.sort_by(|a, b| a.partial_cmp(b).expect("resample means are finite"));
    BootstrapCi {
        mean: mean(&usable),
        low: quantile(&resample_means, 0.025),
        high: quantile(&resample_means, 0.975),
    }
}

/// Bootstrap summaries for all three test metrics; seeds fan out from `seed`
/// so the three CIs are independent but reproducible.
pub fn summarize_performance(report: &HarnessReport, b: usize, seed: u64) -> PerformanceSummary {
    let collect = |f: &dyn Fn(&crate::evaluate::SplitMetrics) -> f64| -> Vec<f64> {
        report
            .records
            .iter()
            .filter_map(|r| r.metrics.as_ref())
            .map(f)
            .collect()
    };
    let r2s = collect(&|m| m.r_squared);
    let rmses = collect(&|m| m.rmse);
    let maes = collect(&|m| m.mae);
    PerformanceSummary {
        n_succeeded: report.n_succeeded,
        n_skipped: report.n_skipped,
        r_squared: bootstrap_ci(&r2s, b, seed),
        rmse: bootstrap_ci(&rmses, b, seed.wrapping_add(1)),
        mae: bootstrap_ci(&maes, b, seed.wrapping_add(2)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::{HarnessReport, SplitMetrics, SplitRecord};
    use approx::assert_abs_diff_eq;

    fn record(index: usize, coefficients: Vec<f64>, r2: f64) -> SplitRecord {
        SplitRecord {
            split_index: index,
            seed: index as u64,
            metrics: Some(SplitMetrics {
                rmse: 1.0,
                mae: 0.8,
                r_squared: r2,
                tuning_criterion: 0.5,
            }),
            n_predictors_retained: coefficients.iter().filter(|c| **c != 0.0).count(),
            coefficients,
            removed_columns: Vec::new(),
            predictions: Vec::new(),
            failure: None,
        }
    }

    fn report() -> HarnessReport {
        HarnessReport {
            feature_names: vec!["a".into(), "b".into(), "c".into()],
            records: vec![
                record(1, vec![1.0, 0.0, 0.5], 0.3),
                record(2, vec![2.0, 0.0, 0.0], 0.4),
                record(3, vec![3.0, 0.0, -0.5], 0.5),
                record(4, vec![2.0, 0.0, 0.0], 0.2),
            ],
            n_succeeded: 4,
            n_skipped: 0,
        }
    }

    #[test]
    fn selection_frequency_counts_nonzero_splits() {
        let summary = summarize_coefficients(&report());
        assert_abs_diff_eq!(summary[0].selection_frequency, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(summary[1].selection_frequency, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(summary[2].selection_frequency, 0.5, epsilon = 1e-12);
        // Frequency 1.0 implies a non-zero coefficient in every record.
        for r in &report().records {
            assert_ne!(r.coefficients[0], 0.0);
        }
    }

    #[test]
    fn coefficient_stats_use_selected_splits_only() {
        let summary = summarize_coefficients(&report());
        // Predictor "a": mean over {1, 2, 3, 2} = 2.0, not diluted.
        assert_abs_diff_eq!(summary[0].mean_coefficient, 2.0, epsilon = 1e-12);
        // Predictor "c": mean over {0.5, -0.5} only.
        assert_abs_diff_eq!(summary[2].mean_coefficient, 0.0, epsilon = 1e-12);
        assert_eq!(summary[2].n_selected, 2);
    }

    #[test]
    fn frequencies_stay_in_unit_interval() {
        for s in summarize_coefficients(&report()) {
            assert!((0.0..=1.0).contains(&s.selection_frequency));
        }
    }

    #[test]
    fn bootstrap_ci_brackets_the_mean_and_is_reproducible() {
        let values: Vec<f64> = (0..50).map(|i| (i % 7) as f64).collect();
        let a = bootstrap_ci(&values, 100, 9);
        let b = bootstrap_ci(&values, 100, 9);
        assert_eq!(a.low, b.low);
        assert_eq!(a.high, b.high);
        assert!(a.low <= a.mean && a.mean <= a.high);
    }

    #[test]
    fn bootstrap_of_constant_values_collapses() {
        let ci = bootstrap_ci(&[2.5; 20], 100, 1);
        assert_abs_diff_eq!(ci.low, 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(ci.high, 2.5, epsilon = 1e-12);
    }

    #[test]
    fn performance_summary_reports_counts() {
        let summary = summarize_performance(&report(), 100, 4);
        assert_eq!(summary.n_succeeded, 4);
        assert_eq!(summary.n_skipped, 0);
        assert!(summary.r_squared.mean.is_finite());
        assert_abs_diff_eq!(summary.r_squared.mean, 0.35, epsilon = 1e-12);
    }
}
