//! Test-fold performance metrics. R² is computed against the TRAINING mean
//! (1 − SS_res/SS_tot with the train-fold mean as the baseline), not the test
//! mean; a test-mean baseline would flatter small test folds.

use ndarray::ArrayView1;

pub fn rmse(predicted: ArrayView1<f64>, actual: ArrayView1<f64>) -> f64 {
    debug_assert_eq!(predicted.len(), actual.len());
    if predicted.is_empty() {
        return f64::NAN;
    }
    let ss = predicted
        .iter()
        .zip(actual.iter())
        .map(|(p, a)| (p - a) * (p - a))
        .sum::<f64>();
    (ss / predicted.len() as f64).sqrt()
}

pub fn mae(predicted: ArrayView1<f64>, actual: ArrayView1<f64>) -> f64 {
    debug_assert_eq!(predicted.len(), actual.len());
    if predicted.is_empty() {
        return f64::NAN;
    }
    predicted
        .iter()
        .zip(actual.iter())
        .map(|(p, a)| (p - a).abs())
        .sum::<f64>()
        / predicted.len() as f64
}

/// R² with an explicit baseline mean (the training-fold outcome mean).
pub fn r_squared(predicted: ArrayView1<f64>, actual: ArrayView1<f64>, baseline_mean: f64) -> f64 {
    debug_assert_eq!(predicted.len(), actual.len());
    let ss_res = predicted
        .iter()
        .zip(actual.iter())
        .map(|(p, a)| (p - a) * (p - a))
        .sum::<f64>();
    let ss_tot = actual
        .iter()
        .map(|a| (a - baseline_mean) * (a - baseline_mean))
        .sum::<f64>();
    if ss_tot <= 0.0 {
        return f64::NAN;
    }
    1.0 - ss_res / ss_tot
}
