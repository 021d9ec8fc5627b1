//! Small shared numeric kernels: pairwise statistics over partially observed
//! columns, a dense Cholesky solve for the ridge-stabilized normal equations,
//! and quantile helpers. Everything here is dimension-light (tens of columns,
//! tens of rows), so plain `ndarray` loops are the right tool; no BLAS
//! backend is warranted at this scale.

use ndarray::{Array1, Array2, ArrayView1};

/// Pairwise statistics between two partially observed columns.
#[derive(Debug, Clone, Copy)]
pub struct PairwiseStats {
    /// Pearson correlation over jointly observed cases; 0.0 when undefined
    /// (fewer than two joint cases, or zero variance in either column).
    pub correlation: f64,
    /// Number of jointly observed cases.
    pub joint_observed: usize,
    /// Proportion of rows where both cells are observed.
    pub usable_proportion: f64,
}

/// Computes Pearson correlation and usable-case proportion over the rows where
/// both columns are observed. NaN cells are treated as "not observed".
pub fn pairwise_stats(x: ArrayView1<f64>, y: ArrayView1<f64>) -> PairwiseStats {
    debug_assert_eq!(x.len(), y.len());
    let n_total = x.len();
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    for i in 0..n_total {
        if !x[i].is_nan() && !y[i].is_nan() {
            xs.push(x[i]);
            ys.push(y[i]);
        }
    }
    let joint = xs.len();
    let usable = if n_total == 0 {
        0.0
    } else {
        joint as f64 / n_total as f64
    };
    if joint < 2 {
        return PairwiseStats {
            correlation: 0.0,
            joint_observed: joint,
            usable_proportion: usable,
        };
    }
    let mx = xs.iter().sum::<f64>() / joint as f64;
    let my = ys.iter().sum::<f64>() / joint as f64;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for i in 0..joint {
        let dx = xs[i] - mx;
        let dy = ys[i] - my;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    let correlation = if sxx <= 0.0 || syy <= 0.0 {
        0.0
    } else {
        sxy / (sxx.sqrt() * syy.sqrt())
    };
    PairwiseStats {
        correlation,
        joint_observed: joint,
        usable_proportion: usable,
    }
}

/// Solves `A x = b` for symmetric positive-definite `A` via Cholesky.
/// Returns `None` when the factorization breaks down (non-PD input).
pub fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    debug_assert_eq!(a.ncols(), n);
    debug_assert_eq!(b.len(), n);
    let mut l = Array2::<f64>::zeros((n, n));
    for j in 0..n {
        let mut diag = a[[j, j]];
        for k in 0..j {
            diag -= l[[j, k]] * l[[j, k]];
        }
        if diag <= 0.0 {
            return None;
        }
        l[[j, j]] = diag.sqrt();
        for i in (j + 1)..n {
            let mut v = a[[i, j]];
            for k in 0..j {
                v -= l[[i, k]] * l[[j, k]];
            }
            l[[i, j]] = v / l[[j, j]];
        }
    }
    // Forward then backward substitution.
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut v = b[i];
        for k in 0..i {
            v -= l[[i, k]] * y[k];
        }
        y[i] = v / l[[i, i]];
    }
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut v = y[i];
        for k in (i + 1)..n {
            v -= l[[k, i]] * x[k];
        }
        x[i] = v / l[[i, i]];
    }
    Some(x)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n-1 denominator).
pub fn sample_sd(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    let ss = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>();
    (ss / (n - 1) as f64).sqrt()
}

/// Median over a copy of the input; NaN when empty.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("median input must be finite"));
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Empirical quantile with linear interpolation between order statistics.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Z-score normalization across a slice; zero scores when the spread is zero
/// so a constant column never dominates a composite.
pub fn z_scores(values: &[f64]) -> Vec<f64> {
    let m = mean(values);
    let sd = sample_sd(values);
    if sd <= 0.0 || !sd.is_finite() {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - m) / sd).collect()
}
