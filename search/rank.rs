//! Composite ranking of hyperparameter candidates.
//!
//! Each candidate gets three component scores: performance (mean test R²),
//! stability (1/(1+sd of R²)), and robustness (worst-case split R²). The
//! components are z-scored across all candidates and combined with fixed
//! weights. Ties break on candidate id, which makes the resulting order
//! independent of input row order.

use super::CandidateRecord;
use crate::numeric::z_scores;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub record: CandidateRecord,
    pub z_performance: f64,
    pub z_stability: f64,
    pub z_robustness: f64,
    pub combined: f64,
    /// 1-based rank by combined score, descending.
    pub rank: usize,
}

/// Recommended candidate ids keyed by selection criterion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendations {
    pub best_overall: usize,
    pub most_stable: usize,
    pub best_r2: usize,
    /// A candidate in the top-K of at least two of {combined, performance,
    /// stability}; `None` when no candidate satisfies the intersection.
    pub robust_choice: Option<usize>,
}

/// Ranks candidates by the weighted combination of z-scored components.
pub fn rank_candidates(
    records: Vec<CandidateRecord>,
    weights: (f64, f64, f64),
) -> Vec<RankedCandidate> {
    let mut records = records;
    // Canonical order first so z-scores and ties never depend on how the
    // caller happened to order the rows.
    records.sort_by_key(|r| r.id);

    let perf: Vec<f64> = records.iter().map(|r| r.mean_r2).collect();
    let stab: Vec<f64> = records.iter().map(|r| r.stability).collect();
    let robust: Vec<f64> = records.iter().map(|r| r.worst_r2).collect();
    let z_perf = z_scores(&perf);
    let z_stab = z_scores(&stab);
    let z_robust = z_scores(&robust);

    let (w_perf, w_stab, w_robust) = weights;
    let mut ranked: Vec<RankedCandidate> = records
        .into_iter()
        .enumerate()
        .map(|(i, record)| RankedCandidate {
            combined: w_perf * z_perf[i] + w_stab * z_stab[i] + w_robust * z_robust[i],
            z_performance: z_perf[i],
            z_stability: z_stab[i],
            z_robustness: z_robust[i],
            record,
            rank: 0,
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.combined
            .partial_cmp(&a.combined)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.record.id.cmp(&b.record.id))
    });
    for (i, candidate) in ranked.iter_mut().enumerate() {
        candidate.rank = i + 1;
    }
    ranked
}

fn top_k_ids<F: Fn(&RankedCandidate) -> f64>(
    ranked: &[RankedCandidate],
    k: usize,
    score: F,
) -> HashSet<usize> {
    let mut by_score: Vec<&RankedCandidate> = ranked.iter().collect();
    by_score.sort_by(|a, b| {
        score(b)
            .partial_cmp(&score(a))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.record.id.cmp(&b.record.id))
    });
    by_score.iter().take(k).map(|c| c.record.id).collect()
}

/// Derives the recommended-parameters object from a ranked candidate set.
pub fn recommend(ranked: &[RankedCandidate], top_k: usize) -> Option<Recommendations> {
    if ranked.is_empty() {
        return None;
    }
    let best_overall = ranked[0].record.id;
    let most_stable = top_k_ids(ranked, 1, |c| c.record.stability)
        .into_iter()
        .next()
        .unwrap_or(best_overall);
    let best_r2 = top_k_ids(ranked, 1, |c| c.record.mean_r2)
        .into_iter()
        .next()
        .unwrap_or(best_overall);

    let by_combined = top_k_ids(ranked, top_k, |c| c.combined);
    let by_perf = top_k_ids(ranked, top_k, |c| c.record.mean_r2);
    let by_stab = top_k_ids(ranked, top_k, |c| c.record.stability);

    // Robust candidates sit in the top-K of at least two rankings; pick the
    // best-combined among them.
    let robust_choice = ranked
        .iter()
        .filter(|c| {
            let id = c.record.id;
            let hits = [&by_combined, &by_perf, &by_stab]
                .iter()
                .filter(|set| set.contains(&id))
                .count();
            hits >= 2
        })
        .map(|c| c.record.id)
        .next();

    Some(Recommendations {
        best_overall,
        most_stable,
        best_r2,
        robust_choice,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::boost::BoostParams;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    fn candidate(id: usize, mean_r2: f64, sd_r2: f64, worst_r2: f64) -> CandidateRecord {
        CandidateRecord {
            id,
            params: BoostParams::default(),
            mean_r2,
            sd_r2,
            mean_rmse: 1.0 - mean_r2,
            sd_rmse: sd_r2,
            worst_r2,
            stability: 1.0 / (1.0 + sd_r2),
            n_splits_ok: 10,
            n_splits_skipped: 0,
        }
    }

    fn fixed_table() -> Vec<CandidateRecord> {
        let mut rng = StdRng::seed_from_u64(31);
        (0..20)
            .map(|id| {
                let r2 = rng.gen_range(0.1..0.6);
                let sd = rng.gen_range(0.01..0.2);
                candidate(id, r2, sd, r2 - 2.0 * sd)
            })
            .collect()
    }

    #[test]
    fn ranking_is_invariant_to_input_row_order() {
        let table = fixed_table();
        let mut shuffled = table.clone();
        shuffled.shuffle(&mut StdRng::seed_from_u64(7));

        let a = rank_candidates(table, (0.5, 0.3, 0.2));
        let b = rank_candidates(shuffled, (0.5, 0.3, 0.2));
        let order_a: Vec<usize> = a.iter().map(|c| c.record.id).collect();
        let order_b: Vec<usize> = b.iter().map(|c| c.record.id).collect();
        assert_eq!(order_a, order_b);
        for (ca, cb) in a.iter().zip(b.iter()) {
            assert_abs_diff_eq!(ca.combined, cb.combined, epsilon = 1e-12);
        }
    }

    #[test]
    fn ranks_are_dense_and_descending() {
        let ranked = rank_candidates(fixed_table(), (0.5, 0.3, 0.2));
        for (i, c) in ranked.iter().enumerate() {
            assert_eq!(c.rank, i + 1);
        }
        for pair in ranked.windows(2) {
            assert!(pair[0].combined >= pair[1].combined);
        }
    }

    #[test]
    fn dominant_candidate_wins_everything() {
        let mut table = fixed_table();
        table.push(candidate(99, 0.95, 0.001, 0.94));
        let ranked = rank_candidates(table, (0.5, 0.3, 0.2));
        assert_eq!(ranked[0].record.id, 99);
        let rec = recommend(&ranked, 5).unwrap();
        assert_eq!(rec.best_overall, 99);
        assert_eq!(rec.best_r2, 99);
        assert_eq!(rec.most_stable, 99);
        assert_eq!(rec.robust_choice, Some(99));
    }

    #[test]
    fn recommend_on_empty_input_is_none() {
        assert!(recommend(&[], 5).is_none());
    }
}
