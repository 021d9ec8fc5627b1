//! Gradient-boosted regression trees on squared loss.
//!
//! Exact greedy splitting with second-order leaf weights. At the cohort sizes
//! this engine targets (tens of rows, dozens of columns) histogram binning
//! buys nothing, so splits are found over sorted raw feature values. Leaf
//! weights carry L1/L2 penalties (`-soft(G, alpha) / (H + lambda)`), row and
//! column subsampling are seeded per tree, and feature attributions are
//! gain-based, normalized to sum to one.

use super::{FitError, FittedModel, ModelFitter, remap_folds, soft_threshold, usable_rows};
use crate::evaluate::split::Fold;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// One point in the boosting hyperparameter grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    /// Row fraction sampled per tree.
    pub subsample: f64,
    /// Column fraction sampled per tree.
    pub colsample: f64,
    /// Minimum hessian sum per child (row count under squared loss).
    pub min_child_weight: f64,
    /// L1 penalty on leaf weights.
    pub reg_alpha: f64,
    /// L2 penalty on leaf weights.
    pub reg_lambda: f64,
}

impl Default for BoostParams {
    fn default() -> Self {
        Self {
            n_trees: 200,
            max_depth: 3,
            learning_rate: 0.05,
            subsample: 0.8,
            colsample: 0.8,
            min_child_weight: 3.0,
            reg_alpha: 0.0,
            reg_lambda: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GradientBooster {
    pub params: BoostParams,
}

impl GradientBooster {
    pub fn new(params: BoostParams) -> Self {
        Self { params }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        weight: f64,
    },
    Internal {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut at = 0usize;
        loop {
            match &self.nodes[at] {
                Node::Leaf { weight } => return *weight,
                Node::Internal {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    at = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

#[derive(Debug)]
pub struct FittedBooster {
    base_score: f64,
    learning_rate: f64,
    trees: Vec<Tree>,
    importances: Array1<f64>,
    criterion: f64,
}

impl FittedModel for FittedBooster {
    fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        Array1::from_iter((0..x.nrows()).map(|i| {
            let mut yhat = self.base_score;
            for tree in &self.trees {
                yhat += self.learning_rate * tree.predict_row(x.row(i));
            }
            yhat
        }))
    }

    fn coefficients(&self) -> &Array1<f64> {
        &self.importances
    }

    fn tuning_criterion(&self) -> f64 {
        self.criterion
    }
}

struct TreeBuilder<'a> {
    x: &'a Array2<f64>,
    gradients: &'a [f64],
    params: &'a BoostParams,
    features: Vec<usize>,
    nodes: Vec<Node>,
    /// Split gain accumulated per feature.
    gains: Vec<f64>,
}

impl<'a> TreeBuilder<'a> {
    fn leaf_score(&self, g: f64, h: f64) -> f64 {
        let num = soft_threshold(g, self.params.reg_alpha);
        num * num / (h + self.params.reg_lambda)
    }

    fn leaf_weight(&self, g: f64, h: f64) -> f64 {
        -soft_threshold(g, self.params.reg_alpha) / (h + self.params.reg_lambda)
    }

    fn build(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let g: f64 = rows.iter().map(|&r| self.gradients[r]).sum();
        let h = rows.len() as f64;

        if depth >= self.params.max_depth || rows.len() < 2 {
            return self.push_leaf(g, h);
        }

        let parent_score = self.leaf_score(g, h);
        let mut best: Option<(usize, f64, f64)> = None; // (feature, threshold, gain)
        let features = self.features.clone();
        for feature in features {
            let mut ordered: Vec<usize> = rows.clone();
            ordered.sort_by(|&a, &b| {
                self.x[[a, feature]]
                    .partial_cmp(&self.x[[b, feature]])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            let mut gl = 0.0;
            let mut hl = 0.0;
            for i in 0..ordered.len() - 1 {
                gl += self.gradients[ordered[i]];
                hl += 1.0;
                let here = self.x[[ordered[i], feature]];
                let next = self.x[[ordered[i + 1], feature]];
                if here == next {
                    continue;
                }
                let hr = h - hl;
                if hl < self.params.min_child_weight || hr < self.params.min_child_weight {
                    continue;
                }
                let gr = g - gl;
                let gain =
                    0.5 * (self.leaf_score(gl, hl) + self.leaf_score(gr, hr) - parent_score);
                if gain > best.map_or(0.0, |(_, _, g)| g) {
                    best = Some((feature, (here + next) / 2.0, gain));
                }
            }
        }

        match best {
            None => self.push_leaf(g, h),
            Some((feature, threshold, gain)) => {
                self.gains[feature] += gain;
                let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
                    .into_iter()
                    .partition(|&r| self.x[[r, feature]] <= threshold);
                let slot = self.nodes.len();
                self.nodes.push(Node::Leaf { weight: 0.0 }); // placeholder
                let left = self.build(left_rows, depth + 1);
                let right = self.build(right_rows, depth + 1);
                self.nodes[slot] = Node::Internal {
                    feature,
                    threshold,
                    left,
                    right,
                };
                slot
            }
        }
    }

    fn push_leaf(&mut self, g: f64, h: f64) -> usize {
        let weight = self.leaf_weight(g, h);
        self.nodes.push(Node::Leaf { weight });
        self.nodes.len() - 1
    }
}

/// Plain boosted fit with a given seed; no cross-validation.
fn fit_plain(
    x: &Array2<f64>,
    y: &Array1<f64>,
    params: &BoostParams,
    seed: u64,
) -> (f64, Vec<Tree>, Array1<f64>) {
    let n = x.nrows();
    let p = x.ncols();
    let base_score = y.sum() / n as f64;
    let mut predictions = vec![base_score; n];
    let mut trees = Vec::with_capacity(params.n_trees);
    let mut gains = vec![0.0; p];
    let mut rng = StdRng::seed_from_u64(seed);

    let n_rows_sampled = ((params.subsample * n as f64).round() as usize).clamp(1, n);
    let n_cols_sampled = ((params.colsample * p as f64).ceil() as usize).clamp(1, p);

    for _ in 0..params.n_trees {
        let mut all_rows: Vec<usize> = (0..n).collect();
        all_rows.shuffle(&mut rng);
        let mut rows = all_rows[..n_rows_sampled].to_vec();
        rows.sort_unstable();

        let mut all_cols: Vec<usize> = (0..p).collect();
        all_cols.shuffle(&mut rng);
        let mut features = all_cols[..n_cols_sampled].to_vec();
        features.sort_unstable();

        // Squared loss: g_i = prediction - target, h_i = 1.
        let gradients: Vec<f64> = (0..n).map(|i| predictions[i] - y[i]).collect();

        let mut builder = TreeBuilder {
            x,
            gradients: &gradients,
            params,
            features,
            nodes: Vec::new(),
            gains: vec![0.0; p],
        };
        builder.build(rows, 0);
        let tree = Tree {
            nodes: builder.nodes,
        };
        for j in 0..p {
            gains[j] += builder.gains[j];
        }

        for i in 0..n {
            predictions[i] += params.learning_rate * tree.predict_row(x.row(i));
        }
        trees.push(tree);
    }

    let total_gain: f64 = gains.iter().sum();
    let importances = if total_gain > 0.0 {
        Array1::from_iter(gains.iter().map(|g| g / total_gain))
    } else {
        Array1::zeros(p)
    };
    (base_score, trees, importances)
}

impl ModelFitter for GradientBooster {
    fn name(&self) -> &'static str {
        "gradient_booster"
    }

    fn fit(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        folds: &[Fold],
        seed: u64,
    ) -> Result<Box<dyn FittedModel>, FitError> {
        let (xf, yf, kept) = usable_rows(x, y)?;
        let folds = remap_folds(folds, &kept);
        let n = xf.nrows();

        // Held-out criterion for this fixed candidate: mean validation RMSE
        // over the folds, each fold refit from scratch on its complement.
        let criterion = if folds.len() >= 2 {
            let mut fold_rmses = Vec::with_capacity(folds.len());
            for fold in &folds {
                let validation = &fold.validation;
                let train: Vec<usize> = (0..n).filter(|r| !validation.contains(r)).collect();
                if train.is_empty() || validation.is_empty() {
                    continue;
                }
                let mut xt = Array2::zeros((train.len(), xf.ncols()));
                let mut yt = Array1::zeros(train.len());
                for (i, &r) in train.iter().enumerate() {
                    xt.row_mut(i).assign(&xf.row(r));
                    yt[i] = yf[r];
                }
                let (base, trees, _) = fit_plain(
                    &xt,
                    &yt,
                    &self.params,
                    seed.wrapping_add(fold.index as u64 + 1),
                );
                let ss: f64 = validation
                    .iter()
                    .map(|&r| {
                        let mut yhat = base;
                        for tree in &trees {
                            yhat += self.params.learning_rate * tree.predict_row(xf.row(r));
                        }
                        (yhat - yf[r]) * (yhat - yf[r])
                    })
                    .sum();
                fold_rmses.push((ss / validation.len() as f64).sqrt());
            }
            if fold_rmses.is_empty() {
                f64::NAN
            } else {
                fold_rmses.iter().sum::<f64>() / fold_rmses.len() as f64
            }
        } else {
            f64::NAN
        };

        let (base_score, trees, importances) = fit_plain(&xf, &yf, &self.params, seed);

        Ok(Box::new(FittedBooster {
            base_score,
            learning_rate: self.params.learning_rate,
            trees,
            importances,
            criterion,
        }))
    }
}
