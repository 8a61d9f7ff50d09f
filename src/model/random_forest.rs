//! Supervised random forest over known-insider labels. Bagged CART trees split on Gini impurity.

use crate::config::RandomForestConfig;
use crate::error::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
enum CartNode {
    Split {
        feature: usize,
        threshold: f64,
        left: Box<CartNode>,
        right: Box<CartNode>,
    },
    Leaf {
        /// Fraction of positive rows that reached this leaf
        positive: f64,
    },
}

impl CartNode {
    fn predict(&self, row: &[f64]) -> f64 {
        match self {
            CartNode::Leaf { positive } => *positive,
            CartNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if row.get(*feature).copied().unwrap_or(0.0) <= *threshold {
                    left.predict(row)
                } else {
                    right.predict(row)
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    config: RandomForestConfig,
    trees: Vec<CartNode>,
    oob: Vec<f64>,
}

struct Grower<'a> {
    x: &'a [Vec<f64>],
    y: &'a [bool],
    dim: usize,
    mtry: usize,
    max_depth: usize,
    min_samples_split: usize,
}

impl RandomForest {
    pub fn new(config: RandomForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            oob: Vec::new(),
        }
    }

    pub fn is_trained(&self) -> bool {
        !self.trees.is_empty()
    }

    /// Fit on rows `x` with labels `y` (true = insider). Both classes must be present.
    pub fn fit(&mut self, x: &[Vec<f64>], y: &[bool]) -> Result<()> {
        if x.is_empty() || x.len() != y.len() {
            return Err(Error::InsufficientData(format!(
                "random forest needs matching rows and labels, got {} and {}",
                x.len(),
                y.len()
            )));
        }
        let positives = y.iter().filter(|l| **l).count();
        if positives == 0 || positives == y.len() {
            return Err(Error::InsufficientData(
                "random forest needs both insider and non-insider rows".into(),
            ));
        }

        let n = x.len();
        let dim = x.iter().map(Vec::len).max().unwrap_or(0);
        let grower = Grower {
            x,
            y,
            dim,
            mtry: ((dim as f64).sqrt().ceil() as usize).clamp(1, dim.max(1)),
            max_depth: self.config.max_depth,
            min_samples_split: self.config.min_samples_split.max(2),
        };
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut oob_sum = vec![0.0f64; n];
        let mut oob_hits = vec![0usize; n];

        self.trees.clear();
        for _ in 0..self.config.n_trees.max(1) {
            let mut in_bag = vec![false; n];
            let sample: Vec<usize> = (0..n)
                .map(|_| {
                    let i = rng.gen_range(0..n);
                    in_bag[i] = true;
                    i
                })
                .collect();
            let tree = grower.grow(&mut rng, sample, 0);
            for i in (0..n).filter(|i| !in_bag[*i]) {
                oob_sum[i] += tree.predict(&x[i]);
                oob_hits[i] += 1;
            }
            self.trees.push(tree);
        }

        self.oob = (0..n)
            .map(|i| {
                if oob_hits[i] > 0 {
                    oob_sum[i] / oob_hits[i] as f64
                } else {
                    self.predict_proba(&x[i])
                }
            })
            .collect();
        tracing::debug!(trees = self.trees.len(), positives, rows = n, "random forest fitted");
        Ok(())
    }

    /// Mean positive fraction across trees; 0 when untrained.
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.predict(row)).sum::<f64>() / self.trees.len() as f64
    }

    /// Out-of-bag probability for each training row, in training order.
    pub fn oob_proba(&self) -> &[f64] {
        &self.oob
    }
}

fn gini(pos: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let p = pos as f64 / total as f64;
    2.0 * p * (1.0 - p)
}

impl Grower<'_> {
    fn grow(&self, rng: &mut StdRng, idx: Vec<usize>, depth: usize) -> CartNode {
        let total = idx.len();
        let pos = idx.iter().filter(|i| self.y[**i]).count();
        let positive = if total == 0 { 0.0 } else { pos as f64 / total as f64 };
        if depth >= self.max_depth || total < self.min_samples_split || pos == 0 || pos == total {
            return CartNode::Leaf { positive };
        }

        let parent = gini(pos, total);
        let mut best: Option<(usize, f64, f64)> = None;
        for feature in rand::seq::index::sample(rng, self.dim, self.mtry.min(self.dim)) {
            let mut pairs: Vec<(f64, bool)> = idx
                .iter()
                .map(|i| (self.x[*i].get(feature).copied().unwrap_or(0.0), self.y[*i]))
                .collect();
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_pos = 0usize;
            for k in 1..total {
                if pairs[k - 1].1 {
                    left_pos += 1;
                }
                if pairs[k - 1].0 >= pairs[k].0 {
                    continue;
                }
                let impurity = (k as f64 * gini(left_pos, k)
                    + (total - k) as f64 * gini(pos - left_pos, total - k))
                    / total as f64;
                if best.map_or(true, |(_, _, b)| impurity < b) {
                    best = Some((feature, (pairs[k - 1].0 + pairs[k].0) / 2.0, impurity));
                }
            }
        }

        let Some((feature, threshold, impurity)) = best else {
            return CartNode::Leaf { positive };
        };
        if impurity >= parent - 1e-12 {
            return CartNode::Leaf { positive };
        }
        let (left, right): (Vec<usize>, Vec<usize>) = idx
            .into_iter()
            .partition(|i| self.x[*i].get(feature).copied().unwrap_or(0.0) <= threshold);
        CartNode::Split {
            feature,
            threshold,
            left: Box::new(self.grow(rng, left, depth + 1)),
            right: Box::new(self.grow(rng, right, depth + 1)),
        }
    }
}
