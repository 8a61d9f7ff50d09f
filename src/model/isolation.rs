//! Isolation forest: random axis-aligned partitioning; short isolation paths mean anomalies.

use crate::config::IsolationForestConfig;
use crate::error::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Internal {
        feature: usize,
        split: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
    Leaf {
        size: usize,
    },
}

impl Node {
    fn path_length(&self, sample: &[f64], depth: usize) -> f64 {
        match self {
            Node::Leaf { size } => depth as f64 + average_path_length(*size),
            Node::Internal {
                feature,
                split,
                left,
                right,
            } => {
                let v = sample.get(*feature).copied().unwrap_or(0.0);
                if v < *split {
                    left.path_length(sample, depth + 1)
                } else {
                    right.path_length(sample, depth + 1)
                }
            }
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` points.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    config: IsolationForestConfig,
    trees: Vec<Node>,
    sample_size: usize,
    threshold: Option<f64>,
}

impl IsolationForest {
    pub fn new(config: IsolationForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            sample_size: 0,
            threshold: None,
        }
    }

    pub fn is_trained(&self) -> bool {
        !self.trees.is_empty()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// Score at or above which a sample counts as anomalous, set by `fit`.
    pub fn threshold(&self) -> Option<f64> {
        self.threshold
    }

    /// Fit on `data` rows; deterministic for a given seed.
    pub fn fit(&mut self, data: &[Vec<f64>]) -> Result<()> {
        if data.is_empty() {
            return Err(Error::InsufficientData("isolation forest needs at least one row".into()));
        }
        let n = data.len();
        let psi = self.config.max_samples.min(n).max(1);
        let height_limit = (psi as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        self.trees = (0..self.config.n_estimators.max(1))
            .map(|_| {
                let idx = rand::seq::index::sample(&mut rng, n, psi).into_vec();
                build(&mut rng, data, idx, 0, height_limit)
            })
            .collect();
        self.sample_size = psi;

        let scores: Vec<f64> = data.iter().map(|row| self.score_raw(row)).collect();
        self.threshold = Some(quantile(&scores, 1.0 - self.config.contamination));
        tracing::debug!(
            trees = self.trees.len(),
            sample_size = psi,
            height_limit,
            threshold = ?self.threshold,
            "isolation forest fitted"
        );
        Ok(())
    }

    fn score_raw(&self, sample: &[f64]) -> f64 {
        let mean_path = self
            .trees
            .iter()
            .map(|t| t.path_length(sample, 0))
            .sum::<f64>()
            / self.trees.len() as f64;
        let c = average_path_length(self.sample_size);
        if c == 0.0 {
            return 0.5;
        }
        2f64.powf(-mean_path / c)
    }

    /// Anomaly score in (0, 1]; higher is more anomalous.
    pub fn score_samples(&self, sample: &[f64]) -> Result<f64> {
        if !self.is_trained() {
            return Err(Error::InsufficientData("isolation forest is not trained".into()));
        }
        Ok(self.score_raw(sample))
    }

    pub fn is_anomaly(&self, score: f64) -> bool {
        self.threshold.is_some_and(|t| score >= t)
    }
}

fn build(rng: &mut StdRng, data: &[Vec<f64>], idx: Vec<usize>, depth: usize, height_limit: usize) -> Node {
    if depth >= height_limit || idx.len() <= 1 {
        return Node::Leaf { size: idx.len() };
    }

    let dim = idx.iter().map(|i| data[*i].len()).max().unwrap_or(0);
    let spreads: Vec<(usize, f64, f64)> = (0..dim)
        .filter_map(|f| {
            let (lo, hi) = idx.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), i| {
                let v = data[*i].get(f).copied().unwrap_or(0.0);
                (lo.min(v), hi.max(v))
            });
            (hi > lo).then_some((f, lo, hi))
        })
        .collect();
    if spreads.is_empty() {
        return Node::Leaf { size: idx.len() };
    }

    let (feature, lo, hi) = spreads[rng.gen_range(0..spreads.len())];
    let split = rng.gen_range(lo..hi);
    let (left, right): (Vec<usize>, Vec<usize>) = idx
        .into_iter()
        .partition(|i| data[*i].get(feature).copied().unwrap_or(0.0) < split);

    Node::Internal {
        feature,
        split,
        left: Box::new(build(rng, data, left, depth + 1, height_limit)),
        right: Box::new(build(rng, data, right, depth + 1, height_limit)),
    }
}

/// Linear-interpolated quantile, `q` in [0, 1].
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}
