//! Standardizes isolation forest scores, ranks users, and assigns risk levels.

use crate::config::RiskConfig;
use crate::model::StandardScaler;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: f64, config: &RiskConfig) -> Self {
        if score >= config.high_threshold {
            RiskLevel::High
        } else if score >= config.medium_threshold {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

/// Ranking row for a single user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskResult {
    pub user: String,
    /// Standardized isolation forest score
    pub isolation_forest: f64,
    /// Raw isolation forest score in (0, 1]
    pub raw_score: f64,
    /// Inside the contamination tail
    pub anomaly: bool,
    /// Supervised insider probability, when labels were supplied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub random_forest: Option<f64>,
    pub rank: usize,
    pub level: RiskLevel,
}

pub struct RiskEngine {
    config: RiskConfig,
}

impl RiskEngine {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Rank users by standardized score, highest first; ties go to the
    /// lexicographically smaller user. Ranks start at 1.
    pub fn rank(
        &self,
        users: &[String],
        raw_scores: &[f64],
        threshold: Option<f64>,
        supervised: Option<&[f64]>,
    ) -> Vec<RiskResult> {
        let z = StandardScaler::fit_transform(raw_scores);
        let mut results: Vec<RiskResult> = users
            .iter()
            .zip(raw_scores.iter().zip(z))
            .enumerate()
            .map(|(i, (user, (raw, z)))| {
                let anomaly = threshold.is_some_and(|t| *raw >= t);
                let mut level = RiskLevel::from_score(z, &self.config);
                if anomaly {
                    level = level.max(RiskLevel::Medium);
                }
                RiskResult {
                    user: user.clone(),
                    isolation_forest: z,
                    raw_score: *raw,
                    anomaly,
                    random_forest: supervised.and_then(|s| s.get(i).copied()),
                    rank: 0,
                    level,
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.isolation_forest
                .total_cmp(&a.isolation_forest)
                .then_with(|| a.user.cmp(&b.user))
        });
        for (i, r) in results.iter_mut().enumerate() {
            r.rank = i + 1;
        }
        results
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }
}
