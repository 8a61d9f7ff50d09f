//! End-to-end pipeline: ingest logs → extract features → fit models → rank users.
//! Also answers the per-user queries behind the API.

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::features::{daily_activity, DailyActivity, FeatureExtractor, FeatureTable, UserFeatures};
use crate::ingest::{discover, LogSet, RawRow};
use crate::model::{load_labels, IsolationForest, RandomForest};
use crate::risk::{RiskEngine, RiskLevel, RiskResult};
use crate::storage::SecureStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

/// Ranking row joined with the user's features, as served by `/risky_users`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskyUser {
    #[serde(flatten)]
    pub features: UserFeatures,
    pub isolation_forest: f64,
    pub raw_score: f64,
    pub anomaly: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_forest: Option<f64>,
    pub rank: usize,
    pub level: RiskLevel,
}

/// Persisted result of one training run. Raw logs are not included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub created_at: i64,
    pub fingerprint: String,
    pub features: FeatureTable,
    pub forest: IsolationForest,
    pub supervised: Option<RandomForest>,
    pub rankings: Vec<RiskResult>,
}

fn file_stamp(path: &Path) -> Result<(u64, u128)> {
    let meta = std::fs::metadata(path)?;
    let modified = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    Ok((meta.len(), modified))
}

/// SHA-256 over each discovered source's name, path, size and mtime, the
/// feature/model/risk config sections, and the labels file's size and mtime.
/// A stored run is only reused when this matches.
pub fn fingerprint(config: &AppConfig) -> Result<String> {
    let mut h = Sha256::new();
    for (source, path) in discover(&config.data_dir, config.ingest.search_depth) {
        let (len, modified) = file_stamp(&path)?;
        h.update(source.as_str().as_bytes());
        h.update(path.to_string_lossy().as_bytes());
        h.update(len.to_le_bytes());
        h.update(modified.to_le_bytes());
    }
    h.update(serde_json::to_vec(&config.features)?);
    h.update(serde_json::to_vec(&config.model)?);
    h.update(serde_json::to_vec(&config.risk)?);
    if let Some(labels) = config.model.labels_path.as_deref().filter(|p| p.exists()) {
        let (len, modified) = file_stamp(labels)?;
        h.update(b"labels");
        h.update(len.to_le_bytes());
        h.update(modified.to_le_bytes());
    }
    Ok(format!("{:x}", h.finalize()))
}

pub struct ThreatPipeline {
    config: AppConfig,
    extractor: FeatureExtractor,
    risk: RiskEngine,
    logs: LogSet,
    features: Option<FeatureTable>,
    forest: Option<IsolationForest>,
    supervised: Option<RandomForest>,
    rankings: Vec<RiskResult>,
    fingerprint: Option<String>,
    run_id: Option<String>,
    trained_at: Option<i64>,
}

impl ThreatPipeline {
    pub fn new(config: AppConfig) -> Self {
        Self {
            extractor: FeatureExtractor::new(config.features.clone()),
            risk: RiskEngine::new(config.risk.clone()),
            config,
            logs: LogSet::default(),
            features: None,
            forest: None,
            supervised: None,
            rankings: Vec::new(),
            fingerprint: None,
            run_id: None,
            trained_at: None,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Read every source under the configured data directory and extract features.
    pub fn load_data(&mut self) -> Result<&FeatureTable> {
        let logs = LogSet::load(&self.config.data_dir, &self.config.ingest)?;
        self.fingerprint = Some(fingerprint(&self.config)?);
        Ok(self.load_logs(logs))
    }

    /// Extract features from an already loaded log set.
    pub fn load_logs(&mut self, logs: LogSet) -> &FeatureTable {
        let table = self.extractor.extract(&logs);
        info!(records = logs.len(), users = table.len(), "features extracted");
        self.logs = logs;
        self.forest = None;
        self.supervised = None;
        self.rankings.clear();
        self.features.insert(table)
    }

    /// Fit the isolation forest (and the random forest when labels exist), then rank users.
    pub fn train(&mut self) -> Result<&[RiskResult]> {
        let features = self.features.as_ref().ok_or(Error::NoFeatures)?;
        if features.is_empty() {
            return Err(Error::InsufficientData("no users in loaded logs".into()));
        }
        let users = features.users();
        let matrix = features.matrix();

        let mut forest = IsolationForest::new(self.config.model.isolation_forest.clone());
        forest.fit(&matrix)?;
        let scores = matrix
            .iter()
            .map(|row| forest.score_samples(row))
            .collect::<Result<Vec<f64>>>()?;

        let supervised = self.fit_supervised(&users, &matrix)?;
        let rankings = self.risk.rank(
            &users,
            &scores,
            forest.threshold(),
            supervised.as_ref().map(|rf| rf.oob_proba()),
        );

        let anomalies = rankings.iter().filter(|r| r.anomaly).count();
        info!(
            users = users.len(),
            anomalies,
            supervised = supervised.is_some(),
            "model trained"
        );
        self.forest = Some(forest);
        self.supervised = supervised;
        self.rankings = rankings;
        self.run_id = Some(Uuid::new_v4().to_string());
        self.trained_at = Some(Utc::now().timestamp_millis());
        Ok(&self.rankings)
    }

    fn fit_supervised(&self, users: &[String], matrix: &[Vec<f64>]) -> Result<Option<RandomForest>> {
        let Some(path) = self.config.model.labels_path.as_deref() else {
            return Ok(None);
        };
        if !path.exists() {
            warn!(path = %path.display(), "labels file not found; skipping random forest");
            return Ok(None);
        }
        let insiders = load_labels(path)?;
        let labels: Vec<bool> = users.iter().map(|u| insiders.contains(u)).collect();
        let mut rf = RandomForest::new(self.config.model.random_forest.clone());
        match rf.fit(matrix, &labels) {
            Ok(()) => Ok(Some(rf)),
            Err(Error::InsufficientData(reason)) => {
                warn!(%reason, "random forest not trained");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn is_trained(&self) -> bool {
        self.forest.is_some()
    }

    pub fn features(&self) -> Option<&FeatureTable> {
        self.features.as_ref()
    }

    pub fn rankings(&self) -> &[RiskResult] {
        &self.rankings
    }

    pub fn logs(&self) -> &LogSet {
        &self.logs
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    pub fn user_count(&self) -> usize {
        self.features.as_ref().map_or(0, FeatureTable::len)
    }

    /// Top `top_n` users by standardized score. Empty before training.
    pub fn risky_users(&self, top_n: usize) -> Vec<RiskyUser> {
        let Some(features) = self.features.as_ref() else {
            return Vec::new();
        };
        self.rankings
            .iter()
            .take(top_n)
            .filter_map(|r| {
                features.get(&r.user).map(|f| RiskyUser {
                    features: f.clone(),
                    isolation_forest: r.isolation_forest,
                    raw_score: r.raw_score,
                    anomaly: r.anomaly,
                    random_forest: r.random_forest,
                    rank: r.rank,
                    level: r.level,
                })
            })
            .collect()
    }

    /// Per-day activity for one user, stamped with the user's standardized score.
    pub fn user_features(&self, user: &str) -> Vec<DailyActivity> {
        let mean_risk = self
            .rankings
            .iter()
            .find(|r| r.user == user)
            .map_or(0.0, |r| r.isolation_forest);
        daily_activity(&self.logs, user, mean_risk, self.config.features.daily_anomaly_z)
    }

    /// The user's raw rows, keyed by source.
    pub fn user_raw(&self, user: &str) -> BTreeMap<String, Vec<RawRow>> {
        self.logs.raw_for_user(user)
    }

    /// Persistable form of the current training run; None before training.
    pub fn snapshot(&self) -> Option<Snapshot> {
        Some(Snapshot {
            id: self.run_id.clone()?,
            created_at: self.trained_at?,
            fingerprint: self.fingerprint.clone().unwrap_or_default(),
            features: self.features.clone()?,
            forest: self.forest.clone()?,
            supervised: self.supervised.clone(),
            rankings: self.rankings.clone(),
        })
    }

    /// Adopt a stored training run. Raw logs are re-read from the data directory.
    pub fn restore(&mut self, snapshot: Snapshot) -> Result<()> {
        self.logs = LogSet::load(&self.config.data_dir, &self.config.ingest)?;
        self.fingerprint = Some(snapshot.fingerprint);
        self.features = Some(snapshot.features);
        self.forest = Some(snapshot.forest);
        self.supervised = snapshot.supervised;
        self.rankings = snapshot.rankings;
        self.run_id = Some(snapshot.id);
        self.trained_at = Some(snapshot.created_at);
        info!(users = self.user_count(), "restored trained snapshot");
        Ok(())
    }
}

/// Load, train and persist a fresh run.
pub fn train_and_store(config: AppConfig, store: Option<&SecureStore>) -> Result<ThreatPipeline> {
    let mut pipeline = ThreatPipeline::new(config);
    pipeline.load_data()?;
    pipeline.train()?;
    if let (Some(store), Some(snapshot)) = (store, pipeline.snapshot()) {
        store.save_snapshot(&snapshot)?;
        let pruned = store.prune_keep(pipeline.config.store.keep.max(1))?;
        info!(snapshot = %snapshot.id, pruned, "snapshot saved");
    }
    Ok(pipeline)
}

/// Reuse the latest stored run when its [`fingerprint`] still matches; otherwise retrain.
pub fn warm_start(config: AppConfig, store: Option<&SecureStore>) -> Result<ThreatPipeline> {
    if let Some(store) = store {
        let current = fingerprint(&config)?;
        match store.latest_snapshot() {
            Ok(Some(snapshot)) if snapshot.fingerprint == current => {
                let mut pipeline = ThreatPipeline::new(config);
                pipeline.restore(snapshot)?;
                return Ok(pipeline);
            }
            Ok(Some(_)) => info!("data changed since last snapshot; retraining"),
            Ok(None) => info!("no stored snapshot; training"),
            Err(e) => warn!(error = %e, "could not read stored snapshot; retraining"),
        }
    }
    train_and_store(config, store)
}

/// [`warm_start`] for long-running services: with no users to train on, start
/// untrained so `/refresh` can pick up data added later.
pub fn warm_start_or_untrained(config: AppConfig, store: Option<&SecureStore>) -> Result<ThreatPipeline> {
    match warm_start(config.clone(), store) {
        Err(Error::InsufficientData(reason)) => {
            warn!(%reason, dir = %config.data_dir.display(), "no training data; starting untrained");
            let mut pipeline = ThreatPipeline::new(config);
            pipeline.load_data()?;
            Ok(pipeline)
        }
        other => other,
    }
}
