//! Pipeline configuration. Every section has defaults so a missing config file still runs.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Env var consulted for the config path when `--config` is not given.
pub const CONFIG_PATH_ENV: &str = "INSIDER_CONFIG_PATH";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding logon.csv, device.csv, email.csv, file.csv
    pub data_dir: PathBuf,
    /// CSV reading limits
    pub ingest: IngestConfig,
    /// Feature extraction parameters
    pub features: FeaturesConfig,
    /// Isolation forest / random forest parameters
    pub model: ModelConfig,
    /// Risk level thresholds on the standardized score
    pub risk: RiskConfig,
    /// Encrypted snapshot store
    pub store: StoreConfig,
    /// HTTP API
    pub server: ServerConfig,
    /// Terminal dashboard
    pub dashboard: DashboardConfig,
    /// Logging
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Rows read per source file
    pub max_rows: usize,
    /// Directory depth searched for source files
    pub search_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Hour (inclusive) at which after-hours begins
    pub after_hours_start: u32,
    /// Hour (exclusive) at which after-hours ends
    pub after_hours_end: u32,
    /// Subject keywords flagged by the text features
    pub keywords: Vec<String>,
    /// Compute betweenness centrality on the e-mail graph
    pub betweenness: bool,
    /// Daily activity z-score above which a day is marked anomalous
    pub daily_anomaly_z: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub isolation_forest: IsolationForestConfig,
    pub random_forest: RandomForestConfig,
    /// Optional CSV of known insiders; enables the supervised model
    pub labels_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationForestConfig {
    pub n_estimators: usize,
    pub max_samples: usize,
    /// Expected share of anomalous users, in (0, 0.5]
    pub contamination: f64,
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomForestConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Standardized score at or above this is high risk
    pub high_threshold: f64,
    /// Standardized score at or above this is medium risk
    pub medium_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    /// Env var holding the store secret
    pub secret_env: String,
    /// Snapshots retained after each save
    pub keep: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub default_top_n: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub api_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            ingest: IngestConfig::default(),
            features: FeaturesConfig::default(),
            model: ModelConfig::default(),
            risk: RiskConfig::default(),
            store: StoreConfig::default(),
            server: ServerConfig::default(),
            dashboard: DashboardConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_rows: 50_000,
            search_depth: 3,
        }
    }
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            after_hours_start: 20,
            after_hours_end: 6,
            keywords: vec![
                "confidential".to_string(),
                "secret".to_string(),
                "password".to_string(),
            ],
            betweenness: true,
            daily_anomaly_z: 2.0,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            isolation_forest: IsolationForestConfig::default(),
            random_forest: RandomForestConfig::default(),
            labels_path: None,
        }
    }
}

impl Default for IsolationForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 50,
            max_samples: 1000,
            contamination: 0.03,
            seed: 42,
        }
    }
}

impl Default for RandomForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 8,
            min_samples_split: 2,
            seed: 42,
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            high_threshold: 2.0,
            medium_threshold: 1.0,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".insider").join("store.db"),
            secret_env: "INSIDER_STORE_SECRET".to_string(),
            keep: 5,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".to_string(),
            default_top_n: 20,
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:5000".to_string(),
            timeout_secs: 15,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

impl AppConfig {
    /// Load from JSON file if present; otherwise return default
    pub fn load(path: &std::path::Path) -> Self {
        Self::try_load(path).unwrap_or_default()
    }

    /// Like [`AppConfig::load`] but reports unreadable or invalid files.
    /// A missing file is not an error.
    pub fn try_load(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let iforest = &self.model.isolation_forest;
        if !(iforest.contamination > 0.0 && iforest.contamination <= 0.5) {
            return Err(Error::Config(format!(
                "contamination must be in (0, 0.5], got {}",
                iforest.contamination
            )));
        }
        if iforest.n_estimators == 0 {
            return Err(Error::Config("n_estimators must be positive".into()));
        }
        if iforest.max_samples == 0 {
            return Err(Error::Config("max_samples must be positive".into()));
        }
        if self.model.random_forest.n_trees == 0 {
            return Err(Error::Config("random forest n_trees must be positive".into()));
        }
        if self.features.after_hours_start > 24 || self.features.after_hours_end > 24 {
            return Err(Error::Config("after-hours bounds must be within 0..=24".into()));
        }
        Ok(())
    }
}
