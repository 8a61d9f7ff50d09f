//! Insider threat detection over CERT-style activity logs.
//!
//! Modular structure:
//! - [`ingest`] — Logon, device, email, file CSV ingestion
//! - [`features`] — Per-user temporal, usage, e-mail and graph-centrality features
//! - [`model`] — Isolation forest and random forest scoring
//! - [`risk`] — Standardized scores, ranking, risk levels
//! - [`pipeline`] — Load → extract → train → query
//! - [`storage`] — Encrypted snapshot storage
//! - [`server`] — HTTP API
//! - [`dashboard`] — Terminal dashboard over the API
//! - [`logging`] — Structured JSON logging

pub mod config;
pub mod dashboard;
pub mod error;
pub mod features;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod risk;
pub mod server;
pub mod storage;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use features::{FeatureExtractor, FeatureTable, UserFeatures};
pub use ingest::{LogRecord, LogSet, LogSource};
pub use logging::StructuredLogger;
pub use model::{IsolationForest, RandomForest};
pub use pipeline::{RiskyUser, Snapshot, ThreatPipeline};
pub use risk::RiskEngine;
pub use storage::SecureStore;
