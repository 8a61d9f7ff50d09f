//! JSON log lines: one JSON object per line (ndjson) for ingestion and audit.

use crate::risk::RiskResult;
use chrono::Utc;
use serde::Serialize;
use std::io::{self, Write};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// One ranked user as an audit line
#[derive(Serialize)]
pub struct RankingEvent<'a> {
    pub ts: String,
    pub kind: &'a str,
    pub user: &'a str,
    pub rank: usize,
    pub risk_score: f64,
    pub risk_level: &'a str,
    pub anomaly: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insider_probability: Option<f64>,
}

impl<'a> RankingEvent<'a> {
    pub fn from_result(r: &'a RiskResult) -> Self {
        Self {
            ts: Utc::now().to_rfc3339(),
            kind: "risk_ranking",
            user: &r.user,
            rank: r.rank,
            risk_score: r.isolation_forest,
            risk_level: r.level.as_str(),
            anomaly: r.anomaly,
            insider_probability: r.random_forest,
        }
    }
}

/// Initialize tracing with JSON format (one JSON object per line)
pub struct StructuredLogger;

impl StructuredLogger {
    /// Install global subscriber, level from RUST_LOG or default. Logs go to
    /// stderr so command output on stdout stays machine-readable.
    pub fn init(json: bool, default_level: &str) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        if json {
            let fmt = tracing_subscriber::fmt::layer()
                .json()
                .with_span_events(FmtSpan::NONE)
                .with_writer(std::io::stderr);
            let _ = tracing_subscriber::registry().with(filter).with(fmt).try_init();
        } else {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .try_init();
        }
    }

    /// Emit a single structured line without going through tracing
    pub fn emit_json(event: &impl Serialize, w: &mut impl Write) -> io::Result<()> {
        serde_json::to_writer(&mut *w, event)?;
        w.write_all(b"\n")
    }
}
