//! Multi-source activity log ingestion: logon, device, email, file.
//! Each CSV is normalized into [`LogRecord`]s with a canonical user and timestamp.

mod discover;
mod reader;

pub use discover::discover;
pub use reader::{parse_timestamp, read_source, DEFAULT_TIMESTAMP};

use crate::config::IngestConfig;
use crate::error::Result;
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::info;

/// A raw row as exported to the API: every column plus normalized `user` and `timestamp`.
pub type RawRow = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSource {
    Logon,
    Device,
    Email,
    File,
}

impl LogSource {
    pub const ALL: [LogSource; 4] = [
        LogSource::Logon,
        LogSource::Device,
        LogSource::Email,
        LogSource::File,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogSource::Logon => "logon",
            LogSource::Device => "device",
            LogSource::Email => "email",
            LogSource::File => "file",
        }
    }

    pub fn file_stem(&self) -> &'static str {
        self.as_str()
    }

    pub fn file_name(&self) -> String {
        format!("{}.csv", self.file_stem())
    }
}

/// One normalized row from one source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: Option<String>,
    pub user: String,
    /// None when the source value could not be parsed
    pub timestamp: Option<NaiveDateTime>,
    pub pc: Option<String>,
    pub detail: RecordDetail,
    /// Every raw column keyed by lower-cased header
    pub columns: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordDetail {
    Logon {
        activity: Option<String>,
    },
    Device {
        activity: Option<String>,
    },
    Email {
        recipients: Vec<String>,
        subject: Option<String>,
        size: Option<u64>,
        attachments: Option<u32>,
    },
    File {
        filename: Option<String>,
    },
}

impl LogRecord {
    pub fn date(&self) -> Option<NaiveDate> {
        self.timestamp.map(|ts| ts.date())
    }

    pub fn hour(&self) -> Option<u32> {
        self.timestamp.map(|ts| ts.hour())
    }

    pub fn source(&self) -> LogSource {
        match self.detail {
            RecordDetail::Logon { .. } => LogSource::Logon,
            RecordDetail::Device { .. } => LogSource::Device,
            RecordDetail::Email { .. } => LogSource::Email,
            RecordDetail::File { .. } => LogSource::File,
        }
    }

    pub fn to_raw_row(&self) -> RawRow {
        let mut row: RawRow = self
            .columns
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        row.insert("user".into(), serde_json::Value::String(self.user.clone()));
        let ts = match self.timestamp {
            Some(ts) => serde_json::Value::String(ts.format("%Y-%m-%d %H:%M:%S").to_string()),
            None => serde_json::Value::Null,
        };
        row.insert("timestamp".into(), ts);
        row
    }
}

/// All four sources loaded from one data directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogSet {
    pub logon: Vec<LogRecord>,
    pub device: Vec<LogRecord>,
    pub email: Vec<LogRecord>,
    pub file: Vec<LogRecord>,
}

impl LogSet {
    /// Discover and read every source under `data_dir`. Missing sources load as empty.
    pub fn load(data_dir: &Path, config: &IngestConfig) -> Result<Self> {
        let paths = discover(data_dir, config.search_depth);
        let mut set = LogSet::default();
        for source in LogSource::ALL {
            let records = match paths.get(&source) {
                Some(path) => read_source(path, source, config.max_rows)?,
                None => {
                    tracing::warn!(source = source.as_str(), dir = %data_dir.display(), "source file not found");
                    Vec::new()
                }
            };
            info!(source = source.as_str(), rows = records.len(), "loaded log source");
            *set.records_mut(source) = records;
        }
        Ok(set)
    }

    pub fn records(&self, source: LogSource) -> &[LogRecord] {
        match source {
            LogSource::Logon => &self.logon,
            LogSource::Device => &self.device,
            LogSource::Email => &self.email,
            LogSource::File => &self.file,
        }
    }

    fn records_mut(&mut self, source: LogSource) -> &mut Vec<LogRecord> {
        match source {
            LogSource::Logon => &mut self.logon,
            LogSource::Device => &mut self.device,
            LogSource::Email => &mut self.email,
            LogSource::File => &mut self.file,
        }
    }

    pub fn push(&mut self, record: LogRecord) {
        let source = record.source();
        self.records_mut(source).push(record);
    }

    pub fn len(&self) -> usize {
        LogSource::ALL.iter().map(|s| self.records(*s).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted, de-duplicated users across all sources
    pub fn users(&self) -> Vec<String> {
        let mut users = BTreeSet::new();
        for source in LogSource::ALL {
            for r in self.records(source) {
                users.insert(r.user.clone());
            }
        }
        users.into_iter().collect()
    }

    /// Raw rows for one user, keyed by source name. Every source is present.
    pub fn raw_for_user(&self, user: &str) -> BTreeMap<String, Vec<RawRow>> {
        LogSource::ALL
            .iter()
            .map(|source| {
                let rows = self
                    .records(*source)
                    .iter()
                    .filter(|r| r.user == user)
                    .map(LogRecord::to_raw_row)
                    .collect();
                (source.as_str().to_string(), rows)
            })
            .collect()
    }
}
