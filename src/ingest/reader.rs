//! CSV reader with header normalization for the CERT-style log sources.

use super::{LogRecord, LogSource, RecordDetail};
use crate::error::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

const USER_ALIASES: [&str; 3] = ["employee", "user_id", "actor"];
const TIMESTAMP_COLUMNS: [&str; 4] = ["timestamp", "date", "time", "sent_time"];
const RECIPIENT_ALIASES: [&str; 3] = ["to", "cc", "bcc"];

/// Stamped on every row of a source that has no timestamp column at all.
pub const DEFAULT_TIMESTAMP: &str = "2000-01-01 00:00:00";

const DATETIME_FORMATS: [&str; 4] = [
    "%m/%d/%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
];
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

/// Parse the timestamp layouts seen in CERT exports and common ISO variants.
/// Returns None instead of failing on anything unrecognized.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(ts);
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.naive_utc());
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(value, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

struct Columns {
    headers: Vec<String>,
    user: Option<usize>,
    timestamp: Option<usize>,
    recipient: Option<usize>,
}

impl Columns {
    fn new(raw: &csv::StringRecord) -> Self {
        let headers: Vec<String> = raw.iter().map(|h| h.trim().to_ascii_lowercase()).collect();
        let find = |name: &str| headers.iter().position(|h| h == name);
        let user = find("user").or_else(|| USER_ALIASES.iter().find_map(|a| find(*a)));
        let timestamp = TIMESTAMP_COLUMNS.iter().find_map(|c| find(*c));
        let recipient = find("recipient").or_else(|| RECIPIENT_ALIASES.iter().find_map(|a| find(*a)));
        Self {
            headers,
            user,
            timestamp,
            recipient,
        }
    }

    fn index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

fn field(record: &csv::StringRecord, idx: Option<usize>) -> Option<String> {
    idx.and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn split_recipients(value: &str) -> Vec<String> {
    value
        .split([';', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn detail_for(source: LogSource, record: &csv::StringRecord, cols: &Columns) -> RecordDetail {
    match source {
        LogSource::Logon => RecordDetail::Logon {
            activity: field(record, cols.index("activity")),
        },
        LogSource::Device => RecordDetail::Device {
            activity: field(record, cols.index("activity")),
        },
        LogSource::Email => {
            let recipients = match cols.recipient {
                Some(_) => field(record, cols.recipient)
                    .map(|v| split_recipients(&v))
                    .unwrap_or_default(),
                None => vec!["unknown".to_string()],
            };
            RecordDetail::Email {
                recipients,
                subject: field(record, cols.index("subject")),
                size: field(record, cols.index("size")).and_then(|v| v.parse().ok()),
                attachments: field(record, cols.index("attachments")).and_then(|v| v.parse().ok()),
            }
        }
        LogSource::File => RecordDetail::File {
            filename: field(record, cols.index("filename")),
        },
    }
}

/// Read up to `max_rows` rows of one source. A missing file yields no rows.
pub fn read_source(path: &Path, source: LogSource, max_rows: usize) -> Result<Vec<LogRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_path(path)?;
    let cols = Columns::new(reader.headers()?);
    let Some(user_idx) = cols.user else {
        warn!(source = source.as_str(), path = %path.display(), "no user column; skipping source");
        return Ok(Vec::new());
    };
    let default_ts = parse_timestamp(DEFAULT_TIMESTAMP);

    let mut out = Vec::new();
    let mut skipped = 0usize;
    for row in reader.records().take(max_rows) {
        let record = match row {
            Ok(r) => r,
            Err(e) => match e.kind() {
                csv::ErrorKind::UnequalLengths { .. } | csv::ErrorKind::Utf8 { .. } => {
                    skipped += 1;
                    continue;
                }
                _ => return Err(e.into()),
            },
        };
        let Some(user) = field(&record, Some(user_idx)) else {
            skipped += 1;
            continue;
        };
        let timestamp = match cols.timestamp {
            Some(i) => record.get(i).and_then(parse_timestamp),
            None => default_ts,
        };
        let columns: BTreeMap<String, String> = cols
            .headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.clone(), v.to_string()))
            .collect();
        out.push(LogRecord {
            id: field(&record, cols.index("id")),
            user,
            timestamp,
            pc: field(&record, cols.index("pc")),
            detail: detail_for(source, &record, &cols),
            columns,
        });
    }
    if skipped > 0 {
        warn!(source = source.as_str(), skipped, "skipped malformed rows");
    }
    debug!(source = source.as_str(), rows = out.len(), "read source");
    Ok(out)
}
