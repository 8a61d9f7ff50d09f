//! Per-user activity accumulation over all four log sources.

use crate::config::FeaturesConfig;
use crate::ingest::{LogRecord, RecordDetail};
use chrono::NaiveDate;
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct UserActivity {
    /// Hours of the user's logon-source events
    pub logon_hours: Vec<u32>,
    pub logon_count: u32,
    pub file_count: u32,
    pub usb_count: u32,
    pub email_count: u32,
    /// E-mail rows regardless of timestamp
    pub email_records: u32,
    pub after_hours: u32,
    pub active_dates: HashSet<NaiveDate>,
    pub subject_lens: Vec<usize>,
    pub keyword_hits: u32,
    pub recipient_total: u64,
}

impl UserActivity {
    /// Fold one record into the accumulator. Records without a parsed timestamp
    /// still contribute e-mail text features but no counts or hours.
    pub fn observe(&mut self, record: &LogRecord, config: &FeaturesConfig) {
        if let Some(date) = record.date() {
            self.active_dates.insert(date);
        }
        let timed = record.timestamp.is_some();
        match &record.detail {
            RecordDetail::Logon { .. } => {
                if let Some(hour) = record.hour() {
                    self.logon_hours.push(hour);
                    if is_after_hours(hour, config) {
                        self.after_hours += 1;
                    }
                }
                if timed {
                    self.logon_count += 1;
                }
            }
            RecordDetail::Device { .. } => {
                if timed {
                    self.usb_count += 1;
                }
            }
            RecordDetail::File { .. } => {
                if timed {
                    self.file_count += 1;
                }
            }
            RecordDetail::Email {
                recipients,
                subject,
                ..
            } => {
                if timed {
                    self.email_count += 1;
                }
                self.email_records += 1;
                self.recipient_total += recipients.len() as u64;
                if let Some(s) = subject {
                    self.subject_lens.push(s.chars().count());
                    if contains_keyword(s, &config.keywords) {
                        self.keyword_hits += 1;
                    }
                }
            }
        }
    }

    pub fn active_days(&self) -> usize {
        self.active_dates.len()
    }

    pub fn mean_logon_hour(&self) -> f64 {
        mean(self.logon_hours.iter().map(|h| *h as f64))
    }

    pub fn last_logon_hour(&self) -> f64 {
        self.logon_hours.iter().max().copied().unwrap_or(0) as f64
    }

    /// Events per active day for one source count
    pub fn per_day(&self, count: u32) -> f64 {
        count as f64 / self.active_days().max(1) as f64
    }

    pub fn mean_subject_len(&self) -> f64 {
        mean(self.subject_lens.iter().map(|l| *l as f64))
    }

    /// Share of the user's e-mails whose subject carries a keyword
    pub fn keyword_rate(&self) -> f64 {
        if self.email_records == 0 {
            0.0
        } else {
            self.keyword_hits as f64 / self.email_records as f64
        }
    }

    pub fn mean_recipients(&self) -> f64 {
        if self.email_records == 0 {
            0.0
        } else {
            self.recipient_total as f64 / self.email_records as f64
        }
    }
}

pub(crate) fn is_after_hours(hour: u32, config: &FeaturesConfig) -> bool {
    hour < config.after_hours_end || hour >= config.after_hours_start
}

fn contains_keyword(subject: &str, keywords: &[String]) -> bool {
    let lower = subject.to_lowercase();
    keywords
        .iter()
        .any(|k| !k.is_empty() && lower.contains(&k.to_lowercase()))
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}
