//! Per-user, per-day activity counts for trend inspection.

use crate::ingest::{LogSet, LogSource};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyActivity {
    /// ISO date, `YYYY-MM-DD`
    pub date: String,
    pub logons: u32,
    pub files: u32,
    pub usb: u32,
    pub emails: u32,
    pub activity_count: u32,
    pub mean_risk: f64,
    pub anomaly: bool,
    pub user: String,
}

/// Outer-joined daily counts for `user`, ordered by date. Days whose total
/// activity sits more than `anomaly_z` standard deviations above the user's
/// mean are flagged.
pub fn daily_activity(logs: &LogSet, user: &str, mean_risk: f64, anomaly_z: f64) -> Vec<DailyActivity> {
    let mut days: BTreeMap<NaiveDate, [u32; 4]> = BTreeMap::new();
    for (slot, source) in LogSource::ALL.iter().enumerate() {
        for r in logs.records(*source).iter().filter(|r| r.user == user) {
            if let Some(date) = r.date() {
                days.entry(date).or_insert([0; 4])[slot] += 1;
            }
        }
    }

    let totals: Vec<f64> = days.values().map(|c| c.iter().sum::<u32>() as f64).collect();
    let cutoff = anomaly_cutoff(&totals, anomaly_z);

    days.into_iter()
        .map(|(date, [logons, device, emails, files])| {
            let activity_count = logons + device + emails + files;
            DailyActivity {
                date: date.format("%Y-%m-%d").to_string(),
                logons,
                files,
                usb: device,
                emails,
                activity_count,
                mean_risk,
                anomaly: cutoff.is_some_and(|c| activity_count as f64 > c),
                user: user.to_string(),
            }
        })
        .collect()
}

fn anomaly_cutoff(totals: &[f64], z: f64) -> Option<f64> {
    if totals.len() < 2 {
        return None;
    }
    let n = totals.len() as f64;
    let mean = totals.iter().sum::<f64>() / n;
    let var = totals.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt();
    if std == 0.0 {
        return None;
    }
    Some(mean + z * std)
}
