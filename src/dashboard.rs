//! Terminal dashboard backed by the HTTP API: home, risky users, user features, raw logs.

use crate::config::DashboardConfig;
use crate::error::{Error, Result};
use crate::features::DailyActivity;
use crate::ingest::RawRow;
use crate::pipeline::RiskyUser;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

const BAR_WIDTH: usize = 40;
const RAW_ROW_LIMIT: usize = 200;

pub struct DashboardClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl DashboardClient {
    pub fn new(config: &DashboardConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let res = self.client.get(&url).query(query).send().map_err(|e| self.unreachable(e))?;
        Ok(res.error_for_status()?.json()?)
    }

    fn unreachable(&self, e: reqwest::Error) -> Error {
        if e.is_connect() || e.is_timeout() {
            Error::Config(format!(
                "could not reach backend at {}; is `insider-threat serve` running?",
                self.base_url
            ))
        } else {
            Error::Http(e)
        }
    }

    pub fn risky_users(&self, top_n: Option<usize>) -> Result<Vec<RiskyUser>> {
        match top_n {
            Some(n) => {
                let n = n.to_string();
                self.get("/risky_users", &[("top_n", n.as_str())])
            }
            None => self.get("/risky_users", &[]),
        }
    }

    pub fn user_features(&self, user: &str) -> Result<Vec<DailyActivity>> {
        self.get("/user/features", &[("user", user)])
    }

    pub fn user_raw(&self, user: &str) -> Result<BTreeMap<String, Vec<RawRow>>> {
        self.get("/user/raw", &[("user", user)])
    }

    /// Ask the backend to reload CSVs and retrain.
    pub fn refresh(&self) -> Result<()> {
        let url = format!("{}/refresh", self.base_url);
        self.client
            .post(&url)
            .send()
            .map_err(|e| self.unreachable(e))?
            .error_for_status()?;
        Ok(())
    }
}

fn bar(value: f64, max: f64) -> String {
    if max <= 0.0 || value <= 0.0 {
        return String::new();
    }
    let n = ((value / max) * BAR_WIDTH as f64).round() as usize;
    "█".repeat(n.clamp(1, BAR_WIDTH))
}

fn risk_table(users: &[RiskyUser]) -> String {
    let width = users.iter().map(|u| u.features.user.len()).max().unwrap_or(4).max(4);
    let mut out = String::new();
    let _ = writeln!(out, "{:<width$}  {:>10}  {:>12}  {:<6}", "User", "Mean Risk", "Anomaly Rank", "Level");
    for u in users {
        let _ = writeln!(
            out,
            "{:<width$}  {:>10.3}  {:>12}  {:<6}",
            u.features.user,
            u.isolation_forest,
            u.rank,
            u.level.as_str()
        );
    }
    out
}

fn risk_bars(users: &[RiskyUser], title: &str) -> String {
    let width = users.iter().map(|u| u.features.user.len()).max().unwrap_or(4);
    let max = users.iter().map(|u| u.isolation_forest).fold(0.0, f64::max);
    let mut out = format!("{title}\n");
    for u in users {
        let _ = writeln!(
            out,
            "{:<width$} │{} {:.2} (#{})",
            u.features.user,
            bar(u.isolation_forest, max),
            u.isolation_forest,
            u.rank
        );
    }
    out
}

pub fn render_home(users: &[RiskyUser]) -> String {
    if users.is_empty() {
        return "No data available yet.\n".to_string();
    }
    let top5 = &users[..users.len().min(5)];
    let top10 = &users[..users.len().min(10)];
    format!(
        "Top 5 Risky Users (Quick Glance)\n{}\n{}",
        risk_table(top5),
        risk_bars(top10, "Top 10 Users by Risk Score")
    )
}

pub fn render_risky(users: &[RiskyUser]) -> String {
    if users.is_empty() {
        return "No data available yet. Check the CSVs in the data directory.\n".to_string();
    }
    format!(
        "Top Risky Users\n{}\n{}",
        risk_table(users),
        risk_bars(users, "Risk Scores by User")
    )
}

pub fn render_features(user: &str, days: &[DailyActivity]) -> String {
    if days.is_empty() {
        return "No features available for this user.\n".to_string();
    }
    let mut days = days.to_vec();
    days.sort_by(|a, b| a.date.cmp(&b.date));

    let mut out = format!("User: {user} — Per-day Features\n");
    let _ = writeln!(
        out,
        "{:<10}  {:>6}  {:>5}  {:>4}  {:>6}  {:>8}  {:>9}",
        "date", "logons", "files", "usb", "emails", "activity", "mean_risk"
    );
    for d in &days {
        let _ = writeln!(
            out,
            "{:<10}  {:>6}  {:>5}  {:>4}  {:>6}  {:>8}  {:>9.3}",
            d.date, d.logons, d.files, d.usb, d.emails, d.activity_count, d.mean_risk
        );
    }

    out.push_str("\nAnomaly Timeline\n");
    let anomalous: Vec<&DailyActivity> = days.iter().filter(|d| d.anomaly).collect();
    if anomalous.is_empty() {
        out.push_str("No anomalies detected for this user.\n");
    } else {
        let max = anomalous.iter().map(|d| d.activity_count).max().unwrap_or(0) as f64;
        for d in anomalous {
            let _ = writeln!(
                out,
                "{} │{} {}",
                d.date,
                bar(d.activity_count as f64, max),
                d.activity_count
            );
        }
    }
    out
}

fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub fn render_raw(user: &str, raw: &BTreeMap<String, Vec<RawRow>>) -> String {
    if raw.is_empty() {
        return "No raw logs available for this user.\n".to_string();
    }
    let mut out = format!("Raw logs for {user}\n");
    for (source, rows) in raw {
        let _ = writeln!(out, "\n{} — {} rows", source.to_uppercase(), rows.len());
        let mut sorted: Vec<&RawRow> = rows.iter().collect();
        // Newest first; rows without a timestamp sort last.
        sorted.sort_by(|a, b| {
            let ta = a.get("timestamp").map(value_text).unwrap_or_default();
            let tb = b.get("timestamp").map(value_text).unwrap_or_default();
            tb.cmp(&ta)
        });
        for row in sorted.into_iter().take(RAW_ROW_LIMIT) {
            let line: Vec<String> = row
                .iter()
                .map(|(k, v)| format!("{k}={}", value_text(v)))
                .collect();
            let _ = writeln!(out, "  {}", line.join(" "));
        }
    }
    out
}
