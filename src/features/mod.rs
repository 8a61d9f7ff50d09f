//! Per-user behavioral features: temporal, usage, after-hours, e-mail text, network centrality.

mod behavioral;
mod daily;
mod graph;
mod pipeline;

pub use behavioral::UserActivity;
pub use daily::{daily_activity, DailyActivity};
pub use graph::EmailGraph;
pub use pipeline::FeatureExtractor;

use serde::{Deserialize, Serialize};

/// Column order of [`UserFeatures::to_vector`]
pub const FEATURE_NAMES: [&str; 13] = [
    "mean_logon_hour",
    "last_logon_hour",
    "logons_per_day",
    "files_per_day",
    "usb_per_day",
    "emails_per_day",
    "after_hours_logons",
    "degree_centrality",
    "betweenness_centrality",
    "mean_subject_len",
    "keyword_rate",
    "mean_recipients",
    "active_days",
];

/// One model input row per user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserFeatures {
    pub user: String,
    pub mean_logon_hour: f64,
    pub last_logon_hour: f64,
    pub logons_per_day: f64,
    pub files_per_day: f64,
    pub usb_per_day: f64,
    pub emails_per_day: f64,
    pub after_hours_logons: f64,
    pub degree_centrality: f64,
    pub betweenness_centrality: f64,
    pub mean_subject_len: f64,
    pub keyword_rate: f64,
    pub mean_recipients: f64,
    pub active_days: f64,
}

impl UserFeatures {
    pub fn to_vector(&self) -> Vec<f64> {
        vec![
            self.mean_logon_hour,
            self.last_logon_hour,
            self.logons_per_day,
            self.files_per_day,
            self.usb_per_day,
            self.emails_per_day,
            self.after_hours_logons,
            self.degree_centrality,
            self.betweenness_centrality,
            self.mean_subject_len,
            self.keyword_rate,
            self.mean_recipients,
            self.active_days,
        ]
    }
}

/// Feature rows sorted by user
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureTable {
    pub rows: Vec<UserFeatures>,
}

impl FeatureTable {
    pub fn names(&self) -> &'static [&'static str] {
        &FEATURE_NAMES
    }

    pub fn matrix(&self) -> Vec<Vec<f64>> {
        self.rows.iter().map(UserFeatures::to_vector).collect()
    }

    pub fn users(&self) -> Vec<String> {
        self.rows.iter().map(|r| r.user.clone()).collect()
    }

    pub fn get(&self, user: &str) -> Option<&UserFeatures> {
        self.rows
            .binary_search_by(|r| r.user.as_str().cmp(user))
            .ok()
            .map(|i| &self.rows[i])
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
