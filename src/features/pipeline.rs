//! Feature extraction pipeline: log set → per-user activity → feature table.

use super::{EmailGraph, FeatureTable, UserActivity, UserFeatures};
use crate::config::FeaturesConfig;
use crate::ingest::{LogSet, LogSource};
use std::collections::BTreeMap;
use tracing::debug;

pub struct FeatureExtractor {
    config: FeaturesConfig,
}

impl FeatureExtractor {
    pub fn new(config: FeaturesConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeaturesConfig {
        &self.config
    }

    /// One row per user seen in any source. Recipients that never appear as a
    /// log user shape the graph metrics but get no row.
    pub fn extract(&self, logs: &LogSet) -> FeatureTable {
        let mut activity: BTreeMap<String, UserActivity> = BTreeMap::new();
        for source in LogSource::ALL {
            for r in logs.records(source) {
                activity
                    .entry(r.user.clone())
                    .or_default()
                    .observe(r, &self.config);
            }
        }

        let graph = EmailGraph::from_records(&logs.email);
        let degree = graph.degree_centrality();
        let betweenness = if self.config.betweenness {
            graph.betweenness_centrality()
        } else {
            Default::default()
        };
        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "email graph built"
        );

        let rows = activity
            .into_iter()
            .map(|(user, a)| UserFeatures {
                mean_logon_hour: a.mean_logon_hour(),
                last_logon_hour: a.last_logon_hour(),
                logons_per_day: a.per_day(a.logon_count),
                files_per_day: a.per_day(a.file_count),
                usb_per_day: a.per_day(a.usb_count),
                emails_per_day: a.per_day(a.email_count),
                after_hours_logons: a.after_hours as f64,
                degree_centrality: degree.get(&user).copied().unwrap_or(0.0),
                betweenness_centrality: betweenness.get(&user).copied().unwrap_or(0.0),
                mean_subject_len: a.mean_subject_len(),
                keyword_rate: a.keyword_rate(),
                mean_recipients: a.mean_recipients(),
                active_days: a.active_days() as f64,
                user,
            })
            .collect();
        FeatureTable { rows }
    }
}
