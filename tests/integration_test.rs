//! Integration test: config load, CSV ingestion, features, models, ranking, storage, dashboard.

mod common;

use common::{fixture_config, write, NORMAL_USERS, OUTLIER};
use insider_threat::{
    config::{AppConfig, IsolationForestConfig, RandomForestConfig, RiskConfig},
    dashboard,
    features::{daily_activity, FeatureExtractor},
    ingest::{discover, read_source, LogSet, LogSource, RecordDetail},
    logging::{RankingEvent, StructuredLogger},
    model::{IsolationForest, RandomForest},
    pipeline::{train_and_store, warm_start, warm_start_or_untrained, ThreatPipeline},
    risk::{RiskEngine, RiskLevel},
    storage::SecureStore,
    Error,
};
use std::path::Path;

#[test]
fn config_load_default() {
    let c = AppConfig::load(Path::new("nonexistent.json"));
    assert_eq!(c.model.isolation_forest.n_estimators, 50);
    assert_eq!(c.model.isolation_forest.max_samples, 1000);
    assert_eq!(c.model.isolation_forest.seed, 42);
    assert!((c.model.isolation_forest.contamination - 0.03).abs() < 1e-12);
    assert_eq!(c.server.bind, "127.0.0.1:5000");
    assert!(c.model.labels_path.is_none());
}

#[test]
fn config_partial_file_and_validation() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "ok.json", r#"{"server": {"default_top_n": 5}}"#);
    let c = AppConfig::try_load(&dir.path().join("ok.json")).unwrap();
    assert_eq!(c.server.default_top_n, 5);
    assert_eq!(c.model.isolation_forest.n_estimators, 50);

    write(
        dir.path(),
        "bad.json",
        r#"{"model": {"isolation_forest": {"contamination": 0.9}}}"#,
    );
    let err = AppConfig::try_load(&dir.path().join("bad.json")).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    // Lenient loader falls back to defaults
    let c = AppConfig::load(&dir.path().join("bad.json"));
    assert!((c.model.isolation_forest.contamination - 0.03).abs() < 1e-12);
}

#[test]
fn ingest_normalizes_columns() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "email.csv",
        "Employee,Subject\nalice,Quarterly numbers\n,orphan row\nbob,Password reset\n",
    );
    let rows = read_source(&dir.path().join("email.csv"), LogSource::Email, 100).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].user, "alice");
    assert_eq!(
        rows[0].timestamp.unwrap().format("%Y-%m-%d %H:%M:%S").to_string(),
        "2000-01-01 00:00:00"
    );
    match &rows[0].detail {
        RecordDetail::Email { recipients, subject, .. } => {
            assert_eq!(recipients, &vec!["unknown".to_string()]);
            assert_eq!(subject.as_deref(), Some("Quarterly numbers"));
        }
        other => panic!("unexpected detail {other:?}"),
    }
    let raw = rows[1].to_raw_row();
    assert_eq!(raw["user"], "bob");
    assert_eq!(raw["subject"], "Password reset");
}

#[test]
fn ingest_respects_row_limit_and_missing_sources() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "logon.csv",
        "id,date,user,pc,activity\n1,01/02/2010 07:00:00,a,PC,Logon\n2,01/02/2010 08:00:00,b,PC,Logon\n",
    );
    let mut config = AppConfig::default();
    config.ingest.max_rows = 1;
    let logs = LogSet::load(dir.path(), &config.ingest).unwrap();
    assert_eq!(logs.logon.len(), 1);
    assert!(logs.email.is_empty());
    assert!(logs.device.is_empty());

    let missing = read_source(&dir.path().join("file.csv"), LogSource::File, 10).unwrap();
    assert!(missing.is_empty());
}

#[test]
fn ingest_skips_malformed_rows_and_coerces_bad_timestamps() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "logon.csv",
        "id,date,user,pc,activity\n\
         1,01/02/2010 07:00:00,a,PC,Logon\n\
         2,01/02/2010 08:00:00,b\n\
         3,not a date,c,PC,Logon\n",
    );
    let rows = read_source(&dir.path().join("logon.csv"), LogSource::Logon, 100).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].user, "a");
    assert!(rows[0].timestamp.is_some());
    assert_eq!(rows[1].user, "c");
    assert!(rows[1].timestamp.is_none());
    assert_eq!(rows[1].to_raw_row()["timestamp"], serde_json::Value::Null);
}

#[test]
fn discover_finds_nested_sources() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("cert").join("r4.2");
    std::fs::create_dir_all(&nested).unwrap();
    write(&nested, "Logon.CSV", "user\na\n");
    write(dir.path(), "email.csv", "user\na\n");
    write(dir.path(), "notes.csv", "user\na\n");

    let found = discover(dir.path(), 3);
    assert_eq!(found.len(), 2);
    assert_eq!(found[&LogSource::Logon], nested.join("Logon.CSV"));
    assert!(discover(dir.path(), 1).get(&LogSource::Logon).is_none());
}

#[test]
fn features_from_fixture() {
    let (_dir, config) = fixture_config();
    let logs = LogSet::load(&config.data_dir, &config.ingest).unwrap();
    assert_eq!(logs.users().len(), 6);

    let table = FeatureExtractor::new(config.features.clone()).extract(&logs);
    // Recipients are graph nodes only
    assert_eq!(table.len(), 6);
    assert!(table.get("ext@rival.com").is_none());

    let m = table.get(OUTLIER).unwrap();
    assert_eq!(m.after_hours_logons, 3.0);
    assert_eq!(m.mean_logon_hour, 2.0);
    assert_eq!(m.last_logon_hour, 2.0);
    assert_eq!(m.files_per_day, 10.0);
    assert_eq!(m.usb_per_day, 4.0);
    assert_eq!(m.emails_per_day, 1.0);
    assert_eq!(m.keyword_rate, 1.0);
    assert_eq!(m.mean_recipients, 2.0);
    assert!((m.degree_centrality - 1.0).abs() < 1e-12);

    let a = table.get("alice").unwrap();
    assert_eq!(a.after_hours_logons, 0.0);
    assert_eq!(a.mean_logon_hour, 9.0);
    assert_eq!(a.files_per_day, 1.0);
    assert_eq!(a.degree_centrality, 0.0);
    assert_eq!(a.active_days, 3.0);
    assert_eq!(a.to_vector().len(), table.names().len());
}

#[test]
fn isolation_forest_scores_outlier_highest() {
    let mut data: Vec<Vec<f64>> = (0..60)
        .map(|i| vec![(i % 7) as f64 * 0.1, (i % 5) as f64 * 0.1])
        .collect();
    data.push(vec![50.0, -40.0]);
    let mut forest = IsolationForest::new(IsolationForestConfig::default());
    forest.fit(&data).unwrap();
    let scores: Vec<f64> = data.iter().map(|r| forest.score_samples(r).unwrap()).collect();
    let top = scores
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap();
    assert_eq!(top, data.len() - 1);
    assert!(forest.is_anomaly(scores[top]));
    assert!(scores.iter().all(|s| *s > 0.0 && *s <= 1.0));
}

#[test]
fn isolation_forest_is_deterministic_per_seed() {
    let data: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64, (i * i) as f64]).collect();
    let mut a = IsolationForest::new(IsolationForestConfig::default());
    let mut b = IsolationForest::new(IsolationForestConfig::default());
    a.fit(&data).unwrap();
    b.fit(&data).unwrap();
    for row in &data {
        assert_eq!(a.score_samples(row).unwrap(), b.score_samples(row).unwrap());
    }
}

#[test]
fn untrained_forest_refuses_to_score() {
    let forest = IsolationForest::new(IsolationForestConfig::default());
    assert!(matches!(
        forest.score_samples(&[1.0]),
        Err(Error::InsufficientData(_))
    ));
}

#[test]
fn random_forest_separates_classes() {
    let mut x = Vec::new();
    let mut y = Vec::new();
    for i in 0..20 {
        x.push(vec![-(i as f64) - 1.0, 0.5]);
        y.push(false);
        x.push(vec![i as f64 + 10.0, 0.5]);
        y.push(true);
    }
    let mut rf = RandomForest::new(RandomForestConfig::default());
    rf.fit(&x, &y).unwrap();
    assert!(rf.predict_proba(&[25.0, 0.5]) > 0.5);
    assert!(rf.predict_proba(&[-25.0, 0.5]) < 0.5);
    assert_eq!(rf.oob_proba().len(), x.len());

    let mut one_class = RandomForest::new(RandomForestConfig::default());
    assert!(one_class.fit(&x, &vec![false; x.len()]).is_err());
}

#[test]
fn risk_ranking_orders_and_breaks_ties() {
    let engine = RiskEngine::new(RiskConfig::default());
    let users: Vec<String> = ["zed", "amy", "bea", "cal"].iter().map(|s| s.to_string()).collect();
    let ranked = engine.rank(&users, &[0.4, 0.4, 0.9, 0.4], Some(0.8), None);
    let order: Vec<&str> = ranked.iter().map(|r| r.user.as_str()).collect();
    assert_eq!(order, vec!["bea", "amy", "cal", "zed"]);
    assert_eq!(ranked.iter().map(|r| r.rank).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    assert!(ranked[0].anomaly);
    assert!(ranked[0].level >= RiskLevel::Medium);
    assert!(!ranked[1].anomaly);
    assert!(ranked.iter().all(|r| r.random_forest.is_none()));
}

#[test]
fn pipeline_requires_loaded_features() {
    let mut p = ThreatPipeline::new(AppConfig::default());
    assert!(matches!(p.train(), Err(Error::NoFeatures)));
    assert!(p.risky_users(10).is_empty());
    assert!(p.snapshot().is_none());
}

#[test]
fn pipeline_ranks_outlier_first() {
    let (_dir, config) = fixture_config();
    let mut p = ThreatPipeline::new(config);
    p.load_data().unwrap();
    p.train().unwrap();

    let top = p.risky_users(3);
    assert_eq!(top.len(), 3);
    assert_eq!(top[0].features.user, OUTLIER);
    assert_eq!(top[0].rank, 1);
    assert!(top[0].anomaly);
    assert_eq!(top[0].level, RiskLevel::High);
    // Identical behavior ties; broken alphabetically
    assert_eq!(top[1].features.user, NORMAL_USERS[0]);
    assert_eq!(top[2].features.user, NORMAL_USERS[1]);
    assert!(top[1].isolation_forest < 0.0);

    let all = p.risky_users(100);
    assert_eq!(all.len(), 6);
    let mean: f64 = all.iter().map(|u| u.isolation_forest).sum::<f64>() / all.len() as f64;
    assert!(mean.abs() < 1e-9);
}

#[test]
fn pipeline_user_queries() {
    let (_dir, config) = fixture_config();
    let mut p = ThreatPipeline::new(config);
    p.load_data().unwrap();
    p.train().unwrap();

    let days = p.user_features(OUTLIER);
    assert_eq!(days.len(), 3);
    assert_eq!(days[0].date, "2010-01-04");
    assert_eq!(days[0].logons, 1);
    assert_eq!(days[0].usb, 4);
    assert_eq!(days[0].emails, 1);
    assert_eq!(days[0].files, 10);
    assert_eq!(days[0].activity_count, 16);
    assert!(days.iter().all(|d| !d.anomaly));
    assert!(days[0].mean_risk > 0.0);

    let raw = p.user_raw(OUTLIER);
    assert_eq!(raw.len(), 4);
    assert_eq!(raw["file"].len(), 30);
    assert_eq!(raw["email"][0]["to"], "ext@rival.com;x@rival.com");

    assert!(p.user_features("nobody").is_empty());
    assert!(p.user_raw("nobody").values().all(Vec::is_empty));
}

#[test]
fn daily_activity_flags_spike() {
    let dir = tempfile::tempdir().unwrap();
    let mut csv = String::from("id,date,user,pc,filename\n");
    for day in 1..=5 {
        csv.push_str(&format!("f{day},01/0{day}/2010 10:00:00,u,PC,a.txt\n"));
    }
    for k in 0..30 {
        csv.push_str(&format!("s{k},01/06/2010 11:00:00,u,PC,b.txt\n"));
    }
    write(dir.path(), "file.csv", &csv);
    let logs = LogSet::load(dir.path(), &AppConfig::default().ingest).unwrap();
    let days = daily_activity(&logs, "u", 0.0, 2.0);
    assert_eq!(days.len(), 6);
    let flagged: Vec<&str> = days.iter().filter(|d| d.anomaly).map(|d| d.date.as_str()).collect();
    assert_eq!(flagged, vec!["2010-01-06"]);
}

#[test]
fn supervised_model_with_labels() {
    let (dir, mut config) = fixture_config();
    let labels = dir.path().join("insiders.csv");
    std::fs::write(&labels, format!("user,insider\n{OUTLIER},1\nalice,0\n")).unwrap();
    config.model.labels_path = Some(labels);
    let mut p = ThreatPipeline::new(config);
    p.load_data().unwrap();
    let ranked = p.train().unwrap();
    assert!(ranked
        .iter()
        .all(|r| r.random_forest.is_some_and(|v| (0.0..=1.0).contains(&v))));
}

#[test]
fn storage_roundtrip_and_wrong_secret() {
    let (dir, config) = fixture_config();
    let path = dir.path().join("snapshots.db");
    let store = SecureStore::open(&path, b"test-secret").unwrap();
    assert!(store.latest_snapshot().unwrap().is_none());

    let mut p = ThreatPipeline::new(config);
    p.load_data().unwrap();
    p.train().unwrap();
    let snap = p.snapshot().unwrap();
    store.save_snapshot(&snap).unwrap();
    let loaded = store.latest_snapshot().unwrap().unwrap();
    assert_eq!(loaded.id, snap.id);
    let users = |s: &insider_threat::Snapshot| s.rankings.iter().map(|r| r.user.clone()).collect::<Vec<_>>();
    assert_eq!(users(&loaded), users(&snap));
    assert_eq!(loaded.features.len(), 6);
    assert_eq!(store.snapshot_count().unwrap(), 1);

    let other = SecureStore::open(&path, b"wrong-secret").unwrap();
    assert!(matches!(other.latest_snapshot(), Err(Error::Crypto(_))));
}

#[test]
fn warm_start_reuses_unchanged_snapshot() {
    let (_dir, config) = fixture_config();
    let store = SecureStore::open(&config.store.path, b"s").unwrap();
    let first = train_and_store(config.clone(), Some(&store)).unwrap();
    let first_id = first.snapshot().unwrap().id;

    let second = warm_start(config, Some(&store)).unwrap();
    assert_eq!(second.snapshot().unwrap().id, first_id);
    assert_eq!(second.user_raw(OUTLIER)["logon"].len(), 3);
    assert_eq!(store.snapshot_count().unwrap(), 1);
}

#[test]
fn warm_start_retrains_when_data_changes() {
    let (_dir, config) = fixture_config();
    let store = SecureStore::open(&config.store.path, b"s").unwrap();
    let first_id = train_and_store(config.clone(), Some(&store))
        .unwrap()
        .snapshot()
        .unwrap()
        .id;

    let logon = config.data_dir.join("logon.csv");
    let mut text = std::fs::read_to_string(&logon).unwrap();
    text.push_str("LX,01/07/2010 09:00:00,frank,PC-7,Logon\n");
    std::fs::write(&logon, text).unwrap();

    let second = warm_start(config, Some(&store)).unwrap();
    assert_ne!(second.snapshot().unwrap().id, first_id);
    assert_eq!(second.user_count(), 7);
    assert_eq!(store.snapshot_count().unwrap(), 2);
}

#[test]
fn warm_start_retrains_when_model_config_changes() {
    let (dir, config) = fixture_config();
    let store = SecureStore::open(&config.store.path, b"s").unwrap();
    let first = train_and_store(config.clone(), Some(&store)).unwrap();
    assert!(first.rankings().iter().all(|r| r.random_forest.is_none()));

    let labels = dir.path().join("insiders.csv");
    std::fs::write(&labels, format!("user,insider\n{OUTLIER},1\n")).unwrap();
    let mut changed = config;
    changed.model.labels_path = Some(labels);
    changed.model.isolation_forest.contamination = 0.5;

    let second = warm_start(changed, Some(&store)).unwrap();
    assert_ne!(second.fingerprint(), first.fingerprint());
    assert_ne!(second.snapshot().unwrap().id, first.snapshot().unwrap().id);
    assert!(second.rankings().iter().all(|r| r.random_forest.is_some()));
    assert_eq!(store.snapshot_count().unwrap(), 2);

    // Unchanged inputs reuse the newest run
    let third = warm_start(second.config().clone(), Some(&store)).unwrap();
    assert_eq!(third.snapshot().unwrap().id, second.snapshot().unwrap().id);
    assert_eq!(store.snapshot_count().unwrap(), 2);
}

#[test]
fn empty_data_dir_starts_untrained() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.data_dir = dir.path().join("data");
    std::fs::create_dir_all(&config.data_dir).unwrap();
    let store = SecureStore::open(&dir.path().join("store.db"), b"s").unwrap();

    assert!(matches!(
        warm_start(config.clone(), Some(&store)),
        Err(Error::InsufficientData(_))
    ));
    let p = warm_start_or_untrained(config, Some(&store)).unwrap();
    assert!(!p.is_trained());
    assert_eq!(p.user_count(), 0);
    assert!(p.risky_users(10).is_empty());
    assert_eq!(store.snapshot_count().unwrap(), 0);
}

#[test]
fn prune_keeps_newest() {
    let (_dir, config) = fixture_config();
    let store = SecureStore::open(&config.store.path, b"s").unwrap();
    let mut last = String::new();
    for _ in 0..3 {
        let p = train_and_store(config.clone(), None).unwrap();
        let snap = p.snapshot().unwrap();
        last = snap.id.clone();
        store.save_snapshot(&snap).unwrap();
    }
    assert_eq!(store.prune_keep(1).unwrap(), 2);
    assert_eq!(store.latest_snapshot().unwrap().unwrap().id, last);
}

#[test]
fn ranking_events_are_ndjson() {
    let (_dir, config) = fixture_config();
    let p = train_and_store(config, None).unwrap();
    let mut out = Vec::new();
    for r in p.rankings() {
        StructuredLogger::emit_json(&RankingEvent::from_result(r), &mut out).unwrap();
    }
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<serde_json::Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[0]["kind"], "risk_ranking");
    assert_eq!(lines[0]["user"], OUTLIER);
    assert_eq!(lines[0]["risk_level"], "high");
    assert!(lines[0].get("insider_probability").is_none());
}

struct BrokenPipe;

impl std::io::Write for BrokenPipe {
    fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
        Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn ranking_event_write_failure_is_reported() {
    let (_dir, config) = fixture_config();
    let p = train_and_store(config, None).unwrap();
    let event = RankingEvent::from_result(&p.rankings()[0]);
    let err = StructuredLogger::emit_json(&event, &mut BrokenPipe).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
}

#[test]
fn dashboard_renders_pages() {
    assert_eq!(dashboard::render_home(&[]), "No data available yet.\n");

    let (_dir, config) = fixture_config();
    let p = train_and_store(config, None).unwrap();
    let home = dashboard::render_home(&p.risky_users(20));
    assert!(home.contains("Top 5 Risky Users"));
    assert!(home.contains(OUTLIER));
    // Quick-glance table has five rows below the header
    let table_rows = home
        .lines()
        .skip(2)
        .take_while(|l| !l.is_empty())
        .count();
    assert_eq!(table_rows, 5);

    let features = dashboard::render_features(OUTLIER, &p.user_features(OUTLIER));
    assert!(features.contains("2010-01-06"));
    assert!(features.contains("No anomalies detected for this user."));

    let raw = dashboard::render_raw(OUTLIER, &p.user_raw(OUTLIER));
    assert!(raw.contains("FILE"));
    assert!(raw.contains("secret_0.pdf"));
}
