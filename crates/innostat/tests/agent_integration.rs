//! Integration tests wiring agent configuration into the core poller.

use chrono::{NaiveDate, NaiveDateTime};
use innostat::mysql::{decode_row, FetchColumns};
use innostat::{ConfigOverrides, PollConfig};
use innostat_core::{FakeMetricSource, MetricStore, Poller, SourceRow, UnresolvedPolicy};

fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .expect("valid timestamp")
}

fn status_columns(name: &str, value: &str) -> FetchColumns {
    (
        "status".to_string(),
        None,
        name.to_string(),
        None,
        None,
        Some(value.to_string()),
        Some("2024-03-01 12:00:00".to_string()),
        None,
    )
}

#[tokio::test]
async fn test_config_drives_poller_against_on_disk_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config_path = dir.path().join("innostat.toml");
    let db_path = dir.path().join("metrics.db");
    std::fs::write(
        &config_path,
        format!(
            "json = true\nunresolved = \"skip\"\ndatabase = {:?}\n",
            db_path.display().to_string()
        ),
    )
    .expect("write config");

    let config = PollConfig::resolve(Some(&config_path), ConfigOverrides::default()).expect("config");
    assert_eq!(config.unresolved, UnresolvedPolicy::Skip);

    let rows: Vec<SourceRow> = [status_columns("Uptime", "120"), status_columns("Questions", "9")]
        .into_iter()
        .filter_map(decode_row)
        .collect();
    let mut source = FakeMetricSource::new();
    source.set_rows(rows);

    let store = MetricStore::open(&config.database).expect("open store");
    let mut poller = Poller::with_output(source, store, config.poller_options(), Vec::new());
    let report = poller.poll_once().await.expect("poll");

    assert_eq!(report.written, 2);
    assert_eq!(String::from_utf8_lossy(poller.output()).lines().count(), 1);
    assert!(db_path.exists());
}

#[tokio::test]
async fn test_decoded_engine_rows_follow_status_gate() {
    let enabled: FetchColumns = (
        "engine".to_string(),
        Some("lock".to_string()),
        "waits".to_string(),
        Some("counter".to_string()),
        Some("enabled".to_string()),
        Some("5".to_string()),
        Some("2024-03-01 12:00:00".to_string()),
        Some(2),
    );
    let mut disabled = enabled.clone();
    disabled.2 = "timeouts".to_string();
    disabled.4 = Some("disabled".to_string());

    let rows: Vec<SourceRow> = [enabled, disabled].into_iter().filter_map(decode_row).collect();
    assert_eq!(rows.len(), 2);

    let store = MetricStore::open_in_memory().expect("open store");
    let mut poller = Poller::with_output(
        FakeMetricSource::new().with_row(rows[0].clone()).with_row(rows[1].clone()),
        store,
        PollConfig::default().poller_options(),
        Vec::new(),
    );
    let report = poller.poll_once().await.expect("poll");
    assert_eq!(report.fetched, 1);
    assert_eq!(poller.store().metric_count().expect("count"), 2);

    let id = poller
        .catalog()
        .and_then(|c| c.resolve(&innostat_core::MetricName::new("lock.waits.counter").expect("name")))
        .expect("id");
    let stored = poller.store().measurements_for(id).expect("query");
    assert_eq!(stored[0].timestamp, t0() + chrono::TimeDelta::seconds(2));
}
