mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use chrono::NaiveDate;
use fibermirror::cache::{FetchStatus, SnapshotCache};
use fibermirror::ingest::disk::DiskCache;
use fibermirror::ingest::fetch::HttpArchiveSource;
use fibermirror::ingest::{CycleOutcome, IngestPipeline, PayloadOrigin};
use tempfile::TempDir;

use common::{sample_csv, spawn_archive_server, zip_archive, RecordingAlert, Reply};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn pipeline_for(
    url: String,
    cache: Arc<SnapshotCache>,
    dir: &TempDir,
    alerts: Arc<RecordingAlert>,
    today: NaiveDate,
) -> IngestPipeline {
    let source = HttpArchiveSource::new(url, Duration::from_secs(5)).expect("client should build");
    IngestPipeline::new(cache, DiskCache::new(dir.path()), Arc::new(source), alerts)
        .with_clock(move || today)
}

#[tokio::test]
async fn end_to_end_archive_ingestion_publishes_derived_views() {
    let archive = zip_archive(&[("data_20240115.csv", sample_csv().as_str())]);
    let server = spawn_archive_server(Reply::Archive(archive)).await;
    let dir = TempDir::new().expect("temp dir");
    let cache = Arc::new(SnapshotCache::new());
    let alerts = Arc::new(RecordingAlert::default());
    let pipeline = pipeline_for(server.url(), cache.clone(), &dir, alerts.clone(), date(2024, 1, 16));

    let outcome = pipeline.run_cycle().await;

    assert_eq!(
        outcome,
        CycleOutcome::Published {
            origin: PayloadOrigin::Remote,
            data_date: date(2024, 1, 15),
            records: 2,
        }
    );
    let snapshot = cache.current().expect("snapshot should be published");
    let stats = snapshot.statistics();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.by_provincia.entries(), &[("MILANO".to_string(), 1)]);
    assert_eq!(snapshot.list_entries()[1].lat, 0.0);
    assert_eq!(snapshot.compact_entries()[0].3, 0);
    assert_eq!(snapshot.compact_entries()[1].3, 1);
    assert_eq!(snapshot.raw.data_date, date(2024, 1, 15));
    assert_eq!(snapshot.raw.file_name, "data_20240115.csv");
    assert_eq!(&snapshot.raw.payload[..], sample_csv().as_bytes());

    let stats_json = serde_json::to_value(stats).expect("stats should serialize");
    assert_eq!(stats_json["by_provincia"], serde_json::json!({"MILANO": 1}));

    assert_eq!(cache.status().fetch_status, FetchStatus::Success);
    assert!(alerts.sent().is_empty());
    assert_eq!(pipeline.disk().cached_dates().expect("list cache"), vec![date(2024, 1, 15)]);
}

#[tokio::test]
async fn redirects_are_followed() {
    let archive = zip_archive(&[("data_20240115.csv", sample_csv().as_str())]);
    let server = spawn_archive_server(Reply::Archive(archive)).await;
    let dir = TempDir::new().expect("temp dir");
    let cache = Arc::new(SnapshotCache::new());
    let url = format!("http://{}/moved", server.addr);
    let pipeline = pipeline_for(url, cache.clone(), &dir, Arc::default(), date(2024, 1, 16));

    assert!(pipeline.run_cycle().await.is_published());
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn http_500_without_disk_cache_sets_error_and_alerts_once() {
    let server = spawn_archive_server(Reply::Status(StatusCode::INTERNAL_SERVER_ERROR)).await;
    let dir = TempDir::new().expect("temp dir");
    let cache = Arc::new(SnapshotCache::new());
    let alerts = Arc::new(RecordingAlert::default());
    let pipeline = pipeline_for(server.url(), cache.clone(), &dir, alerts.clone(), date(2024, 1, 16));

    let outcome = pipeline.run_cycle().await;

    assert!(matches!(outcome, CycleOutcome::Failed { .. }));
    let status = cache.status();
    assert_eq!(status.fetch_status, FetchStatus::Error);
    assert!(status.last_error.as_deref().unwrap_or("").contains("HTTP 500"));
    assert!(cache.current().is_none());

    let sent = alerts.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("Failed to fetch/parse data"));
}

#[tokio::test]
async fn failed_cycle_preserves_previous_snapshot() {
    let good = spawn_archive_server(Reply::Archive(zip_archive(&[(
        "data_20240115.csv",
        sample_csv().as_str(),
    )])))
    .await;
    let broken = spawn_archive_server(Reply::Status(StatusCode::INTERNAL_SERVER_ERROR)).await;
    let dir = TempDir::new().expect("temp dir");
    let cache = Arc::new(SnapshotCache::new());
    let alerts = Arc::new(RecordingAlert::default());

    let first = pipeline_for(good.url(), cache.clone(), &dir, alerts.clone(), date(2024, 1, 16));
    assert!(first.run_cycle().await.is_published());
    let before = cache.current().expect("first snapshot");

    let second = pipeline_for(broken.url(), cache.clone(), &dir, alerts.clone(), date(2024, 1, 17));
    assert!(matches!(second.run_cycle().await, CycleOutcome::Failed { .. }));

    let after = cache.current().expect("snapshot should survive failure");
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(cache.status().fetch_status, FetchStatus::Error);
    assert_eq!(alerts.sent().len(), 1);
}

#[tokio::test]
async fn retention_keeps_only_newest_data_date() {
    let dir = TempDir::new().expect("temp dir");
    let disk = DiskCache::new(dir.path());
    for day in 1..=3 {
        disk.store(date(2024, 1, day), b"OLD\n").expect("seed cache file");
    }
    let archive = zip_archive(&[("data_20240103.csv", sample_csv().as_str())]);
    let server = spawn_archive_server(Reply::Archive(archive)).await;
    let cache = Arc::new(SnapshotCache::new());
    let pipeline = pipeline_for(server.url(), cache, &dir, Arc::default(), date(2024, 1, 4));

    assert!(pipeline.run_cycle().await.is_published());

    assert_eq!(disk.cached_dates().expect("list cache"), vec![date(2024, 1, 3)]);
    let kept = disk.load(date(2024, 1, 3)).expect("read cache").expect("file kept");
    assert_eq!(kept.bytes, sample_csv().as_bytes());
}

#[tokio::test]
async fn todays_disk_cache_wins_over_remote() {
    let dir = TempDir::new().expect("temp dir");
    let today = date(2024, 1, 20);
    DiskCache::new(dir.path())
        .store(today, sample_csv().as_bytes())
        .expect("seed cache file");
    let server = spawn_archive_server(Reply::Archive(zip_archive(&[(
        "data_20240121.csv",
        sample_csv().as_str(),
    )])))
    .await;
    let cache = Arc::new(SnapshotCache::new());
    let pipeline = pipeline_for(server.url(), cache.clone(), &dir, Arc::default(), today);

    let outcome = pipeline.run_cycle().await;

    assert_eq!(
        outcome,
        CycleOutcome::Published {
            origin: PayloadOrigin::Disk,
            data_date: today,
            records: 2,
        }
    );
    assert_eq!(server.hits(), 0);
}

#[tokio::test]
async fn unreadable_disk_cache_falls_back_to_remote() {
    let dir = TempDir::new().expect("temp dir");
    let today = date(2024, 1, 20);
    // A directory where the cached file should be makes the read fail with a non-NotFound error.
    std::fs::create_dir(DiskCache::new(dir.path()).path_for(today)).expect("blocker dir");
    let server = spawn_archive_server(Reply::Archive(zip_archive(&[(
        "data_20240119.csv",
        sample_csv().as_str(),
    )])))
    .await;
    let cache = Arc::new(SnapshotCache::new());
    let pipeline = pipeline_for(server.url(), cache.clone(), &dir, Arc::default(), today);

    let outcome = pipeline.run_cycle().await;

    assert!(outcome.is_published());
    assert_eq!(server.hits(), 1);
}
