//! Snapshot cache: the single published dataset plus ingestion status.
//!
//! Constructed once at startup and shared via `Arc` between the ingestion
//! pipeline (the only writer) and the read layer. A [`Snapshot`] is built in
//! full off to the side and installed with one pointer swap, so a reader holding
//! an `Arc<Snapshot>` always sees raw data and derived views from the same cycle.
//! Status updates take a short mutex that never covers any build work.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::data::{CompactEntry, DerivedViews, ListEntry, RawDataset, Record, Statistics};
use crate::error::NotFoundError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    None,
    Fetching,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestionStatus {
    pub fetch_status: FetchStatus,
    pub last_fetch_time: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Default for IngestionStatus {
    fn default() -> Self {
        IngestionStatus {
            fetch_status: FetchStatus::None,
            last_fetch_time: None,
            last_error: None,
        }
    }
}

/// One cycle's raw dataset and everything derived from it.
#[derive(Debug)]
pub struct Snapshot {
    pub raw: RawDataset,
    pub views: DerivedViews,
    /// Set when the snapshot is installed by [`SnapshotCache::publish`].
    pub published_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(raw: RawDataset, views: DerivedViews) -> Self {
        Snapshot {
            raw,
            views,
            published_at: Utc::now(),
        }
    }

    /// Builds the derived views for `raw`.
    pub fn build(raw: RawDataset) -> Self {
        let views = DerivedViews::build(raw.records.clone());
        Self::new(raw, views)
    }

    pub fn records(&self) -> &[Record] {
        &self.raw.records
    }

    pub fn list_entries(&self) -> &[ListEntry] {
        &self.views.list
    }

    pub fn compact_entries(&self) -> &[CompactEntry] {
        &self.views.compact
    }

    pub fn detail(&self, id: usize) -> Result<&Record, NotFoundError> {
        self.views.details.get(id)
    }

    pub fn statistics(&self) -> &Statistics {
        &self.views.statistics
    }
}

/// Status and snapshot read together under the status lock.
#[derive(Debug, Clone)]
pub struct CacheView {
    pub snapshot: Option<Arc<Snapshot>>,
    pub status: IngestionStatus,
}

#[derive(Debug, Default)]
pub struct SnapshotCache {
    current: ArcSwapOption<Snapshot>,
    status: Mutex<IngestionStatus>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn status_guard(&self) -> MutexGuard<'_, IngestionStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Installs `snapshot` in one step and marks the cycle successful. The
    /// snapshot's `published_at` and the status fetch time get the same stamp.
    pub fn publish(&self, mut snapshot: Snapshot) {
        let mut status = self.status_guard();
        let now = Utc::now();
        snapshot.published_at = now;
        self.current.store(Some(Arc::new(snapshot)));
        status.fetch_status = FetchStatus::Success;
        status.last_fetch_time = Some(now);
        status.last_error = None;
    }

    pub fn mark_fetching(&self) {
        self.status_guard().fetch_status = FetchStatus::Fetching;
    }

    /// Records the failure; the last good snapshot stays readable.
    pub fn mark_error(&self, message: impl Into<String>) {
        let mut status = self.status_guard();
        status.fetch_status = FetchStatus::Error;
        status.last_fetch_time = Some(Utc::now());
        status.last_error = Some(message.into());
    }

    /// The published snapshot, if any. Every field read through the returned
    /// handle belongs to the same cycle.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.current.load_full()
    }

    pub fn current_raw(&self) -> Option<RawDataset> {
        self.current().map(|snapshot| snapshot.raw.clone())
    }

    pub fn current_list_entries(&self) -> Vec<ListEntry> {
        self.current()
            .map(|snapshot| snapshot.list_entries().to_vec())
            .unwrap_or_default()
    }

    pub fn current_compact_entries(&self) -> Vec<CompactEntry> {
        self.current()
            .map(|snapshot| snapshot.compact_entries().to_vec())
            .unwrap_or_default()
    }

    pub fn detail_by_id(&self, id: usize) -> Result<Record, NotFoundError> {
        let snapshot = self.current().ok_or(NotFoundError { id })?;
        snapshot.detail(id).cloned()
    }

    pub fn current_statistics(&self) -> Option<Statistics> {
        self.current().map(|snapshot| snapshot.statistics().clone())
    }

    pub fn status(&self) -> IngestionStatus {
        self.status_guard().clone()
    }

    /// Snapshot and status as one consistent pair.
    pub fn view(&self) -> CacheView {
        let status = self.status_guard();
        CacheView {
            snapshot: self.current(),
            status: status.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::parse::parse_records;
    use chrono::NaiveDate;

    fn snapshot(payload: &str, day: u32) -> Snapshot {
        let records = parse_records(payload.as_bytes()).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
        Snapshot::build(RawDataset::new(
            records,
            payload.as_bytes().to_vec(),
            format!("data_202401{day:02}.csv"),
            date,
        ))
    }

    #[test]
    fn empty_cache_reports_no_data() {
        let cache = SnapshotCache::new();
        assert!(cache.current().is_none());
        assert!(cache.current_list_entries().is_empty());
        assert!(cache.current_statistics().is_none());
        assert_eq!(cache.detail_by_id(0), Err(NotFoundError { id: 0 }));
        assert_eq!(cache.status().fetch_status, FetchStatus::None);
    }

    #[test]
    fn publish_sets_success_and_clears_error() {
        let cache = SnapshotCache::new();
        cache.mark_error("boom");
        cache.publish(snapshot("TIPO\nCRO\n", 1));

        let status = cache.status();
        assert_eq!(status.fetch_status, FetchStatus::Success);
        assert!(status.last_error.is_none());
        assert!(status.last_fetch_time.is_some());
        assert_eq!(cache.detail_by_id(0).unwrap().get("TIPO"), Some("CRO"));
        assert!(cache.detail_by_id(1).is_err());
    }

    #[test]
    fn error_and_fetching_keep_last_good_snapshot() {
        let cache = SnapshotCache::new();
        cache.publish(snapshot("TIPO\nCRO\nCNO\n", 2));

        cache.mark_fetching();
        assert_eq!(cache.status().fetch_status, FetchStatus::Fetching);
        cache.mark_error("Failed to fetch/parse data: boom");

        let view = cache.view();
        assert_eq!(view.status.fetch_status, FetchStatus::Error);
        assert_eq!(view.status.last_error.as_deref(), Some("Failed to fetch/parse data: boom"));
        let kept = view.snapshot.expect("previous snapshot should survive");
        assert_eq!(kept.raw.len(), 2);
        assert_eq!(kept.raw.data_date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
    }

    #[test]
    fn held_snapshot_is_unaffected_by_later_publish() {
        let cache = SnapshotCache::new();
        cache.publish(snapshot("TIPO\nCRO\n", 1));
        let held = cache.current().unwrap();
        cache.publish(snapshot("TIPO\nCRO\nCNO\nCNO\n", 2));

        assert_eq!(held.raw.len(), 1);
        assert_eq!(held.statistics().total, 1);
        assert_eq!(cache.current().unwrap().statistics().total, 3);
    }

    #[test]
    fn readers_agree_on_latest_publish() {
        let cache = SnapshotCache::new();
        cache.publish(snapshot("PROVINCIA;TIPO\nMILANO;CRO\n", 1));
        let first = cache.current().unwrap();
        cache.publish(snapshot("PROVINCIA;TIPO\nROMA;CNO\nBARI;CRO\n", 2));

        let current = cache.current().unwrap();
        assert!(current.published_at >= first.published_at);
        assert_eq!(cache.status().last_fetch_time, Some(current.published_at));

        let raw = cache.current_raw().unwrap();
        assert_eq!(raw.data_date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(raw.file_name, "data_20240102.csv");
        assert_eq!(raw.len(), 2);

        let list = cache.current_list_entries();
        let compact = cache.current_compact_entries();
        assert_eq!(list.len(), raw.len());
        assert_eq!(compact.len(), raw.len());
        assert_eq!((list[0].kind.as_str(), compact[0].3), ("CNO", 1));
        assert_eq!((list[1].kind.as_str(), compact[1].3), ("CRO", 0));

        assert_eq!(cache.detail_by_id(1).unwrap().get("PROVINCIA"), Some("BARI"));
        assert!(cache.detail_by_id(2).is_err());

        let stats = cache.current_statistics().unwrap();
        assert_eq!(stats.total, raw.len());
        assert_eq!(stats.by_provincia.get("ROMA"), Some(1));
        assert_eq!(stats.by_provincia.get("MILANO"), None);
        assert_eq!(cache.status().fetch_status, FetchStatus::Success);
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_value(FetchStatus::Fetching).unwrap();
        assert_eq!(json, "fetching");
    }
}
