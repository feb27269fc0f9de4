//! Ingestion pipeline: the only writer of the [`SnapshotCache`].
//!
//! One cycle runs at a time. Each cycle tries today's disk cache, falls back to
//! the remote archive, builds a complete [`Snapshot`] off to the side and
//! publishes it in one swap. Persisting and retention cleanup happen after the
//! publish and are best-effort. A failed cycle leaves the previous snapshot in
//! place, records the error on the cache and alerts the operator.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::alert::AlertSink;
use crate::cache::{Snapshot, SnapshotCache};
use crate::config::DEFAULT_FETCH_TIMEOUT_SECS;
use crate::data::date::data_date_from_name;
use crate::data::parse::parse_records;
use crate::data::RawDataset;
use crate::error::IngestError;

pub mod disk;
pub mod fetch;
pub mod schedule;

use disk::{CachedPayload, DiskCache};
use fetch::{extract_dated_csv, ArchiveSource};

pub const FAILURE_PREFIX: &str = "Failed to fetch/parse data";

type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadOrigin {
    Disk,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Published {
        origin: PayloadOrigin,
        data_date: NaiveDate,
        records: usize,
    },
    Failed {
        message: String,
    },
    /// Another cycle was already running.
    Skipped,
    Cancelled,
}

impl CycleOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, CycleOutcome::Published { .. })
    }
}

pub struct IngestPipeline {
    cache: Arc<SnapshotCache>,
    disk: DiskCache,
    source: Arc<dyn ArchiveSource>,
    alerts: Arc<dyn AlertSink>,
    today: Clock,
    fetch_timeout: Duration,
    cancel: CancellationToken,
    in_flight: Mutex<()>,
}

impl IngestPipeline {
    pub fn new(
        cache: Arc<SnapshotCache>,
        disk: DiskCache,
        source: Arc<dyn ArchiveSource>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        IngestPipeline {
            cache,
            disk,
            source,
            alerts,
            today: Arc::new(|| Local::now().date_naive()),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            cancel: CancellationToken::new(),
            in_flight: Mutex::new(()),
        }
    }

    /// Overrides the source of "today" used for the disk cache lookup.
    pub fn with_clock<F>(mut self, today: F) -> Self
    where
        F: Fn() -> NaiveDate + Send + Sync + 'static,
    {
        self.today = Arc::new(today);
        self
    }

    /// Upper bound on the whole remote fetch, on top of any client-side timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.cache
    }

    pub fn disk(&self) -> &DiskCache {
        &self.disk
    }

    /// Runs one ingestion cycle. Never fails: the outcome is also reflected in
    /// the cache status.
    #[tracing::instrument(name = "ingest_cycle", skip_all)]
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Ok(_running) = self.in_flight.try_lock() else {
            tracing::info!("ingestion already in flight, skipping trigger");
            return CycleOutcome::Skipped;
        };

        self.cache.mark_fetching();
        let today = (self.today)();

        match self.prepare(today).await {
            Ok((snapshot, origin)) => {
                let data_date = snapshot.raw.data_date;
                let records = snapshot.raw.len();
                let payload = snapshot.raw.payload.clone();
                self.cache.publish(snapshot);
                tracing::info!(?origin, %data_date, records, "published snapshot");

                self.persist(origin, data_date, payload).await;
                CycleOutcome::Published {
                    origin,
                    data_date,
                    records,
                }
            }
            Err(IngestError::Cancelled) => {
                tracing::warn!("ingestion cycle cancelled before publish");
                self.cache.mark_error(IngestError::Cancelled.to_string());
                CycleOutcome::Cancelled
            }
            Err(err) => {
                let message = format!("{FAILURE_PREFIX}: {err}");
                tracing::error!(error = %err, "{FAILURE_PREFIX}");
                self.cache.mark_error(message.clone());
                self.alerts.notify(&message).await;
                CycleOutcome::Failed { message }
            }
        }
    }

    /// Everything up to, but not including, the publish.
    async fn prepare(&self, today: NaiveDate) -> Result<(Snapshot, PayloadOrigin), IngestError> {
        let (bytes, file_name, data_date, origin) = match self.load_cached(today).await {
            Some(CachedPayload { bytes, file_name }) => {
                let data_date = data_date_from_name(&file_name).unwrap_or(today);
                tracing::info!(%file_name, %data_date, "using disk cached payload");
                (bytes, file_name, data_date, PayloadOrigin::Disk)
            }
            None => {
                let archive = self.fetch_archive().await?;
                let dated = run_blocking(move || extract_dated_csv(&archive)).await?;
                tracing::info!(file_name = %dated.file_name, data_date = %dated.data_date, "extracted dataset");
                (dated.bytes, dated.file_name, dated.data_date, PayloadOrigin::Remote)
            }
        };

        let snapshot = run_blocking(move || {
            let records = parse_records(&bytes)?;
            Ok(Snapshot::build(RawDataset::new(records, bytes, file_name, data_date)))
        })
        .await?;

        if self.cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        Ok((snapshot, origin))
    }

    async fn fetch_archive(&self) -> Result<Vec<u8>, IngestError> {
        let timeout = self.fetch_timeout;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(IngestError::Cancelled),
            fetched = tokio::time::timeout(timeout, self.source.fetch()) => {
                fetched.unwrap_or(Err(IngestError::Timeout(timeout)))
            }
        }
    }

    /// Disk failures degrade to a cache miss.
    async fn load_cached(&self, today: NaiveDate) -> Option<CachedPayload> {
        let disk = self.disk.clone();
        let loaded = tokio::task::spawn_blocking(move || disk.load(today)).await;
        match loaded {
            Ok(Ok(Some(payload))) => Some(payload),
            Ok(Ok(None)) => {
                tracing::info!(file = %DiskCache::file_name_for(today), "no disk cached payload for today");
                None
            }
            Ok(Err(err)) => {
                tracing::error!(error = %err, "failed to read disk cache, fetching remotely");
                None
            }
            Err(err) => {
                tracing::error!(error = %err, "disk cache reader aborted, fetching remotely");
                None
            }
        }
    }

    /// Best-effort: write the payload under its data date, then drop older files.
    async fn persist(&self, origin: PayloadOrigin, data_date: NaiveDate, payload: Arc<[u8]>) {
        let disk = self.disk.clone();
        let persisted = tokio::task::spawn_blocking(move || {
            if origin == PayloadOrigin::Remote {
                match disk.store(data_date, &payload) {
                    Ok(path) => tracing::info!(path = %path.display(), "saved payload to disk cache"),
                    Err(err) => tracing::error!(error = %err, "failed to save payload to disk cache"),
                }
            }
            match disk.remove_older_than(data_date) {
                Ok(removed) if !removed.is_empty() => {
                    tracing::info!(removed = removed.len(), "retention cleanup done");
                }
                Ok(_) => {}
                Err(err) => tracing::error!(error = %err, "retention cleanup failed"),
            }
        })
        .await;
        if let Err(err) = persisted {
            tracing::error!(error = %err, "disk cache writer aborted");
        }
    }
}

async fn run_blocking<T, F>(work: F) -> Result<T, IngestError>
where
    F: FnOnce() -> Result<T, IngestError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}
