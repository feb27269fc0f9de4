//! Startup load plus a daily trigger at a fixed local time of day.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDateTime, NaiveTime, TimeDelta, TimeZone};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::ingest::IngestPipeline;

/// Next datetime strictly after `now` whose time of day is `at`.
pub fn next_run_after(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    let same_day = now.date().and_time(at);
    if same_day > now {
        return same_day;
    }
    now.date()
        .succ_opt()
        .map_or(same_day, |tomorrow| tomorrow.and_time(at))
}

/// The next run as an instant in `now`'s time zone.
///
/// A wall-clock time repeated by a DST fall-back resolves to its first
/// occurrence; one skipped by a spring-forward gap moves an hour later.
pub fn next_run_instant<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let local = next_run_after(now.naive_local(), at);
    (0..3)
        .find_map(|hours| tz.from_local_datetime(&(local + TimeDelta::hours(hours))).earliest())
        .unwrap_or_else(|| now.clone() + TimeDelta::days(1))
}

fn delay_until<Tz: TimeZone>(now: &DateTime<Tz>, target: &DateTime<Tz>) -> Duration {
    let millis = target.timestamp_millis() - now.timestamp_millis();
    Duration::from_millis(u64::try_from(millis).unwrap_or(0))
}

/// Sleeps until each daily run and triggers a cycle, until `cancel` fires.
pub async fn run_daily(pipeline: Arc<IngestPipeline>, at: NaiveTime, cancel: CancellationToken) {
    loop {
        let now = Local::now();
        let target = next_run_instant(&now, at);
        tracing::info!(next_run = %target.to_rfc3339(), "scheduled next ingestion");

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("ingestion scheduler stopped");
                return;
            }
            _ = tokio::time::sleep(delay_until(&now, &target)) => {}
        }
        if Local::now() < target {
            // Woke ahead of the wall clock; sleep out the remainder.
            continue;
        }
        let outcome = pipeline.run_cycle().await;
        tracing::debug!(?outcome, "scheduled ingestion finished");
    }
}

/// Runs the startup cycle in the background, then the daily loop.
pub fn spawn(pipeline: Arc<IngestPipeline>, at: NaiveTime, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let outcome = pipeline.run_cycle().await;
        tracing::info!(?outcome, "startup ingestion finished");
        run_daily(pipeline, at, cancel).await;
    })
}
