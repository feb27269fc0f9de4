//! Response payloads built from one consistent cache view.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Serialize;

use crate::cache::{FetchStatus, IngestionStatus, Snapshot};
use crate::data::Record;

pub const SERVICE_NAME: &str = "FiberCop Data API";
pub const SERVICE_DESCRIPTION: &str = "Unofficial mirror API for FiberCop's latest CRO/CNO data. \
     Provides endpoints to access raw data, download CSV, get compact lists for map display, \
     retrieve detailed records by ID, and view dataset statistics.";

pub const ENDPOINTS: [&str; 7] = [
    "/raw",
    "/download",
    "/list",
    "/listmap",
    "/details/{id}",
    "/stats",
    "/health",
];

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub service: &'static str,
    pub description: &'static str,
    pub endpoints: &'static [&'static str],
}

pub fn service_info() -> ServiceInfo {
    ServiceInfo {
        service: SERVICE_NAME,
        description: SERVICE_DESCRIPTION,
        endpoints: &ENDPOINTS,
    }
}

#[derive(Debug, Serialize)]
pub struct RawPayload<'a> {
    pub latest_update_date: Option<String>,
    pub last_fetch_time: Option<String>,
    pub fetch_status: FetchStatus,
    pub data: &'a [Record],
}

pub fn raw_payload<'a>(snapshot: Option<&'a Snapshot>, status: &IngestionStatus) -> RawPayload<'a> {
    RawPayload {
        latest_update_date: snapshot.map(|s| iso_date(s.raw.data_date)),
        last_fetch_time: status.last_fetch_time.map(iso_time),
        fetch_status: status.fetch_status,
        data: snapshot.map_or(&[][..], Snapshot::records),
    }
}

#[derive(Debug, Serialize)]
pub struct HealthPayload {
    pub status: &'static str,
    pub fetch_status: FetchStatus,
    pub last_fetch: Option<String>,
    pub latest_date: Option<String>,
    pub record_count: usize,
}

pub fn health_payload(snapshot: Option<&Snapshot>, status: &IngestionStatus) -> HealthPayload {
    HealthPayload {
        status: "healthy",
        fetch_status: status.fetch_status,
        last_fetch: status.last_fetch_time.map(iso_time),
        latest_date: snapshot.map(|s| iso_date(s.raw.data_date)),
        record_count: snapshot.map_or(0, |s| s.raw.len()),
    }
}

/// Quoted entity tag derived from the data date, `"none"` before the first snapshot.
pub fn etag(snapshot: Option<&Snapshot>) -> String {
    let tag = snapshot.map_or_else(|| "none".to_string(), |s| iso_date(s.raw.data_date));
    format!("\"{tag}\"")
}

/// `Content-Disposition` value for the CSV download.
pub fn attachment_disposition(file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .filter(|c| *c != '"' && *c != '\\' && !c.is_control())
        .collect();
    format!("attachment; filename=\"{safe}\"")
}

fn iso_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn iso_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}
