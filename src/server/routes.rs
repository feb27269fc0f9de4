use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tower_http::compression::predicate::{DefaultPredicate, Predicate, SizeAbove};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;

use crate::cache::SnapshotCache;
use crate::server::api;

const CACHE_CONTROL: &str = "public, max-age=86400";
const COMPRESS_MIN_BYTES: u16 = 1000;

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<SnapshotCache>,
}

pub fn build_router(cache: Arc<SnapshotCache>) -> Router {
    let compression =
        CompressionLayer::new().compress_when(DefaultPredicate::new().and(SizeAbove::new(COMPRESS_MIN_BYTES)));

    Router::new()
        .route("/", get(root))
        .route("/raw", get(raw))
        .route("/download", get(download))
        .route("/list", get(list))
        .route("/listmap", get(listmap))
        .route("/details/:id", get(details))
        .route("/stats", get(stats))
        .route("/health", get(health))
        .fallback(not_found)
        .layer(compression)
        .layer(CorsLayer::permissive())
        .with_state(AppState { cache })
}

async fn root() -> Json<api::ServiceInfo> {
    Json(api::service_info())
}

async fn raw(State(state): State<AppState>) -> Response {
    let view = state.cache.view();
    let snapshot = view.snapshot.as_deref();
    let payload = api::raw_payload(snapshot, &view.status);
    (cached_with_etag(api::etag(snapshot)), Json(payload)).into_response()
}

async fn download(State(state): State<AppState>) -> Response {
    let Some(raw) = state.cache.current_raw().filter(|raw| !raw.payload.is_empty()) else {
        return error_response(StatusCode::NOT_FOUND, "error", "No data available");
    };
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, api::attachment_disposition(&raw.file_name)),
            (header::CACHE_CONTROL, CACHE_CONTROL.to_string()),
        ],
        raw.payload.to_vec(),
    )
        .into_response()
}

async fn list(State(state): State<AppState>) -> Response {
    let snapshot = state.cache.current();
    let entries = snapshot.as_deref().map_or(&[][..], |s| s.list_entries());
    (cached_with_etag(api::etag(snapshot.as_deref())), Json(entries)).into_response()
}

async fn listmap(State(state): State<AppState>) -> Response {
    let snapshot = state.cache.current();
    let entries = snapshot.as_deref().map_or(&[][..], |s| s.compact_entries());
    (cached_with_etag(api::etag(snapshot.as_deref())), Json(entries)).into_response()
}

async fn details(State(state): State<AppState>, Path(raw_id): Path<String>) -> Response {
    let Ok(id) = raw_id.parse::<usize>() else {
        return error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "detail",
            "Record id must be a non-negative integer",
        );
    };
    let snapshot = state.cache.current();
    match snapshot.as_deref().map(|s| s.detail(id)) {
        Some(Ok(record)) => (cached_with_etag(api::etag(snapshot.as_deref())), Json(record)).into_response(),
        Some(Err(_)) | None => error_response(StatusCode::NOT_FOUND, "detail", "Record not found"),
    }
}

async fn stats(State(state): State<AppState>) -> Response {
    let headers = [(header::CACHE_CONTROL, CACHE_CONTROL)];
    match state.cache.current() {
        Some(snapshot) => (headers, Json(snapshot.statistics())).into_response(),
        None => (headers, Json(serde_json::json!({}))).into_response(),
    }
}

async fn health(State(state): State<AppState>) -> Response {
    let view = state.cache.view();
    Json(api::health_payload(view.snapshot.as_deref(), &view.status)).into_response()
}

async fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "detail", "Not Found")
}

fn cached_with_etag(etag: String) -> [(header::HeaderName, String); 2] {
    [
        (header::CACHE_CONTROL, CACHE_CONTROL.to_string()),
        (header::ETAG, etag),
    ]
}

fn error_response(status: StatusCode, key: &str, message: &str) -> Response {
    let mut body = serde_json::Map::new();
    body.insert(key.to_string(), serde_json::Value::from(message));
    (status, Json(serde_json::Value::Object(body))).into_response()
}
