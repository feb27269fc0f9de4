//! Read-only HTTP surface over the snapshot cache.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::cache::SnapshotCache;

pub mod api;
pub mod routes;

/// Serves until `shutdown` is cancelled, then drains in-flight requests.
pub async fn run_server(
    bind_addr: SocketAddr,
    cache: Arc<SnapshotCache>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "fibermirror listening");

    axum::serve(listener, routes::build_router(cache))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
