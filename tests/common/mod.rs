#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use fibermirror::alert::AlertSink;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use zip::write::SimpleFileOptions;

pub const HEADER: &str = "PROVINCIA;TIPO;LATITUDINE;LONGITUDINE;STATO;DATA_DISPONIBILITA";

/// The two-row dataset used across the end-to-end tests.
pub fn sample_csv() -> String {
    format!("{HEADER}\nMILANO;CRO;45.1;9.2;DISPONIBILE;20230601\n;CNO;;;;\n")
}

pub fn zip_archive(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, text) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .expect("zip entry should start");
        writer.write_all(text.as_bytes()).expect("zip entry should write");
    }
    writer.finish().expect("zip should finish").into_inner()
}

/// What the loopback archive server answers with.
#[derive(Clone)]
pub enum Reply {
    Archive(Vec<u8>),
    Status(StatusCode),
}

#[derive(Clone)]
struct ServerState {
    reply: Reply,
    hits: Arc<AtomicUsize>,
}

pub struct ArchiveServer {
    pub addr: SocketAddr,
    pub hits: Arc<AtomicUsize>,
}

impl ArchiveServer {
    pub fn url(&self) -> String {
        format!("http://{}/archive.zip", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn serve_archive(State(state): State<ServerState>) -> axum::response::Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    match state.reply {
        Reply::Archive(bytes) => bytes.into_response(),
        Reply::Status(status) => status.into_response(),
    }
}

/// Serves `/archive.zip` directly and `/moved` as a redirect to it.
pub async fn spawn_archive_server(reply: Reply) -> ArchiveServer {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/archive.zip", get(serve_archive))
        .route(
            "/moved",
            get(|| async { axum::response::Redirect::temporary("/archive.zip") }),
        )
        .with_state(ServerState {
            reply,
            hits: hits.clone(),
        });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("loopback bind should succeed");
    let addr = listener.local_addr().expect("listener should have an address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("archive server should run");
    });
    ArchiveServer { addr, hits }
}

#[derive(Default)]
pub struct RecordingAlert {
    pub messages: Mutex<Vec<String>>,
}

impl RecordingAlert {
    pub fn sent(&self) -> Vec<String> {
        self.messages.lock().expect("alert log poisoned").clone()
    }
}

impl AlertSink for RecordingAlert {
    fn notify<'a>(&'a self, message: &'a str) -> BoxFuture<'a, ()> {
        self.messages
            .lock()
            .expect("alert log poisoned")
            .push(message.to_string());
        async {}.boxed()
    }
}
