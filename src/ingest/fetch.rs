//! Remote archive download and dated-file extraction.

use std::io::{Cursor, Read};
use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, UPGRADE_INSECURE_REQUESTS, USER_AGENT};
use reqwest::redirect::Policy;

use crate::data::date::data_date_from_name;
use crate::error::IngestError;

pub const DATASET_EXTENSION: &str = ".csv";
const MAX_REDIRECTS: usize = 10;
/// Upper bound on trusting an entry's declared uncompressed size.
const PREALLOC_LIMIT: usize = 64 << 20;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/144.0.0.0 Safari/537.36";
const BROWSER_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,\
     image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7";

/// Source of the compressed dataset archive.
pub trait ArchiveSource: Send + Sync {
    fn fetch(&self) -> BoxFuture<'_, Result<Vec<u8>, IngestError>>;
}

/// The single dated dataset file pulled out of an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatedFile {
    pub file_name: String,
    pub data_date: NaiveDate,
    pub bytes: Vec<u8>,
}

/// HTTP GET with browser-like headers, redirects followed, bounded by a timeout.
#[derive(Debug, Clone)]
pub struct HttpArchiveSource {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpArchiveSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, IngestError> {
        let client = reqwest::Client::builder()
            .default_headers(browser_headers())
            .redirect(Policy::limited(MAX_REDIRECTS))
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()
            .map_err(IngestError::Network)?;
        Ok(HttpArchiveSource {
            client,
            url: url.into(),
            timeout,
        })
    }

    async fn download(&self) -> Result<Vec<u8>, IngestError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|err| self.classify(err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|err| self.classify(err))?;
        tracing::info!(url = %self.url, bytes = body.len(), "downloaded archive");
        Ok(body.to_vec())
    }

    fn classify(&self, err: reqwest::Error) -> IngestError {
        if err.is_timeout() {
            IngestError::Timeout(self.timeout)
        } else {
            IngestError::Network(err)
        }
    }
}

impl ArchiveSource for HttpArchiveSource {
    fn fetch(&self) -> BoxFuture<'_, Result<Vec<u8>, IngestError>> {
        self.download().boxed()
    }
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    for (name, value) in [
        ("sec-fetch-site", "none"),
        ("sec-fetch-mode", "navigate"),
        ("sec-fetch-user", "?1"),
        ("sec-fetch-dest", "document"),
        ("sec-ch-ua", "\"Not(A:Brand\";v=\"8\", \"Chromium\";v=\"144\""),
        ("sec-ch-ua-mobile", "?0"),
        ("sec-ch-ua-platform", "\"macOS\""),
    ] {
        headers.insert(name, HeaderValue::from_static(value));
    }
    headers
}

/// First entry, in archive order, named `*.csv` with a valid `YYYYMMDD` in its name.
pub fn extract_dated_csv(archive: &[u8]) -> Result<DatedFile, IngestError> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))?;

    for idx in 0..zip.len() {
        let mut entry = zip.by_index(idx)?;
        if entry.is_dir() {
            continue;
        }
        let entry_name = entry.name().to_string();
        if !entry_name.ends_with(DATASET_EXTENSION) {
            continue;
        }
        let Some(data_date) = data_date_from_name(&entry_name) else {
            continue;
        };

        let mut bytes = Vec::with_capacity(initial_capacity(entry.size()));
        entry
            .read_to_end(&mut bytes)
            .map_err(|err| IngestError::ArchiveFormat(format!("reading {entry_name}: {err}")))?;

        let file_name = Path::new(&entry_name)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&entry_name)
            .to_string();
        return Ok(DatedFile {
            file_name,
            data_date,
            bytes,
        });
    }

    Err(IngestError::NoDatedFile)
}

fn initial_capacity(declared: u64) -> usize {
    usize::try_from(declared).map_or(PREALLOC_LIMIT, |size| size.min(PREALLOC_LIMIT))
}
