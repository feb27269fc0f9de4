//! Disk cache of the last ingested payload, one file per data date.
//!
//! Files are named `fibercop_YYYYMMDD.csv`. Writes land in a temporary file in
//! the same directory and are renamed into place after `fsync`, so a crash never
//! leaves a truncated payload under a dated name.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

use chrono::NaiveDate;
use tempfile::NamedTempFile;

use crate::data::date::{data_date_from_name, date_key};
use crate::error::DiskError;

const FILE_PREFIX: &str = "fibercop_";
const FILE_SUFFIX: &str = ".csv";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPayload {
    pub bytes: Vec<u8>,
    pub file_name: String,
}

#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DiskCache { dir: dir.into() }
    }

    pub fn file_name_for(date: NaiveDate) -> String {
        format!("{FILE_PREFIX}{}{FILE_SUFFIX}", date_key(date))
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(Self::file_name_for(date))
    }

    /// `Ok(None)` when nothing is cached for `date`.
    pub fn load(&self, date: NaiveDate) -> Result<Option<CachedPayload>, DiskError> {
        let path = self.path_for(date);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(CachedPayload {
                bytes,
                file_name: Self::file_name_for(date),
            })),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(DiskError::io(path, err)),
        }
    }

    pub fn store(&self, date: NaiveDate, bytes: &[u8]) -> Result<PathBuf, DiskError> {
        fs::create_dir_all(&self.dir).map_err(|err| DiskError::io(&self.dir, err))?;
        let path = self.path_for(date);

        let mut temp = NamedTempFile::new_in(&self.dir).map_err(|err| DiskError::io(&self.dir, err))?;
        temp.write_all(bytes)
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|err| DiskError::io(temp.path(), err))?;
        temp.persist(&path)
            .map_err(|err| DiskError::io(&path, err.error))?;
        Ok(path)
    }

    /// Dates of every cached payload currently on disk, ascending.
    pub fn cached_dates(&self) -> Result<Vec<NaiveDate>, DiskError> {
        let mut dates: Vec<NaiveDate> = self.cached_files()?.into_iter().map(|(date, _)| date).collect();
        dates.sort();
        Ok(dates)
    }

    /// Deletes cached payloads dated strictly before `keep_from`.
    ///
    /// A file that cannot be removed is logged and skipped. Returns the paths removed.
    pub fn remove_older_than(&self, keep_from: NaiveDate) -> Result<Vec<PathBuf>, DiskError> {
        let mut removed = Vec::new();
        for (date, path) in self.cached_files()? {
            if date >= keep_from {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    tracing::info!(path = %path.display(), "removed stale cache file");
                    removed.push(path);
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "could not remove stale cache file");
                }
            }
        }
        Ok(removed)
    }

    fn cached_files(&self) -> Result<Vec<(NaiveDate, PathBuf)>, DiskError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(DiskError::io(&self.dir, err)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| DiskError::io(&self.dir, err))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(stem) = name
                .strip_prefix(FILE_PREFIX)
                .and_then(|rest| rest.strip_suffix(FILE_SUFFIX))
            else {
                continue;
            };
            if stem.len() != 8 {
                continue;
            }
            if let Some(date) = data_date_from_name(stem) {
                files.push((date, path));
            }
        }
        Ok(files)
    }
}
