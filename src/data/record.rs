//! Parsed dataset rows and the per-cycle raw dataset.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// One ingested row: field name -> value, in header order.
///
/// All records of a cycle share the same header slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    header: Arc<[String]>,
    values: Vec<String>,
}

impl Record {
    /// Pads missing trailing columns with `""` and drops values past the header.
    pub fn new(header: Arc<[String]>, mut values: Vec<String>) -> Self {
        values.resize(header.len(), String::new());
        Record { header, values }
    }

    /// Value of `field`, or `None` when the column does not exist. A column
    /// name repeated in the header resolves to its last occurrence.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.header
            .iter()
            .rposition(|name| name == field)
            .map(|idx| self.values[idx].as_str())
    }

    /// Value of `field`, treating an absent column as empty.
    pub fn get_or_empty(&self, field: &str) -> &str {
        self.get(field).unwrap_or("")
    }

    /// Distinct field names in header order, each paired with its [`get`](Self::get) value.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.header
            .iter()
            .enumerate()
            .filter(|(idx, name)| !self.header[..*idx].contains(*name))
            .map(|(_, name)| (name.as_str(), self.get_or_empty(name)))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (name, value) in self.fields() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Everything one ingestion cycle produced before derivation.
#[derive(Debug, Clone)]
pub struct RawDataset {
    pub records: Arc<[Record]>,
    /// Source bytes, re-served verbatim as the CSV download.
    pub payload: Arc<[u8]>,
    pub file_name: String,
    /// Date embedded in the file name, not the fetch time.
    pub data_date: NaiveDate,
}

impl RawDataset {
    pub fn new(records: Vec<Record>, payload: Vec<u8>, file_name: impl Into<String>, data_date: NaiveDate) -> Self {
        RawDataset {
            records: records.into(),
            payload: payload.into(),
            file_name: file_name.into(),
            data_date,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
