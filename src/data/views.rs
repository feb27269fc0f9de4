//! Read-optimized projections derived from one cycle's records.
//!
//! [`DerivedViews::build`] makes a single pass over the records and produces the
//! named list, the positional map array, the id index and the aggregate
//! statistics. It never fails: a record with a missing or non-numeric coordinate
//! is placed at 0.0 for that coordinate.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::data::record::Record;
use crate::error::NotFoundError;

pub const FIELD_PROVINCE: &str = "PROVINCIA";
pub const FIELD_TYPE: &str = "TIPO";
pub const FIELD_LATITUDE: &str = "LATITUDINE";
pub const FIELD_LONGITUDE: &str = "LONGITUDINE";
pub const FIELD_STATUS: &str = "STATO";
pub const FIELD_AVAILABILITY_DATE: &str = "DATA_DISPONIBILITA";

/// Type value encoded as 0 in [`CompactEntry`]; everything else is 1.
pub const CANONICAL_TYPE: &str = "CRO";

pub const TOP_PROVINCES: usize = 20;
pub const OTHER_BUCKET: &str = "OTHER";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListEntry {
    pub id: usize,
    pub lat: f64,
    pub lon: f64,
    #[serde(rename = "type")]
    pub kind: String,
}

/// `[id, lat, lon, type_code]`, serialized as a JSON array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CompactEntry(pub usize, pub f64, pub f64, pub u8);

/// Id -> record. Ids are positions, so the index shares the record slice.
#[derive(Debug, Clone, Default)]
pub struct DetailIndex {
    records: Option<Arc<[Record]>>,
}

impl DetailIndex {
    pub fn new(records: Arc<[Record]>) -> Self {
        DetailIndex {
            records: Some(records),
        }
    }

    pub fn get(&self, id: usize) -> Result<&Record, NotFoundError> {
        self.records
            .as_deref()
            .and_then(|records| records.get(id))
            .ok_or(NotFoundError { id })
    }

    pub fn len(&self) -> usize {
        self.records.as_deref().map_or(0, <[Record]>::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ordered frequency table; serializes as a JSON object in table order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Breakdown(Vec<(String, usize)>);

impl Breakdown {
    pub fn get(&self, key: &str) -> Option<usize> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, count)| *count)
    }

    pub fn entries(&self) -> &[(String, usize)] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> usize {
        self.0.iter().map(|(_, count)| count).sum()
    }
}

impl Serialize for Breakdown {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, count) in &self.0 {
            map.serialize_entry(key, count)?;
        }
        map.end()
    }
}

/// Counter that remembers first-seen order.
#[derive(Debug, Default)]
struct Counter {
    slots: HashMap<String, usize>,
    counts: Vec<(String, usize)>,
}

impl Counter {
    fn add(&mut self, key: &str) {
        if key.is_empty() {
            return;
        }
        match self.slots.get(key) {
            Some(&slot) => self.counts[slot].1 += 1,
            None => {
                self.slots.insert(key.to_string(), self.counts.len());
                self.counts.push((key.to_string(), 1));
            }
        }
    }

    fn into_breakdown(self) -> Breakdown {
        Breakdown(self.counts)
    }

    /// Top `n` by count descending; equal counts keep first-seen order
    /// (stable sort). The rest is folded into [`OTHER_BUCKET`] when non-zero.
    fn into_top(self, n: usize) -> Breakdown {
        let mut ranked = self.counts;
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        let rest: usize = ranked.iter().skip(n).map(|(_, count)| count).sum();
        ranked.truncate(n);
        if rest > 0 {
            ranked.push((OTHER_BUCKET.to_string(), rest));
        }
        Breakdown(ranked)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub total: usize,
    pub by_provincia: Breakdown,
    pub by_tipo: Breakdown,
    pub by_stato: Breakdown,
    pub by_availability_year: Breakdown,
    /// ISO-8601 build time.
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct DerivedViews {
    pub list: Vec<ListEntry>,
    pub compact: Vec<CompactEntry>,
    pub details: DetailIndex,
    pub statistics: Statistics,
}

impl DerivedViews {
    pub fn build(records: Arc<[Record]>) -> Self {
        Self::build_at(records, Utc::now())
    }

    /// Same as [`DerivedViews::build`] with an explicit build timestamp.
    pub fn build_at(records: Arc<[Record]>, built_at: DateTime<Utc>) -> Self {
        let mut list = Vec::with_capacity(records.len());
        let mut compact = Vec::with_capacity(records.len());
        let mut provinces = Counter::default();
        let mut types = Counter::default();
        let mut statuses = Counter::default();
        let mut years = Counter::default();

        for (id, record) in records.iter().enumerate() {
            let kind = record.get_or_empty(FIELD_TYPE);
            let lat = parse_coordinate(record.get(FIELD_LATITUDE));
            let lon = parse_coordinate(record.get(FIELD_LONGITUDE));
            let code = if kind == CANONICAL_TYPE { 0 } else { 1 };

            list.push(ListEntry {
                id,
                lat,
                lon,
                kind: kind.to_string(),
            });
            compact.push(CompactEntry(id, lat, lon, code));

            provinces.add(record.get_or_empty(FIELD_PROVINCE));
            types.add(kind);
            statuses.add(record.get_or_empty(FIELD_STATUS));

            let availability = record.get_or_empty(FIELD_AVAILABILITY_DATE);
            if availability.chars().count() >= 4 {
                let year: String = availability.chars().take(4).collect();
                years.add(&year);
            }
        }

        let statistics = Statistics {
            total: records.len(),
            by_provincia: provinces.into_top(TOP_PROVINCES),
            by_tipo: types.into_breakdown(),
            by_stato: statuses.into_breakdown(),
            by_availability_year: years.into_breakdown(),
            updated_at: built_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        };

        DerivedViews {
            list,
            compact,
            details: DetailIndex::new(records),
            statistics,
        }
    }
}

/// Missing, empty, non-numeric or non-finite values become 0.0.
///
/// This makes a genuine 0.0 coordinate indistinguishable from a missing one.
fn parse_coordinate(raw: Option<&str>) -> f64 {
    raw.and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}
