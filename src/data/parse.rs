//! `;`-delimited dataset text into [`Record`]s.

use std::sync::Arc;

use crate::data::record::Record;
use crate::error::IngestError;

pub const FIELD_DELIMITER: u8 = b';';

/// First row is the header; every following non-blank row becomes a record.
pub fn parse_records(payload: &[u8]) -> Result<Vec<Record>, IngestError> {
    let text = std::str::from_utf8(payload)
        .map_err(|err| IngestError::Parse(format!("payload is not UTF-8: {err}")))?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(FIELD_DELIMITER)
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let header: Arc<[String]> = reader
        .headers()?
        .iter()
        .map(|name| name.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let values = row.iter().map(str::to_string).collect();
        records.push(Record::new(header.clone(), values));
    }
    Ok(records)
}
