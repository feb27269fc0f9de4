//! Data-date recovery from file names (`...YYYYMMDD...`).

use chrono::NaiveDate;

/// First run of 8 consecutive ASCII digits anywhere in `name`.
pub fn find_date_digits(name: &str) -> Option<&str> {
    let bytes = name.as_bytes();
    let mut run_start = None;
    for (idx, byte) in bytes.iter().enumerate() {
        if byte.is_ascii_digit() {
            let start = *run_start.get_or_insert(idx);
            if idx + 1 - start == 8 {
                return Some(&name[start..=idx]);
            }
        } else {
            run_start = None;
        }
    }
    None
}

/// Interprets the first 8-digit run as `YYYYMMDD`. `None` if absent or not a calendar date.
pub fn data_date_from_name(name: &str) -> Option<NaiveDate> {
    let digits = find_date_digits(name)?;
    NaiveDate::parse_from_str(digits, "%Y%m%d").ok()
}

pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}
