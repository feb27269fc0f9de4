pub mod date;
pub mod parse;
pub mod record;
pub mod views;

pub use record::{RawDataset, Record};
pub use views::{Breakdown, CompactEntry, DerivedViews, DetailIndex, ListEntry, Statistics};
