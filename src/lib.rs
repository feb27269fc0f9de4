pub mod alert;
pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod ingest;
pub mod server;
pub mod telemetry;
