//! Process configuration read from the environment once at startup.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveTime;

use crate::error::ConfigError;

pub const DEFAULT_ARCHIVE_URL: &str = "https://example.com/archive.zip";
pub const DEFAULT_CACHE_DIR: &str = "data";
pub const DEFAULT_FETCH_TIME: &str = "18:00";
pub const DEFAULT_BIND: &str = "127.0.0.1:8000";
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub archive_url: String,
    pub cache_dir: PathBuf,
    /// Local time of day for the scheduled cycle.
    pub fetch_time: NaiveTime,
    pub bind_addr: SocketAddr,
    pub fetch_timeout: Duration,
    /// Present only when both token and chat id are set.
    pub telegram: Option<TelegramConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let archive_url = get("ARCHIVE_URL").unwrap_or_else(|| DEFAULT_ARCHIVE_URL.to_string());
        let cache_dir = PathBuf::from(get("CACHE_DIR").unwrap_or_else(|| DEFAULT_CACHE_DIR.to_string()));

        let fetch_time_raw = get("FETCH_TIME").unwrap_or_else(|| DEFAULT_FETCH_TIME.to_string());
        let fetch_time = parse_fetch_time(&fetch_time_raw).ok_or(ConfigError::FetchTime {
            key: "FETCH_TIME",
            value: fetch_time_raw.clone(),
        })?;

        let bind_raw = get("FIBERMIRROR_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind_addr = bind_raw.parse().map_err(|_| ConfigError::BindAddr {
            key: "FIBERMIRROR_BIND",
            value: bind_raw.clone(),
        })?;

        let fetch_timeout = match get("FIBERMIRROR_FETCH_TIMEOUT_SECS") {
            None => Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::Timeout {
                        key: "FIBERMIRROR_FETCH_TIMEOUT_SECS",
                        value: raw,
                    })
                }
            },
        };

        let telegram = match (get("TELEGRAM_BOT_TOKEN"), get("TELEGRAM_CHAT_ID")) {
            (Some(bot_token), Some(chat_id)) => Some(TelegramConfig { bot_token, chat_id }),
            _ => None,
        };

        Ok(Config {
            archive_url,
            cache_dir,
            fetch_time,
            bind_addr,
            fetch_timeout,
            telegram,
        })
    }
}

/// Accepts `H:MM` or `HH:MM`.
fn parse_fetch_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M").ok()
}
