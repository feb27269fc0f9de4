//! Operator alerts for failed ingestion cycles.
//!
//! Delivery is fire-and-forget: a sink never reports its own failure back to the
//! pipeline, it only logs it.

use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::config::TelegramConfig;

const TELEGRAM_API: &str = "https://api.telegram.org";
const ALERT_PREFIX: &str = "Errore fetcher fibercop:\n";
const ALERT_TIMEOUT: Duration = Duration::from_secs(15);

pub trait AlertSink: Send + Sync {
    fn notify<'a>(&'a self, message: &'a str) -> BoxFuture<'a, ()>;
}

/// Used when no delivery channel is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlyAlert;

impl AlertSink for LogOnlyAlert {
    fn notify<'a>(&'a self, message: &'a str) -> BoxFuture<'a, ()> {
        async move {
            tracing::warn!(alert = message, "alert channel not configured, skipping delivery");
        }
        .boxed()
    }
}

/// Posts alerts through the Telegram Bot API `sendMessage` method.
#[derive(Debug, Clone)]
pub struct TelegramAlert {
    client: reqwest::Client,
    endpoint: String,
    chat_id: String,
}

impl TelegramAlert {
    pub fn new(config: &TelegramConfig) -> Result<Self, reqwest::Error> {
        Self::with_base_url(config, TELEGRAM_API)
    }

    /// Same as [`TelegramAlert::new`] against another API root.
    pub fn with_base_url(config: &TelegramConfig, base_url: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(ALERT_TIMEOUT).build()?;
        Ok(TelegramAlert {
            client,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                base_url.trim_end_matches('/'),
                config.bot_token
            ),
            chat_id: config.chat_id.clone(),
        })
    }

    async fn send(&self, message: &str) -> Result<(), reqwest::Error> {
        self.client
            .post(&self.endpoint)
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": format!("{ALERT_PREFIX}{message}"),
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

impl AlertSink for TelegramAlert {
    fn notify<'a>(&'a self, message: &'a str) -> BoxFuture<'a, ()> {
        async move {
            match self.send(message).await {
                Ok(()) => tracing::info!("alert delivered"),
                // The error can echo the request URL, which embeds the bot token.
                Err(err) => tracing::error!(error = %err.without_url(), "alert delivery failed"),
            }
        }
        .boxed()
    }
}

/// Picks Telegram delivery when credentials are present.
pub fn from_config(telegram: Option<&TelegramConfig>) -> Box<dyn AlertSink> {
    match telegram.map(TelegramAlert::new) {
        Some(Ok(sink)) => Box::new(sink),
        Some(Err(err)) => {
            tracing::error!(error = %err, "could not build alert client, alerts will only be logged");
            Box::new(LogOnlyAlert)
        }
        None => Box::new(LogOnlyAlert),
    }
}
