//! Delivery interface - one operation per channel.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use tasknotify_core::{ChannelPayload, ChatMessage, EmailMessage, PulseMessage};

use crate::urls;

/// Delivery errors. Never retried here; the event is redelivered instead.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Delivery request failed: {0}")]
    Transport(String),

    #[error("Delivery rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

/// Sends channel payloads.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn irc(&self, message: &ChatMessage) -> Result<(), NotifyError>;

    async fn slack(&self, message: &ChatMessage) -> Result<(), NotifyError>;

    async fn pulse(&self, message: &PulseMessage) -> Result<(), NotifyError>;

    async fn email(&self, message: &EmailMessage) -> Result<(), NotifyError>;

    /// Route a payload to the operation for its channel.
    async fn send(&self, payload: &ChannelPayload) -> Result<(), NotifyError> {
        match payload {
            ChannelPayload::Irc(message) => self.irc(message).await,
            ChannelPayload::Slack(message) => self.slack(message).await,
            ChannelPayload::Pulse(message) => self.pulse(message).await,
            ChannelPayload::Email(message) => self.email(message).await,
        }
    }
}

/// Posts payloads as JSON to a notification gateway
/// (`<base>/irc`, `<base>/slack`, `<base>/pulse`, `<base>/email`).
pub struct HttpNotifier {
    client: reqwest::Client,
    base_url: String,
}

impl HttpNotifier {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Gateway at the notify service of a deployment.
    pub fn for_root_url(root_url: &str) -> Self {
        Self::new(urls::api(root_url, "notify", "v1", ""))
    }

    async fn post<T: Serialize + Sync>(&self, channel: &str, body: &T) -> Result<(), NotifyError> {
        let url = format!("{}/{channel}", self.base_url);
        debug!(url = %url, "Submitting notification");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(NotifyError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn irc(&self, message: &ChatMessage) -> Result<(), NotifyError> {
        self.post("irc", message).await
    }

    async fn slack(&self, message: &ChatMessage) -> Result<(), NotifyError> {
        self.post("slack", message).await
    }

    async fn pulse(&self, message: &PulseMessage) -> Result<(), NotifyError> {
        self.post("pulse", message).await
    }

    async fn email(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        self.post("email", message).await
    }
}

/// Dry-run notifier: logs every payload instead of sending it.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl LogNotifier {
    fn log<T: Serialize>(channel: &str, message: &T) -> Result<(), NotifyError> {
        let payload =
            serde_json::to_string(message).map_err(|e| NotifyError::InvalidPayload(e.to_string()))?;
        info!(channel, payload = %payload, "Notification (dry run)");
        Ok(())
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn irc(&self, message: &ChatMessage) -> Result<(), NotifyError> {
        Self::log("irc", message)
    }

    async fn slack(&self, message: &ChatMessage) -> Result<(), NotifyError> {
        Self::log("slack", message)
    }

    async fn pulse(&self, message: &PulseMessage) -> Result<(), NotifyError> {
        Self::log("pulse", message)
    }

    async fn email(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        Self::log("email", message)
    }
}
