//! Channel payloads handed to the delivery interface.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Recipient of a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatTarget {
    User(String),
    Channel(String),
}

/// An IRC or Slack message; serializes as `{"user"|"channel": .., "message": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(flatten)]
    pub target: ChatTarget,
    pub message: String,
}

/// A status record to republish on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PulseMessage {
    pub routing_key: String,
    pub message: Value,
}

/// Call-to-action link rendered in an email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailLink {
    pub text: String,
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub address: String,
    /// Markdown body.
    pub content: String,
    pub subject: String,
    pub link: EmailLink,
    /// Name of the mail template (`simple`, `fullscreen`).
    pub template: String,
}

/// One delivery request, built per matching route.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelPayload {
    Irc(ChatMessage),
    Slack(ChatMessage),
    Pulse(PulseMessage),
    Email(EmailMessage),
}

impl ChannelPayload {
    /// Short channel name, used in logs and metrics.
    pub fn channel(&self) -> &'static str {
        match self {
            Self::Irc(_) => "irc",
            Self::Slack(_) => "slack",
            Self::Pulse(_) => "pulse",
            Self::Email(_) => "email",
        }
    }
}
