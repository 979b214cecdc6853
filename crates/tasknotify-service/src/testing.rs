//! Test doubles shared by the unit tests.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use tasknotify_core::{ChannelPayload, ChatMessage, EmailMessage, PulseMessage};

use crate::notifier::{NotifyError, Notifier};
use crate::render::{AuthoringErrorKind, EngineError, TemplateEngine};

/// Records every payload it accepts; optionally rejects one channel.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<ChannelPayload>>,
    fail_channel: Option<&'static str>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(channel: &'static str) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_channel: Some(channel),
        }
    }

    pub fn sent(&self) -> Vec<ChannelPayload> {
        self.sent.lock().unwrap().clone()
    }

    fn record(&self, payload: ChannelPayload) -> Result<(), NotifyError> {
        if self.fail_channel == Some(payload.channel()) {
            return Err(NotifyError::Transport(format!(
                "{} is down",
                payload.channel()
            )));
        }
        self.sent.lock().unwrap().push(payload);
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn irc(&self, message: &ChatMessage) -> Result<(), NotifyError> {
        self.record(ChannelPayload::Irc(message.clone()))
    }

    async fn slack(&self, message: &ChatMessage) -> Result<(), NotifyError> {
        self.record(ChannelPayload::Slack(message.clone()))
    }

    async fn pulse(&self, message: &PulseMessage) -> Result<(), NotifyError> {
        self.record(ChannelPayload::Pulse(message.clone()))
    }

    async fn email(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        self.record(ChannelPayload::Email(message.clone()))
    }
}

/// Template engine that always fails the same way.
pub struct FailingEngine {
    kind: Option<AuthoringErrorKind>,
    detail: String,
}

impl FailingEngine {
    pub fn fatal(detail: &str) -> Self {
        Self {
            kind: None,
            detail: detail.to_string(),
        }
    }

    pub fn authoring(kind: AuthoringErrorKind, detail: &str) -> Self {
        Self {
            kind: Some(kind),
            detail: detail.to_string(),
        }
    }
}

impl TemplateEngine for FailingEngine {
    fn evaluate(&self, _template: &Value, _context: &Value) -> Result<Value, EngineError> {
        let detail = self.detail.clone();
        Err(match self.kind {
            Some(kind) => EngineError::Authoring { kind, detail },
            None => EngineError::Fatal(detail),
        })
    }
}
