//! Task definitions and their notification settings.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::TaskGroupId;

/// A task definition as returned by the queue.
///
/// Only the fields notification handling reads are typed; everything else
/// is kept in `rest` so templates can still reach it through `task.*`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinition {
    pub task_group_id: TaskGroupId,

    pub metadata: TaskMetadata,

    /// Free-form `extra` section; notification settings live under `notify`.
    #[serde(default)]
    pub extra: Map<String, Value>,

    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl TaskDefinition {
    /// Create a task definition with no extra section.
    pub fn new(task_group_id: impl Into<TaskGroupId>, metadata: TaskMetadata) -> Self {
        Self {
            task_group_id: task_group_id.into(),
            metadata,
            extra: Map::new(),
            rest: Map::new(),
        }
    }

    /// Builder method to set `extra.notify`.
    pub fn with_notify(mut self, notify: Value) -> Self {
        self.extra.insert("notify".to_string(), notify);
        self
    }

    /// Notification settings from `extra.notify`.
    ///
    /// Each field is picked up independently; a missing or non-object
    /// `notify` section yields an empty configuration.
    pub fn notify_config(&self) -> NotifyConfig {
        match self.extra.get("notify") {
            Some(Value::Object(notify)) => NotifyConfig::from_map(notify),
            _ => NotifyConfig::default(),
        }
    }
}

/// Human-facing task metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub source: String,
}

impl TaskMetadata {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        owner: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            owner: owner.into(),
            source: source.into(),
        }
    }
}

/// Per-channel message templates supplied by the task owner.
///
/// Templates are structured values: usually a string, but any JSON shape
/// is accepted and rendered element-wise.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotifyConfig {
    pub irc_user_message: Option<Value>,
    pub irc_channel_message: Option<Value>,
    pub slack_user_message: Option<Value>,
    pub slack_channel_message: Option<Value>,
    pub email: Option<EmailNotifyConfig>,
}

impl NotifyConfig {
    fn from_map(notify: &Map<String, Value>) -> Self {
        let field = |name: &str| notify.get(name).filter(|v| !v.is_null()).cloned();
        Self {
            irc_user_message: field("ircUserMessage"),
            irc_channel_message: field("ircChannelMessage"),
            slack_user_message: field("slackUserMessage"),
            slack_channel_message: field("slackChannelMessage"),
            email: match notify.get("email") {
                Some(Value::Object(email)) => Some(EmailNotifyConfig::from_map(email)),
                _ => None,
            },
        }
    }
}

/// Email overrides; each field replaces its default independently.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmailNotifyConfig {
    pub content: Option<Value>,
    pub subject: Option<Value>,
    pub link: Option<Value>,
    pub template: Option<Value>,
}

impl EmailNotifyConfig {
    fn from_map(email: &Map<String, Value>) -> Self {
        // Empty strings count as "not set", the same as a missing key.
        let field = |name: &str| {
            email
                .get(name)
                .filter(|v| !v.is_null() && v.as_str() != Some(""))
                .cloned()
        };
        Self {
            content: field("content"),
            subject: field("subject"),
            link: field("link"),
            template: field("template"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task_json() -> Value {
        json!({
            "taskGroupId": "G1",
            "provisionerId": "proj-ci",
            "metadata": {
                "name": "build linux",
                "description": "builds things",
                "owner": "ci@example.com",
                "source": "https://example.com/ci.yml"
            },
            "extra": {
                "notify": {
                    "ircUserMessage": "done: {{ status.state }}",
                    "email": {"subject": "Custom", "link": {"text": "Log", "href": "x"}}
                }
            }
        })
    }

    #[test]
    fn test_notify_config_fields() {
        let task: TaskDefinition = serde_json::from_value(task_json()).unwrap();
        let notify = task.notify_config();

        assert_eq!(notify.irc_user_message, Some(json!("done: {{ status.state }}")));
        assert!(notify.irc_channel_message.is_none());
        let email = notify.email.unwrap();
        assert_eq!(email.subject, Some(json!("Custom")));
        assert!(email.content.is_none());
        assert_eq!(email.link, Some(json!({"text": "Log", "href": "x"})));
    }

    #[test]
    fn test_missing_notify_is_empty() {
        let task = TaskDefinition::new("G1", TaskMetadata::default());
        assert_eq!(task.notify_config(), NotifyConfig::default());

        let odd = TaskDefinition::new("G1", TaskMetadata::default()).with_notify(json!("nope"));
        assert_eq!(odd.notify_config(), NotifyConfig::default());
    }

    #[test]
    fn test_task_round_trips_unknown_fields() {
        let task: TaskDefinition = serde_json::from_value(task_json()).unwrap();
        let back = serde_json::to_value(&task).unwrap();
        assert_eq!(back["provisionerId"], "proj-ci");
        assert_eq!(back["metadata"]["owner"], "ci@example.com");
    }
}
