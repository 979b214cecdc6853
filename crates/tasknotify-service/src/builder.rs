//! Channel payload builders.
//!
//! One builder per channel kind, each a pure function of the task
//! definition, its status and the parsed route.

use serde_json::Value;

use tasknotify_core::{
    ChannelKind, ChannelPayload, ChatMessage, ChatTarget, EmailLink, EmailMessage, PulseMessage,
    Route, TaskDefinition, TaskGroupId, TaskId, TaskStatusRecord,
};

use crate::render::{RenderContext, RenderError, TemplateRenderer};
use crate::urls;

/// Mail template used when the task does not pick one.
pub const DEFAULT_EMAIL_TEMPLATE: &str = "simple";

/// Text of the default email call-to-action link.
pub const DEFAULT_LINK_TEXT: &str = "Inspect Task";

/// Builds user-facing links below a deployment root URL.
#[derive(Debug, Clone)]
pub struct Links {
    root_url: String,
}

impl Links {
    pub fn new(root_url: impl Into<String>) -> Self {
        Self {
            root_url: root_url.into(),
        }
    }

    pub fn task(&self, task_id: &TaskId) -> String {
        urls::ui(&self.root_url, &format!("tasks/{task_id}"))
    }

    pub fn task_group(&self, task_group_id: &TaskGroupId) -> String {
        urls::ui(&self.root_url, &format!("groups/{task_group_id}/tasks"))
    }
}

/// Turns a matching route into the payload for its channel.
#[derive(Clone)]
pub struct PayloadBuilder {
    renderer: TemplateRenderer,
    links: Links,
}

impl PayloadBuilder {
    pub fn new(renderer: TemplateRenderer, links: Links) -> Self {
        Self { renderer, links }
    }

    /// Build the payload for `route`.
    ///
    /// Returns `Ok(None)` for channel kinds we cannot deliver to.
    pub fn build(
        &self,
        task: &TaskDefinition,
        status: &TaskStatusRecord,
        route: &Route,
    ) -> Result<Option<ChannelPayload>, RenderError> {
        let notify = task.notify_config();
        let target = route.target.clone();

        let payload = match &route.kind {
            ChannelKind::IrcUser => ChannelPayload::Irc(self.chat(
                task,
                status,
                ChatTarget::User(target),
                notify.irc_user_message.as_ref(),
            )?),
            ChannelKind::IrcChannel => ChannelPayload::Irc(self.chat(
                task,
                status,
                ChatTarget::Channel(target),
                notify.irc_channel_message.as_ref(),
            )?),
            ChannelKind::SlackUser => ChannelPayload::Slack(self.chat(
                task,
                status,
                ChatTarget::User(target),
                notify.slack_user_message.as_ref(),
            )?),
            ChannelKind::SlackChannel => ChannelPayload::Slack(self.chat(
                task,
                status,
                ChatTarget::Channel(target),
                notify.slack_channel_message.as_ref(),
            )?),
            ChannelKind::PulseRepublish => ChannelPayload::Pulse(self.pulse(status, target)?),
            ChannelKind::Email => ChannelPayload::Email(self.email(task, status, target)?),
            ChannelKind::Unrecognized(_) => return Ok(None),
        };

        Ok(Some(payload))
    }

    /// The one-line status summary used by IRC and Slack.
    pub fn default_chat_message(&self, task: &TaskDefinition, status: &TaskStatusRecord) -> String {
        format!(
            "Task \"{}\" complete with status '{}'. Inspect: {}",
            task.metadata.name,
            status.state,
            self.links.task(&status.task_id)
        )
    }

    fn chat(
        &self,
        task: &TaskDefinition,
        status: &TaskStatusRecord,
        target: ChatTarget,
        template: Option<&Value>,
    ) -> Result<ChatMessage, RenderError> {
        let message = match template {
            Some(template) => self
                .renderer
                .render_text(template, &RenderContext::new(task, status))?,
            None => self.default_chat_message(task, status),
        };
        Ok(ChatMessage { target, message })
    }

    fn pulse(
        &self,
        status: &TaskStatusRecord,
        routing_key: String,
    ) -> Result<PulseMessage, RenderError> {
        // A record read off the bus serializes back to the exact document received.
        let message = serde_json::to_value(status).map_err(|e| RenderError::Fatal(e.to_string()))?;
        Ok(PulseMessage {
            routing_key,
            message,
        })
    }

    /// The default multi-line markdown body of an email.
    pub fn default_email_content(&self, task: &TaskDefinition, status: &TaskStatusRecord) -> String {
        let run_count = status.run_count();
        // Starts at `Task [` and ends at the source line, with no surrounding
        // blank lines or indentation. The group link points at the task's
        // group id.
        format!(
            "Task [`{task_id}`]({href}) in task-group [`{group_id}`]({group_href}) is complete.\n\
             \n\
             **Status:** {state} (in {run_count} run{plural})\n\
             **Name:** {name}\n\
             **Description:** {description}\n\
             **Owner:** {owner}\n\
             **Source:** {source}",
            task_id = status.task_id,
            href = self.links.task(&status.task_id),
            group_id = task.task_group_id,
            group_href = self.links.task_group(&task.task_group_id),
            state = status.state,
            plural = if run_count == 1 { "" } else { "s" },
            name = task.metadata.name,
            description = task.metadata.description,
            owner = task.metadata.owner,
            source = task.metadata.source,
        )
    }

    pub fn default_email_subject(&self, task: &TaskDefinition, status: &TaskStatusRecord) -> String {
        format!(
            "Task {}: {} - {}",
            status.state, task.metadata.name, status.task_id
        )
    }

    fn email(
        &self,
        task: &TaskDefinition,
        status: &TaskStatusRecord,
        address: String,
    ) -> Result<EmailMessage, RenderError> {
        let mut email = EmailMessage {
            address,
            content: self.default_email_content(task, status),
            subject: self.default_email_subject(task, status),
            link: EmailLink {
                text: DEFAULT_LINK_TEXT.to_string(),
                href: self.links.task(&status.task_id),
            },
            template: DEFAULT_EMAIL_TEMPLATE.to_string(),
        };

        let Some(overrides) = task.notify_config().email else {
            return Ok(email);
        };
        let ctx = RenderContext::new(task, status);

        if let Some(content) = &overrides.content {
            email.content = self.renderer.render_text(content, &ctx)?;
        }
        if let Some(subject) = &overrides.subject {
            email.subject = self.renderer.render_text(subject, &ctx)?;
        }
        // Link and template are not message text: no fallback, errors propagate.
        if let Some(link) = &overrides.link {
            let rendered = self.renderer.evaluate(link, &ctx)?;
            email.link =
                serde_json::from_value(rendered).map_err(|e| RenderError::InvalidOverride {
                    field: "link",
                    reason: e.to_string(),
                })?;
        }
        if let Some(template) = &overrides.template {
            email.template = match self.renderer.evaluate(template, &ctx)? {
                Value::String(name) => name,
                other => {
                    return Err(RenderError::InvalidOverride {
                        field: "template",
                        reason: format!("expected a string, got {other}"),
                    })
                }
            };
        }

        Ok(email)
    }
}
