//! Dispatcher - turns one task event into notifications.
//!
//! Per event: filter, match every routing key independently, look up the
//! task, build one payload per matching route and submit them all
//! concurrently. Sends that already succeeded are not undone when a sibling
//! fails; the event as a whole is reported failed and a redelivery may
//! repeat them.

use std::sync::Arc;

use futures_util::future::join_all;
use thiserror::Error;
use tracing::{debug, info, warn};

use tasknotify_core::{
    ChannelKind, Route, RouteParser, TaskDefinition, TaskEvent, TaskId, TaskStatusRecord,
};

use crate::builder::PayloadBuilder;
use crate::filter::EventFilter;
use crate::lookup::{LookupError, TaskLookup};
use crate::metrics::DispatchMetrics;
use crate::notifier::{NotifyError, Notifier};
use crate::render::RenderError;

/// Why a single route did not deliver.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Notify(#[from] NotifyError),
}

/// A failed route together with what it was addressed to.
#[derive(Debug, Error)]
#[error("{kind} notification to '{target}' failed: {source}")]
pub struct RouteFailure {
    pub kind: ChannelKind,
    pub target: String,
    #[source]
    pub source: RouteError,
}

/// Dispatcher errors. Any of them means the event should be redelivered.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Failed to load task {task_id}: {source}")]
    Lookup {
        task_id: TaskId,
        #[source]
        source: LookupError,
    },

    #[error("{failed} of {attempted} notifications failed for task {task_id}")]
    Delivery {
        task_id: TaskId,
        attempted: usize,
        failed: usize,
        #[source]
        first: Box<RouteFailure>,
    },
}

/// Terminal state of a successfully processed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Suppressed before routing.
    FilteredOut,
    /// Every matching route delivered; `sent` may be zero.
    Delivered { sent: usize },
}

/// Orchestrates filtering, route matching, payload building and delivery.
pub struct Dispatcher {
    filter: EventFilter,
    parser: RouteParser,
    builder: PayloadBuilder,
    lookup: Arc<dyn TaskLookup>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<DispatchMetrics>,
}

impl Dispatcher {
    pub fn new(
        filter: EventFilter,
        parser: RouteParser,
        builder: PayloadBuilder,
        lookup: Arc<dyn TaskLookup>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            filter,
            parser,
            builder,
            lookup,
            notifier,
            metrics: Arc::new(DispatchMetrics::new()),
        }
    }

    /// Builder method to share a metrics registry.
    pub fn with_metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<DispatchMetrics> {
        &self.metrics
    }

    /// Routes of `event` that fire for its state, in routing-key order.
    ///
    /// Keys that do not parse and unknown channel kinds are skipped.
    pub fn matching_routes(&self, event: &TaskEvent) -> Vec<Route> {
        let state = event.state();
        let mut routes = Vec::new();

        for key in &event.routes {
            let Some(route) = self.parser.parse(key) else {
                debug!(routing_key = %key, "Ignoring routing key");
                continue;
            };
            if let ChannelKind::Unrecognized(kind) = &route.kind {
                debug!(routing_key = %key, kind = %kind, "Ignoring unknown channel kind");
                continue;
            }
            if route.fires_for(state) {
                routes.push(route);
            }
        }

        routes
    }

    /// Process one event.
    pub async fn handle(&self, event: &TaskEvent) -> Result<DispatchOutcome, DispatchError> {
        self.metrics.record_received();
        let result = self.process(event).await;

        match &result {
            Ok(DispatchOutcome::FilteredOut) => self.metrics.record_filtered(),
            Ok(DispatchOutcome::Delivered { .. }) => self.metrics.record_delivered(),
            Err(_) => self.metrics.record_failed(),
        }
        result
    }

    async fn process(&self, event: &TaskEvent) -> Result<DispatchOutcome, DispatchError> {
        let status = &event.status;
        let task_id = &status.task_id;

        if let Some(reason) = self.filter.suppression_reason(status) {
            info!(task_id = %task_id, reason = %reason, "Suppressing notifications");
            return Ok(DispatchOutcome::FilteredOut);
        }

        let routes = self.matching_routes(event);
        if routes.is_empty() {
            debug!(task_id = %task_id, state = %status.state, "No matching routes");
            return Ok(DispatchOutcome::Delivered { sent: 0 });
        }

        let task = self
            .lookup
            .task(task_id)
            .await
            .map_err(|source| DispatchError::Lookup {
                task_id: task_id.clone(),
                source,
            })?;

        let attempts = routes
            .iter()
            .map(|route| self.deliver(&task, status, route));
        let results = join_all(attempts).await;

        let attempted = results.len();
        let mut sent = 0;
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(true) => sent += 1,
                Ok(false) => {}
                Err(failure) => {
                    warn!(task_id = %task_id, error = %failure, "Notification failed");
                    self.metrics.record_notification_failed();
                    failures.push(failure);
                }
            }
        }

        let failed = failures.len();
        match failures.into_iter().next() {
            None => {
                info!(task_id = %task_id, state = %status.state, sent, "Notifications delivered");
                Ok(DispatchOutcome::Delivered { sent })
            }
            Some(first) => Err(DispatchError::Delivery {
                task_id: task_id.clone(),
                attempted,
                failed,
                first: Box::new(first),
            }),
        }
    }

    /// Build and submit the payload for one route. `Ok(false)` means the
    /// route produced no payload.
    async fn deliver(
        &self,
        task: &TaskDefinition,
        status: &TaskStatusRecord,
        route: &Route,
    ) -> Result<bool, RouteFailure> {
        let failure = |source: RouteError| RouteFailure {
            kind: route.kind.clone(),
            target: route.target.clone(),
            source,
        };

        let payload = self
            .builder
            .build(task, status, route)
            .map_err(|e| failure(e.into()))?;
        let Some(payload) = payload else {
            return Ok(false);
        };

        self.notifier
            .send(&payload)
            .await
            .map_err(|e| failure(e.into()))?;
        self.metrics.record_sent(payload.channel());
        debug!(
            task_id = %status.task_id,
            channel = payload.channel(),
            target = %route.target,
            "Notification submitted"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tasknotify_core::{
        ChannelPayload, ChatMessage, ChatTarget, RunRecord, TaskMetadata, TaskState,
    };

    use crate::builder::Links;
    use crate::lookup::StaticTaskLookup;
    use crate::render::TemplateRenderer;
    use crate::testing::RecordingNotifier;

    const ROOT_URL: &str = "https://tc.example.com";

    fn task() -> TaskDefinition {
        TaskDefinition::new("G1", TaskMetadata::new("nightly", "desc", "owner", "src"))
    }

    fn dispatcher_with(
        task: TaskDefinition,
        notifier: Arc<RecordingNotifier>,
    ) -> Dispatcher {
        Dispatcher::new(
            EventFilter::new(["canceled", "deadline-exceeded"]),
            RouteParser::new("notify"),
            PayloadBuilder::new(TemplateRenderer::default(), Links::new(ROOT_URL)),
            Arc::new(StaticTaskLookup::new().with_task("T1", task)),
            notifier,
        )
    }

    fn event(state: TaskState, reason: &str, routes: &[&str]) -> TaskEvent {
        let status = TaskStatusRecord::new("T1", state)
            .with_run(RunRecord::new(0, state).resolved_because(reason));
        TaskEvent::new(status, routes.iter().copied())
    }

    #[tokio::test]
    async fn test_irc_channel_scenario() {
        let notifier = Arc::new(RecordingNotifier::new());
        let dispatcher = dispatcher_with(task(), notifier.clone());

        let outcome = dispatcher
            .handle(&event(
                TaskState::Failed,
                "worker-shutdown",
                &["notify.x.irc-channel.ops.on-failed"],
            ))
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Delivered { sent: 1 });
        assert_eq!(
            notifier.sent(),
            vec![ChannelPayload::Irc(ChatMessage {
                target: ChatTarget::Channel("ops".to_string()),
                message: "Task \"nightly\" complete with status 'failed'. \
                          Inspect: https://tc.example.com/tasks/T1"
                    .to_string(),
            })]
        );
    }

    #[tokio::test]
    async fn test_only_matching_route_fires() {
        let notifier = Arc::new(RecordingNotifier::new());
        let dispatcher = dispatcher_with(task(), notifier.clone());

        let outcome = dispatcher
            .handle(&event(
                TaskState::Failed,
                "failed",
                &[
                    "notify.x.irc-user.alice.on-completed",
                    "notify.x.slack-user.bob.on-failed",
                ],
            ))
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Delivered { sent: 1 });
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(matches!(
            &sent[0],
            ChannelPayload::Slack(ChatMessage { target: ChatTarget::User(u), .. }) if u == "bob"
        ));
    }

    #[tokio::test]
    async fn test_every_matching_route_is_dispatched() {
        let notifier = Arc::new(RecordingNotifier::new());
        let dispatcher = dispatcher_with(task(), notifier.clone());

        let outcome = dispatcher
            .handle(&event(
                TaskState::Completed,
                "completed",
                &[
                    "notify.x.irc-user.alice.on-any",
                    "notify.x.email.a@b.com.on-completed",
                    "notify.x.pulse.project.done.on-any",
                ],
            ))
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Delivered { sent: 3 });
        let mut channels: Vec<_> = notifier.sent().iter().map(|p| p.channel()).collect();
        channels.sort_unstable();
        assert_eq!(channels, vec!["email", "irc", "pulse"]);
    }

    #[tokio::test]
    async fn test_suppressed_exception_builds_nothing() {
        let notifier = Arc::new(RecordingNotifier::new());
        // No task registered: a lookup would fail the event.
        let dispatcher = Dispatcher::new(
            EventFilter::new(["canceled"]),
            RouteParser::new("notify"),
            PayloadBuilder::new(TemplateRenderer::default(), Links::new(ROOT_URL)),
            Arc::new(StaticTaskLookup::new()),
            notifier.clone(),
        );

        let outcome = dispatcher
            .handle(&event(
                TaskState::Exception,
                "canceled",
                &["notify.x.irc-user.alice.on-any", "notify.x.email.a@b.on-exception"],
            ))
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::FilteredOut);
        assert!(notifier.sent().is_empty());
        assert_eq!(dispatcher.metrics().events_filtered(), 1);
    }

    #[tokio::test]
    async fn test_unsuppressed_exception_is_delivered() {
        let notifier = Arc::new(RecordingNotifier::new());
        let dispatcher = dispatcher_with(task(), notifier.clone());

        let outcome = dispatcher
            .handle(&event(
                TaskState::Exception,
                "worker-shutdown",
                &["notify.x.irc-user.alice.on-exception"],
            ))
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Delivered { sent: 1 });
    }

    #[tokio::test]
    async fn test_unknown_kind_and_foreign_keys_ignored() {
        let notifier = Arc::new(RecordingNotifier::new());
        let dispatcher = Dispatcher::new(
            EventFilter::default(),
            RouteParser::new("notify"),
            PayloadBuilder::new(TemplateRenderer::default(), Links::new(ROOT_URL)),
            Arc::new(StaticTaskLookup::new()),
            notifier.clone(),
        );

        let outcome = dispatcher
            .handle(&event(
                TaskState::Failed,
                "failed",
                &["notify.x.webhook.hooks.on-any", "index.project.latest", "notify.short"],
            ))
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Delivered { sent: 0 });
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_failure_fails_event() {
        let notifier = Arc::new(RecordingNotifier::new());
        let dispatcher = Dispatcher::new(
            EventFilter::default(),
            RouteParser::new("notify"),
            PayloadBuilder::new(TemplateRenderer::default(), Links::new(ROOT_URL)),
            Arc::new(StaticTaskLookup::new()),
            notifier.clone(),
        );

        let err = dispatcher
            .handle(&event(TaskState::Failed, "failed", &["notify.x.irc-user.a.on-any"]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Lookup {
                source: LookupError::NotFound(_),
                ..
            }
        ));
        assert_eq!(dispatcher.metrics().events_failed(), 1);
    }

    #[tokio::test]
    async fn test_malformed_email_link_fails_event() {
        let notifier = Arc::new(RecordingNotifier::new());
        let task = task().with_notify(json!({
            "email": {"link": {"text": "x", "href": "{{ status.taskId "}}
        }));
        let dispatcher = dispatcher_with(task, notifier.clone());

        let err = dispatcher
            .handle(&event(
                TaskState::Failed,
                "failed",
                &["notify.x.email.a@b.com.on-failed", "notify.x.irc-user.alice.on-failed"],
            ))
            .await
            .unwrap_err();

        match err {
            DispatchError::Delivery {
                attempted,
                failed,
                first,
                ..
            } => {
                assert_eq!(attempted, 2);
                assert_eq!(failed, 1);
                assert_eq!(first.kind, ChannelKind::Email);
                assert!(matches!(first.source, RouteError::Render(RenderError::Authoring { .. })));
            }
            other => panic!("Expected Delivery error, got {other:?}"),
        }
        // The sibling route was still delivered; nothing is rolled back.
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_broken_message_template_does_not_block_others() {
        let notifier = Arc::new(RecordingNotifier::new());
        let task = task().with_notify(json!({"ircUserMessage": "{{ broken"}));
        let dispatcher = dispatcher_with(task, notifier.clone());

        let outcome = dispatcher
            .handle(&event(
                TaskState::Failed,
                "failed",
                &["notify.x.irc-user.alice.on-any", "notify.x.slack-channel.dev.on-any"],
            ))
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Delivered { sent: 2 });
        let degraded = notifier
            .sent()
            .into_iter()
            .find_map(|p| match p {
                ChannelPayload::Irc(msg) => Some(msg.message),
                _ => None,
            })
            .unwrap();
        assert!(degraded.starts_with("Error parsing custom message:"));
    }

    #[tokio::test]
    async fn test_delivery_failure_is_partial() {
        let notifier = Arc::new(RecordingNotifier::failing_on("slack"));
        let dispatcher = dispatcher_with(task(), notifier.clone());

        let err = dispatcher
            .handle(&event(
                TaskState::Completed,
                "completed",
                &["notify.x.slack-user.bob.on-any", "notify.x.irc-user.alice.on-any"],
            ))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Delivery { attempted: 2, failed: 1, .. }
        ));
        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(notifier.sent()[0].channel(), "irc");
    }
}
