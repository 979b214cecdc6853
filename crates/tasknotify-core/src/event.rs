//! Task status records and the bus events that carry them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{TaskId, TaskState};

/// One run of a task, as reported in its status record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    /// Index of the run within the task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<u32>,

    /// State of this run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<TaskState>,

    /// Why the run was created (scheduled, retry, rerun, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_created: Option<String>,

    /// Why the run was resolved, once it is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_resolved: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<DateTime<Utc>>,

    /// Fields we do not interpret (worker group, worker id, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RunRecord {
    /// Create a run record in the given state.
    pub fn new(run_id: u32, state: TaskState) -> Self {
        Self {
            run_id: Some(run_id),
            state: Some(state),
            reason_created: None,
            reason_resolved: None,
            scheduled: None,
            started: None,
            resolved: None,
            extra: Map::new(),
        }
    }

    /// Builder method to set the resolution reason.
    pub fn resolved_because(mut self, reason: impl Into<String>) -> Self {
        self.reason_resolved = Some(reason.into());
        self
    }
}

/// Status of a task at the moment it reached a terminal state.
///
/// A record read off the bus keeps the JSON it arrived as, and serializes
/// back to exactly that document. Records built in code serialize from
/// their fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct TaskStatusRecord {
    pub task_id: TaskId,

    pub state: TaskState,

    /// Runs in creation order.
    pub runs: Vec<RunRecord>,

    /// Fields we do not interpret.
    pub extra: Map<String, Value>,

    received: Option<Value>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusFields {
    task_id: TaskId,
    state: TaskState,
    #[serde(default)]
    runs: Vec<RunRecord>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl TryFrom<Value> for TaskStatusRecord {
    type Error = serde_json::Error;

    fn try_from(raw: Value) -> Result<Self, Self::Error> {
        let fields = StatusFields::deserialize(&raw)?;
        Ok(Self {
            task_id: fields.task_id,
            state: fields.state,
            runs: fields.runs,
            extra: fields.extra,
            received: Some(raw),
        })
    }
}

impl From<TaskStatusRecord> for Value {
    fn from(record: TaskStatusRecord) -> Self {
        if let Some(raw) = record.received {
            return raw;
        }
        let fields = StatusFields {
            task_id: record.task_id,
            state: record.state,
            runs: record.runs,
            extra: record.extra,
        };
        // Plain strings, numbers and maps only; this cannot fail.
        serde_json::to_value(fields).unwrap_or(Value::Null)
    }
}

impl TaskStatusRecord {
    /// Create a status record with no runs.
    pub fn new(task_id: impl Into<TaskId>, state: TaskState) -> Self {
        Self {
            task_id: task_id.into(),
            state,
            runs: Vec::new(),
            extra: Map::new(),
            received: None,
        }
    }

    /// Builder method to append a run.
    pub fn with_run(mut self, run: RunRecord) -> Self {
        self.runs.push(run);
        self.received = None;
        self
    }

    /// Builder method to set an uninterpreted field.
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self.received = None;
        self
    }

    /// The JSON document this record was read from, if it came off the wire.
    pub fn received(&self) -> Option<&Value> {
        self.received.as_ref()
    }

    /// Get the most recent run, if any.
    pub fn latest_run(&self) -> Option<&RunRecord> {
        self.runs.last()
    }

    pub fn run_count(&self) -> usize {
        self.runs.len()
    }
}

/// A task-resolution message as delivered by the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub status: TaskStatusRecord,

    /// Routing keys the task was published with.
    #[serde(default)]
    pub routes: Vec<String>,
}

impl TaskEvent {
    pub fn new(status: TaskStatusRecord, routes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            status,
            routes: routes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.status.task_id
    }

    pub fn state(&self) -> TaskState {
        self.status.state
    }
}
