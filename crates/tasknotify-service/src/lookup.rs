//! Task definition lookup.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

use tasknotify_core::{TaskDefinition, TaskId};

use crate::urls;

/// Lookup errors. All of them fail the event.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("Queue returned HTTP {status} for task {task_id}")]
    Status { task_id: TaskId, status: u16 },

    #[error("Queue request failed: {0}")]
    Transport(String),

    #[error("Malformed task definition: {0}")]
    Decode(String),

    #[error("Failed to load task definitions from '{path}': {reason}")]
    Load { path: String, reason: String },
}

/// Resolves a task id to its definition.
#[async_trait]
pub trait TaskLookup: Send + Sync {
    async fn task(&self, task_id: &TaskId) -> Result<TaskDefinition, LookupError>;
}

/// Fetches task definitions from the queue service over HTTP.
pub struct HttpTaskLookup {
    client: reqwest::Client,
    root_url: String,
}

impl HttpTaskLookup {
    pub fn new(root_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), root_url)
    }

    pub fn with_client(client: reqwest::Client, root_url: impl Into<String>) -> Self {
        Self {
            client,
            root_url: root_url.into(),
        }
    }
}

#[async_trait]
impl TaskLookup for HttpTaskLookup {
    async fn task(&self, task_id: &TaskId) -> Result<TaskDefinition, LookupError> {
        let url = urls::api(&self.root_url, "queue", "v1", &format!("task/{task_id}"));
        debug!(task_id = %task_id, url = %url, "Fetching task definition");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LookupError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(LookupError::NotFound(task_id.clone())),
            status if !status.is_success() => Err(LookupError::Status {
                task_id: task_id.clone(),
                status: status.as_u16(),
            }),
            _ => response
                .json::<TaskDefinition>()
                .await
                .map_err(|e| LookupError::Decode(e.to_string())),
        }
    }
}

/// Serves task definitions from memory; used for local runs and replays.
#[derive(Debug, Default, Clone)]
pub struct StaticTaskLookup {
    tasks: HashMap<TaskId, TaskDefinition>,
}

impl StaticTaskLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to register a task.
    pub fn with_task(mut self, task_id: impl Into<TaskId>, task: TaskDefinition) -> Self {
        self.tasks.insert(task_id.into(), task);
        self
    }

    /// Load a JSON object mapping task ids to task definitions.
    pub fn from_file(path: &Path) -> Result<Self, LookupError> {
        let load_error = |reason: String| LookupError::Load {
            path: path.display().to_string(),
            reason,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
        let tasks: HashMap<TaskId, TaskDefinition> =
            serde_json::from_str(&raw).map_err(|e| load_error(e.to_string()))?;
        Ok(Self { tasks })
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[async_trait]
impl TaskLookup for StaticTaskLookup {
    async fn task(&self, task_id: &TaskId) -> Result<TaskDefinition, LookupError> {
        self.tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| LookupError::NotFound(task_id.clone()))
    }
}
