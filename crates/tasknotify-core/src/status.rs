//! Task state enum.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// State of a Task as reported by the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Task exists but has unresolved dependencies.
    #[default]
    Unscheduled,
    /// Task is waiting for a worker.
    Pending,
    /// A run of the task is executing.
    Running,
    /// Task completed successfully.
    Completed,
    /// Task ran and failed.
    Failed,
    /// Task was resolved for a reason other than its own outcome
    /// (canceled, deadline exceeded, worker shutdown, ...).
    Exception,
}

impl TaskState {
    /// All states, in lifecycle order.
    pub const ALL: [TaskState; 6] = [
        Self::Unscheduled,
        Self::Pending,
        Self::Running,
        Self::Completed,
        Self::Failed,
        Self::Exception,
    ];

    /// Returns true if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Exception)
    }

    /// Wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unscheduled => "unscheduled",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Exception => "exception",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| CoreError::InvalidState(s.to_string()))
    }
}
