//! Event filter - drops events nobody should be told about.

use std::collections::BTreeSet;

use tasknotify_core::{TaskState, TaskStatusRecord};

/// Resolution reasons suppressed when none are configured. A canceled task
/// was a deliberate user action.
pub const DEFAULT_SUPPRESSED_REASONS: &[&str] = &["canceled"];

/// Decides whether an event is suppressed before any routing happens.
#[derive(Debug, Clone)]
pub struct EventFilter {
    suppressed_reasons: BTreeSet<String>,
}

impl EventFilter {
    /// Create a filter suppressing exceptions resolved for any of `reasons`.
    pub fn new(reasons: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            suppressed_reasons: reasons.into_iter().map(Into::into).collect(),
        }
    }

    pub fn suppressed_reasons(&self) -> &BTreeSet<String> {
        &self.suppressed_reasons
    }

    /// The resolution reason that suppresses this status, if any.
    ///
    /// Only the exception state is ever suppressed, and only on the reason
    /// of the most recent run.
    pub fn suppression_reason<'a>(&self, status: &'a TaskStatusRecord) -> Option<&'a str> {
        if status.state != TaskState::Exception {
            return None;
        }
        status
            .latest_run()
            .and_then(|run| run.reason_resolved.as_deref())
            .filter(|reason| self.suppressed_reasons.contains(*reason))
    }

    pub fn should_suppress(&self, status: &TaskStatusRecord) -> bool {
        self.suppression_reason(status).is_some()
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::new(DEFAULT_SUPPRESSED_REASONS.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasknotify_core::RunRecord;

    fn status(state: TaskState, reasons: &[&str]) -> TaskStatusRecord {
        reasons
            .iter()
            .enumerate()
            .fold(TaskStatusRecord::new("T1", state), |status, (i, reason)| {
                status.with_run(RunRecord::new(i as u32, state).resolved_because(*reason))
            })
    }

    #[test]
    fn test_suppresses_exception_with_listed_reason() {
        let filter = EventFilter::new(["canceled", "deadline-exceeded"]);

        assert!(filter.should_suppress(&status(TaskState::Exception, &["canceled"])));
        assert!(filter.should_suppress(&status(TaskState::Exception, &["deadline-exceeded"])));
        assert!(!filter.should_suppress(&status(TaskState::Exception, &["worker-shutdown"])));
    }

    #[test]
    fn test_only_latest_run_counts() {
        let filter = EventFilter::default();

        assert!(!filter.should_suppress(&status(
            TaskState::Exception,
            &["canceled", "worker-shutdown"]
        )));
        assert_eq!(
            filter.suppression_reason(&status(TaskState::Exception, &["worker-shutdown", "canceled"])),
            Some("canceled")
        );
    }

    #[test]
    fn test_other_states_never_suppressed() {
        let filter = EventFilter::new(["canceled", "failed"]);

        assert!(!filter.should_suppress(&status(TaskState::Failed, &["canceled"])));
        assert!(!filter.should_suppress(&status(TaskState::Completed, &["canceled"])));
    }

    #[test]
    fn test_exception_without_runs_not_suppressed() {
        let filter = EventFilter::default();
        assert!(!filter.should_suppress(&TaskStatusRecord::new("T1", TaskState::Exception)));
    }
}
