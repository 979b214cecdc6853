//! Service configuration.

use std::collections::BTreeSet;
use std::path::PathBuf;

use thiserror::Error;

use tasknotify_core::RouteParser;

use crate::builder::Links;
use crate::filter::{EventFilter, DEFAULT_SUPPRESSED_REASONS};

/// Configuration errors, reported before anything starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Root URL must be an http(s) URL, got '{0}'")]
    InvalidRootUrl(String),

    #[error("Route prefix must be non-empty dot-separated segments, got '{0}'")]
    InvalidRoutePrefix(String),

    #[error("Prefetch must be at least 1")]
    ZeroPrefetch,
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Deployment root URL; links and API calls are built below it.
    pub root_url: String,

    /// Prefix routing keys are addressed under (e.g. `notify`).
    pub route_prefix: String,

    /// Resolution reasons that suppress notifications for exceptions.
    pub ignore_task_reason_resolved: BTreeSet<String>,

    /// Maximum number of events processed concurrently.
    pub prefetch: usize,

    /// Log payloads instead of sending them.
    pub dry_run: bool,

    /// Serve task definitions from a JSON file instead of the queue.
    pub tasks_file: Option<PathBuf>,

    /// Notification gateway; defaults to the deployment's notify API.
    pub notify_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_url: "http://localhost:8080".to_string(),
            route_prefix: "notify".to_string(),
            ignore_task_reason_resolved: DEFAULT_SUPPRESSED_REASONS
                .iter()
                .map(|r| r.to_string())
                .collect(),
            prefetch: 16,
            dry_run: false,
            tasks_file: None,
            notify_url: None,
        }
    }
}

impl Config {
    /// Check values that would otherwise fail at the first event.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.root_url.starts_with("http://") || self.root_url.starts_with("https://")) {
            return Err(ConfigError::InvalidRootUrl(self.root_url.clone()));
        }
        if self.route_prefix.split('.').any(str::is_empty) {
            return Err(ConfigError::InvalidRoutePrefix(self.route_prefix.clone()));
        }
        if self.prefetch == 0 {
            return Err(ConfigError::ZeroPrefetch);
        }
        Ok(())
    }

    pub fn event_filter(&self) -> EventFilter {
        EventFilter::new(self.ignore_task_reason_resolved.iter().cloned())
    }

    pub fn route_parser(&self) -> RouteParser {
        RouteParser::new(self.route_prefix.clone())
    }

    pub fn links(&self) -> Links {
        Links::new(self.root_url.clone())
    }
}
