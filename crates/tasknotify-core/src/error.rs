//! Core domain errors.

use thiserror::Error;

/// Core domain errors for tasknotify.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Unknown task state name.
    #[error("Invalid task state: {0}")]
    InvalidState(String),
}
