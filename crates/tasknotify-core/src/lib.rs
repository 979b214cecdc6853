//! tasknotify Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/HTTP
//! - Template engines
//! - Runtime specifics
//!
//! Everything here describes task status events, the routing keys attached
//! to them and the channel payloads they turn into.

pub mod error;
pub mod event;
pub mod ids;
pub mod payload;
pub mod route;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use error::CoreError;
pub use event::{RunRecord, TaskEvent, TaskStatusRecord};
pub use ids::{TaskGroupId, TaskId};
pub use payload::{ChannelPayload, ChatMessage, ChatTarget, EmailLink, EmailMessage, PulseMessage};
pub use route::{ChannelKind, DeliveryCondition, Route, RouteParser};
pub use status::TaskState;
pub use task::{EmailNotifyConfig, NotifyConfig, TaskDefinition, TaskMetadata};
