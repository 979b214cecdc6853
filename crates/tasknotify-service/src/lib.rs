//! tasknotify Service Library
//!
//! Consumes task-resolution events, decides which notification routes
//! fire and fans the resulting payloads out to the delivery channels.

pub mod builder;
pub mod bus;
pub mod config;
pub mod dispatcher;
pub mod filter;
pub mod lookup;
pub mod metrics;
pub mod notifier;
pub mod render;
pub mod urls;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::{Links, PayloadBuilder};
pub use bus::{Delivery, Settlement};
pub use config::Config;
pub use dispatcher::{DispatchError, DispatchOutcome, Dispatcher};
pub use filter::EventFilter;
pub use lookup::{HttpTaskLookup, LookupError, StaticTaskLookup, TaskLookup};
pub use metrics::DispatchMetrics;
pub use notifier::{HttpNotifier, LogNotifier, NotifyError, Notifier};
pub use render::{JinjaEngine, RenderContext, RenderError, TemplateEngine, TemplateRenderer};
