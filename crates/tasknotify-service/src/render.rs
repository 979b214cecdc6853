//! Template rendering for user-supplied notification content.
//!
//! Task owners can customise messages through templates in
//! `task.extra.notify`. A broken template must only degrade the message of
//! its own channel, so authoring errors are turned into a readable fallback
//! string by [`TemplateRenderer::render_message`]. Anything else the engine
//! reports is a fault on our side and propagates.

use std::sync::Arc;

use minijinja::{Environment, ErrorKind, UndefinedBehavior};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use tasknotify_core::{TaskDefinition, TaskStatusRecord};

/// Prefix of the message substituted for a template that failed to render.
pub const FALLBACK_PREFIX: &str = "Error parsing custom message";

/// Classes of mistakes a template author can make.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthoringErrorKind {
    /// The template does not parse.
    Syntax,
    /// A filter, test, function or method that does not exist.
    UnresolvedBuiltin,
    /// Evaluation failed: undefined value, bad operand, wrong arity.
    Interpreter,
    /// Any other template-level problem.
    Template,
}

/// Errors reported by a [`TemplateEngine`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// The template itself is wrong.
    #[error("{detail}")]
    Authoring {
        kind: AuthoringErrorKind,
        detail: String,
    },

    /// The engine failed for a reason unrelated to the template text.
    #[error("template engine fault: {0}")]
    Fatal(String),
}

/// Evaluates a structured template against a JSON context.
pub trait TemplateEngine: Send + Sync {
    fn evaluate(&self, template: &Value, context: &Value) -> Result<Value, EngineError>;
}

/// [`TemplateEngine`] backed by minijinja.
///
/// String leaves are rendered as jinja templates, arrays and objects are
/// rendered element by element (object keys are kept as they are) and all
/// other scalars pass through. Undefined variables are errors.
pub struct JinjaEngine {
    env: Environment<'static>,
}

impl JinjaEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self { env }
    }

    fn render_str(&self, source: &str, context: &Value) -> Result<String, EngineError> {
        self.env.render_str(source, context).map_err(classify)
    }
}

impl Default for JinjaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine for JinjaEngine {
    fn evaluate(&self, template: &Value, context: &Value) -> Result<Value, EngineError> {
        match template {
            Value::String(source) => self.render_str(source, context).map(Value::String),
            Value::Array(items) => items
                .iter()
                .map(|item| self.evaluate(item, context))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(fields) => fields
                .iter()
                .map(|(key, value)| Ok((key.clone(), self.evaluate(value, context)?)))
                .collect::<Result<Map<_, _>, EngineError>>()
                .map(Value::Object),
            scalar => Ok(scalar.clone()),
        }
    }
}

fn classify(err: minijinja::Error) -> EngineError {
    let kind = match err.kind() {
        ErrorKind::SyntaxError | ErrorKind::BadEscape => AuthoringErrorKind::Syntax,
        ErrorKind::UnknownFilter
        | ErrorKind::UnknownTest
        | ErrorKind::UnknownFunction
        | ErrorKind::UnknownMethod => AuthoringErrorKind::UnresolvedBuiltin,
        ErrorKind::UndefinedError
        | ErrorKind::InvalidOperation
        | ErrorKind::MissingArgument
        | ErrorKind::TooManyArguments
        | ErrorKind::CannotUnpack
        | ErrorKind::NonKey
        | ErrorKind::NonPrimitive => AuthoringErrorKind::Interpreter,
        ErrorKind::TemplateNotFound => AuthoringErrorKind::Template,
        _ => return EngineError::Fatal(err.to_string()),
    };
    EngineError::Authoring {
        kind,
        detail: err.to_string(),
    }
}

/// Rendering errors surfaced to payload builders.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A template that is not allowed to fall back was malformed.
    #[error("template error ({kind:?}): {detail}")]
    Authoring {
        kind: AuthoringErrorKind,
        detail: String,
    },

    /// Unexpected engine or context failure.
    #[error("template engine fault: {0}")]
    Fatal(String),

    /// A rendered override does not have the required shape.
    #[error("invalid {field} override: {reason}")]
    InvalidOverride { field: &'static str, reason: String },
}

impl From<EngineError> for RenderError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Authoring { kind, detail } => Self::Authoring { kind, detail },
            EngineError::Fatal(detail) => Self::Fatal(detail),
        }
    }
}

/// Data templates can reference: `task.*` and `status.*`.
#[derive(Debug, Serialize)]
pub struct RenderContext<'a> {
    pub task: &'a TaskDefinition,
    pub status: &'a TaskStatusRecord,
}

impl<'a> RenderContext<'a> {
    pub fn new(task: &'a TaskDefinition, status: &'a TaskStatusRecord) -> Self {
        Self { task, status }
    }

    fn to_value(&self) -> Result<Value, RenderError> {
        serde_json::to_value(self).map_err(|e| RenderError::Fatal(e.to_string()))
    }
}

/// Renders task templates through an injected [`TemplateEngine`].
#[derive(Clone)]
pub struct TemplateRenderer {
    engine: Arc<dyn TemplateEngine>,
}

impl TemplateRenderer {
    pub fn new(engine: Arc<dyn TemplateEngine>) -> Self {
        Self { engine }
    }

    /// Render message content, recovering from authoring errors.
    ///
    /// A malformed template yields `Error parsing custom message: <detail>`
    /// instead of an error. Fatal engine errors still propagate.
    pub fn render_message(
        &self,
        template: &Value,
        context: &RenderContext<'_>,
    ) -> Result<Value, RenderError> {
        match self.engine.evaluate(template, &context.to_value()?) {
            Ok(rendered) => Ok(rendered),
            Err(EngineError::Authoring { kind, detail }) => {
                debug!(?kind, detail = %detail, "Custom message failed to render");
                Ok(Value::String(format!("{FALLBACK_PREFIX}: {detail}")))
            }
            Err(err @ EngineError::Fatal(_)) => Err(err.into()),
        }
    }

    /// Like [`render_message`](Self::render_message) but always yields text.
    /// Structured results are serialized as JSON.
    pub fn render_text(
        &self,
        template: &Value,
        context: &RenderContext<'_>,
    ) -> Result<String, RenderError> {
        Ok(into_text(self.render_message(template, context)?))
    }

    /// Evaluate a template with no recovery: authoring errors propagate.
    pub fn evaluate(
        &self,
        template: &Value,
        context: &RenderContext<'_>,
    ) -> Result<Value, RenderError> {
        Ok(self.engine.evaluate(template, &context.to_value()?)?)
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new(Arc::new(JinjaEngine::new()))
    }
}

fn into_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}
