//! Routing-key grammar.
//!
//! A routing key looks like
//! `<prefix>.<anything>.<channel-kind>.<target segments...>.on-<condition>`,
//! for example `notify.ci.irc-channel.ops.on-failed` or
//! `notify.ci.email.dev.team@example.com.on-any`.

use std::fmt;

use crate::TaskState;

/// Marker in front of the condition in the last segment.
const CONDITION_MARKER: &str = "on-";

/// Condition value that fires for every terminal state.
const ANY_CONDITION: &str = "any";

/// Channel a route delivers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    IrcUser,
    IrcChannel,
    SlackUser,
    SlackChannel,
    /// Republish the status record on the bus under a new routing key.
    PulseRepublish,
    Email,
    /// A segment we do not know how to deliver to. Skipped, never an error.
    Unrecognized(String),
}

impl ChannelKind {
    /// Map a routing-key segment to a channel kind.
    pub fn from_segment(segment: &str) -> Self {
        match segment {
            "irc-user" => Self::IrcUser,
            "irc-channel" => Self::IrcChannel,
            "slack-user" => Self::SlackUser,
            "slack-channel" => Self::SlackChannel,
            "pulse" | "pulse-republish" => Self::PulseRepublish,
            "email" => Self::Email,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::IrcUser => "irc-user",
            Self::IrcChannel => "irc-channel",
            Self::SlackUser => "slack-user",
            Self::SlackChannel => "slack-channel",
            Self::PulseRepublish => "pulse",
            Self::Email => "email",
            Self::Unrecognized(other) => other,
        }
    }

    /// Whether the target spans every segment up to the condition
    /// (email addresses and routing keys contain dots).
    fn has_dotted_target(&self) -> bool {
        matches!(self, Self::Email | Self::PulseRepublish)
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a route fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryCondition {
    /// Fire for whatever state the task resolved in.
    Any,
    /// Fire only when the task resolved in exactly this state.
    OnState(TaskState),
}

impl DeliveryCondition {
    /// Parse the last routing-key segment (`on-any`, `on-failed`, ...).
    pub fn from_segment(segment: &str) -> Option<Self> {
        let value = segment.strip_prefix(CONDITION_MARKER)?;
        if value == ANY_CONDITION {
            return Some(Self::Any);
        }
        value
            .parse::<TaskState>()
            .ok()
            .filter(TaskState::is_terminal)
            .map(Self::OnState)
    }

    /// Decide whether a task in `state` satisfies this condition.
    pub fn matches(&self, state: TaskState) -> bool {
        match self {
            Self::Any => true,
            Self::OnState(wanted) => *wanted == state,
        }
    }
}

impl fmt::Display for DeliveryCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "{CONDITION_MARKER}{ANY_CONDITION}"),
            Self::OnState(state) => write!(f, "{CONDITION_MARKER}{state}"),
        }
    }
}

/// A parsed routing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub kind: ChannelKind,
    /// User handle, channel name, email address or routing key.
    pub target: String,
    pub condition: DeliveryCondition,
}

impl Route {
    pub fn fires_for(&self, state: TaskState) -> bool {
        self.condition.matches(state)
    }
}

/// Parses routing keys that start with a fixed prefix.
#[derive(Debug, Clone)]
pub struct RouteParser {
    prefix: String,
}

impl RouteParser {
    /// Create a parser for keys under `prefix` (e.g. `notify`).
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Parse a routing key.
    ///
    /// Returns `None` when the key is not addressed to us: wrong prefix,
    /// too few segments, an empty target or a condition segment outside
    /// the grammar. Unknown channel kinds still parse, as
    /// [`ChannelKind::Unrecognized`].
    pub fn parse(&self, key: &str) -> Option<Route> {
        let rest = key.strip_prefix(self.prefix.as_str())?.strip_prefix('.')?;
        let segments: Vec<&str> = rest.split('.').collect();

        // <anything>.<kind>.<target...>.<condition>
        let [_, kind, targets @ .., condition] = segments.as_slice() else {
            return None;
        };
        if targets.is_empty() {
            return None;
        }

        let kind = ChannelKind::from_segment(kind);
        let condition = DeliveryCondition::from_segment(condition)?;
        let target = if kind.has_dotted_target() {
            targets.join(".")
        } else {
            targets[0].to_string()
        };
        if target.is_empty() {
            return None;
        }

        Some(Route {
            kind,
            target,
            condition,
        })
    }
}
