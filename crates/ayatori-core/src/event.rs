//! Lifecycle events emitted while a state node runs.
//!
//! Every phase of a node produces `Starting`, then `Output` or `Error`, then
//! `Finished`. An event's key renders as `"<Phase>:<Status>"`, e.g.
//! `"Action:Output"`.

use crate::context::{Context, PhaseOutput};
use crate::phase::StateName;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A phase of a state node, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    /// Optional phase run before the action.
    PreAction,
    /// The mandatory action.
    Action,
    /// Optional phase run after the action.
    PostAction,
}

impl Phase {
    /// Returns the phase name as used in event keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::PreAction => "PreAction",
            Phase::Action => "Action",
            Phase::PostAction => "PostAction",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = ParseEventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PreAction" => Ok(Phase::PreAction),
            "Action" => Ok(Phase::Action),
            "PostAction" => Ok(Phase::PostAction),
            other => Err(ParseEventError::UnknownPhase(other.to_string())),
        }
    }
}

/// Status of a state, and the status half of a lifecycle event.
///
/// `Pending` only appears in the context; events never carry it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ActionStatus {
    /// Not executed yet (or bypassed by its guard).
    #[default]
    Pending,
    /// A phase has started.
    Starting,
    /// A phase has completed.
    Finished,
    /// A phase has failed.
    Error,
    /// A phase produced output.
    Output,
}

impl ActionStatus {
    /// Returns the status name as used in event keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Pending => "Pending",
            ActionStatus::Starting => "Starting",
            ActionStatus::Finished => "Finished",
            ActionStatus::Error => "Error",
            ActionStatus::Output => "Output",
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionStatus {
    type Err = ParseEventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(ActionStatus::Pending),
            "Starting" => Ok(ActionStatus::Starting),
            "Finished" => Ok(ActionStatus::Finished),
            "Error" => Ok(ActionStatus::Error),
            "Output" => Ok(ActionStatus::Output),
            other => Err(ParseEventError::UnknownStatus(other.to_string())),
        }
    }
}

/// Error returned when an event key cannot be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseEventError {
    /// The key has no `:` separator.
    #[error("Malformed event key: {0}")]
    Malformed(String),
    /// Unknown phase name.
    #[error("Unknown phase: {0}")]
    UnknownPhase(String),
    /// Unknown or non-event status name.
    #[error("Unknown event status: {0}")]
    UnknownStatus(String),
}

/// The `phase:status` pair identifying a lifecycle event.
///
/// ```
/// use ayatori_core::{ActionStatus, EventKey, Phase};
///
/// let key: EventKey = "Action:Output".parse().unwrap();
/// assert_eq!(key, EventKey::new(Phase::Action, ActionStatus::Output));
/// assert_eq!(key.to_string(), "Action:Output");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKey {
    /// The phase that emitted the event.
    pub phase: Phase,
    /// What happened to the phase.
    pub status: ActionStatus,
}

impl EventKey {
    /// Creates a new event key.
    pub fn new(phase: Phase, status: ActionStatus) -> Self {
        Self { phase, status }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.phase, self.status)
    }
}

impl FromStr for EventKey {
    type Err = ParseEventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (phase, status) = s
            .split_once(':')
            .ok_or_else(|| ParseEventError::Malformed(s.to_string()))?;
        let status: ActionStatus = status.parse()?;
        if status == ActionStatus::Pending {
            return Err(ParseEventError::UnknownStatus(status.to_string()));
        }
        Ok(Self::new(phase.parse()?, status))
    }
}

/// A lifecycle event emitted by a state node.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleEvent {
    /// The state whose node emitted the event.
    pub state: StateName,
    /// Phase and status.
    pub key: EventKey,
    /// `{data, error}` payload, present on `Output` and `Error` events.
    pub payload: Option<PhaseOutput>,
}

impl LifecycleEvent {
    /// A `Phase:Starting` event.
    pub fn starting(state: StateName, phase: Phase) -> Self {
        Self {
            state,
            key: EventKey::new(phase, ActionStatus::Starting),
            payload: None,
        }
    }

    /// A `Phase:Output` event carrying the phase's data.
    pub fn output(state: StateName, phase: Phase, data: Value) -> Self {
        Self {
            state,
            key: EventKey::new(phase, ActionStatus::Output),
            payload: Some(PhaseOutput {
                data: Some(data),
                error: None,
            }),
        }
    }

    /// A `Phase:Error` event carrying the rendered failure.
    pub fn error(state: StateName, phase: Phase, error: impl Into<String>) -> Self {
        Self {
            state,
            key: EventKey::new(phase, ActionStatus::Error),
            payload: Some(PhaseOutput {
                data: None,
                error: Some(error.into()),
            }),
        }
    }

    /// A `Phase:Finished` event.
    pub fn finished(state: StateName, phase: Phase) -> Self {
        Self {
            state,
            key: EventKey::new(phase, ActionStatus::Finished),
            payload: None,
        }
    }

    /// Shorthand for `self.key.phase`.
    pub fn phase(&self) -> Phase {
        self.key.phase
    }

    /// Shorthand for `self.key.status`.
    pub fn status(&self) -> ActionStatus {
        self.key.status
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.state, self.key)
    }
}

/// Destination of the events a node emits.
///
/// The engine injects a sink into every node execution. A sink also hands
/// out the context the node's phases read, so a phase never holds the
/// context while an event is being folded into it.
pub trait EventSink: Send {
    /// The context phases read from.
    fn context(&self) -> &Context;

    /// Delivers an event. Delivery completes before `emit` returns.
    fn emit(&mut self, event: LifecycleEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_key_parse() {
        let key: EventKey = "PreAction:Starting".parse().unwrap();
        assert_eq!(key.phase, Phase::PreAction);
        assert_eq!(key.status, ActionStatus::Starting);
        assert_eq!(key.to_string(), "PreAction:Starting");
    }

    #[test]
    fn test_event_key_parse_errors() {
        assert_eq!(
            "Action".parse::<EventKey>(),
            Err(ParseEventError::Malformed("Action".to_string()))
        );
        assert_eq!(
            "Guard:Starting".parse::<EventKey>(),
            Err(ParseEventError::UnknownPhase("Guard".to_string()))
        );
        assert_eq!(
            "Action:Pending".parse::<EventKey>(),
            Err(ParseEventError::UnknownStatus("Pending".to_string()))
        );
    }

    #[test]
    fn test_event_constructors() {
        let event = LifecycleEvent::error(StateName::new("Fetch"), Phase::Action, "timeout");
        assert_eq!(event.status(), ActionStatus::Error);
        assert_eq!(event.to_string(), "Fetch Action:Error");
        assert_eq!(
            event.payload.and_then(|p| p.error),
            Some("timeout".to_string())
        );
    }

    #[test]
    fn test_phase_order() {
        assert!(Phase::PreAction < Phase::Action);
        assert!(Phase::Action < Phase::PostAction);
    }
}
