//! State names and the phase handler trait.

use crate::context::Context;
use crate::error::PhaseError;
use crate::event::Phase;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Type-safe state name wrapper.
///
/// # Examples
///
/// ```
/// use ayatori_core::StateName;
///
/// let name = StateName::new("Start");
/// assert_eq!(name.as_str(), "Start");
///
/// let name: StateName = "Next".into();
/// assert_eq!(name, "Next");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateName(String);

impl StateName {
    /// Creates a new StateName.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the state name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StateName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StateName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&StateName> for StateName {
    fn from(s: &StateName) -> Self {
        s.clone()
    }
}

impl AsRef<str> for StateName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for StateName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for StateName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for StateName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// How the machine advances from one state to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransitionMode {
    /// The engine follows targets until it reaches a terminal state.
    #[default]
    Automatic,
    /// The caller advances one state at a time with `execute_next`.
    Manual,
}

/// Read-only view of the machine driving a phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineView {
    /// Entry state of the machine.
    pub initial: StateName,
    /// Traversal mode of the machine.
    pub transition: TransitionMode,
}

/// Everything a phase handler learns about where it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseScope {
    /// The state whose node is executing.
    pub state: StateName,
    /// The phase being executed.
    pub phase: Phase,
    /// Zero-based node attempt; retries start at 1.
    pub attempt: u32,
    /// The machine driving the run.
    pub machine: MachineView,
}

/// One executable phase of a state node.
///
/// Handlers read the shared context and return a JSON value, which the
/// engine records as the phase's output. Returning an error records it in
/// the phase's output slot and marks the state as failed; later phases of
/// the same node still run.
///
/// # Examples
///
/// ```
/// use ayatori_core::{Context, PhaseError, PhaseHandler, PhaseScope};
/// use async_trait::async_trait;
/// use serde_json::{json, Value};
///
/// struct Greet;
///
/// #[async_trait]
/// impl PhaseHandler for Greet {
///     async fn run(&self, ctx: &Context, scope: &PhaseScope) -> Result<Value, PhaseError> {
///         let who = ctx.get::<String>("user").ok_or("no user in context")?;
///         Ok(json!(format!("hello {} from {}", who, scope.state)))
///     }
/// }
/// ```
#[async_trait]
pub trait PhaseHandler: Send + Sync {
    /// Runs the phase against the shared context.
    async fn run(&self, ctx: &Context, scope: &PhaseScope) -> Result<Value, PhaseError>;
}

/// Adapter turning a synchronous closure into a [`PhaseHandler`].
///
/// Created with [`phase_fn`].
pub struct FnPhase<F>(F);

impl<F> fmt::Debug for FnPhase<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPhase").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> PhaseHandler for FnPhase<F>
where
    F: Fn(&Context, &PhaseScope) -> Result<Value, PhaseError> + Send + Sync,
{
    async fn run(&self, ctx: &Context, scope: &PhaseScope) -> Result<Value, PhaseError> {
        (self.0)(ctx, scope)
    }
}

/// Wraps a closure as a phase handler.
///
/// ```
/// use ayatori_core::phase_fn;
/// use serde_json::json;
///
/// let handler = phase_fn(|_ctx, scope| Ok(json!(scope.state.as_str())));
/// # let _ = handler;
/// ```
pub fn phase_fn<F>(f: F) -> FnPhase<F>
where
    F: Fn(&Context, &PhaseScope) -> Result<Value, PhaseError> + Send + Sync,
{
    FnPhase(f)
}
