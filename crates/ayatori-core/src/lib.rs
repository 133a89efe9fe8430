//! Core traits and types for the ayatori state machine engine.
//!
//! This crate provides the data model without runtime dependencies.
//! Library authors should depend on this crate to implement custom phases
//! and guards.
//!
//! # Core Types
//!
//! - [`Context`] - Caller data plus the engine's `output`/`status` namespaces
//! - [`LifecycleEvent`] - `"<Phase>:<Status>"` notifications emitted by nodes
//! - [`EventSink`] - Where nodes deliver their events
//! - [`PhaseHandler`] - One executable phase of a state node
//! - [`RetryPolicy`] - Backoff schedule for failed nodes
//! - [`MachineError`] / [`PhaseError`] - Error types
//!
//! # Optional Traits
//!
//! - [`Guard`] - Decide whether a state runs
//! - [`ErrorHandler`] - React to a node that failed for good

mod context;
mod error;
mod event;
mod phase;
mod retry;
mod traits;

pub use context::{Context, ContextKey, PhaseOutput, RunReport, RESERVED_KEYS};
pub use error::{MachineError, NodeFailure, PhaseError};
pub use event::{ActionStatus, EventKey, EventSink, LifecycleEvent, ParseEventError, Phase};
pub use phase::{
    phase_fn, FnPhase, MachineView, PhaseHandler, PhaseScope, StateName, TransitionMode,
};
pub use retry::{RetryPolicy, RetryPolicyError, DEFAULT_MAX_ATTEMPTS};
pub use traits::{ErrorHandler, Guard};

/// Re-exported so handlers can build values without a direct dependency.
pub use serde_json::{json, Value};
