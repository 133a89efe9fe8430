//! A small in-process state machine for async workflows.
//!
//! *Ayatori* is cat's cradle: one string passed hand to hand, taking a new
//! shape at every step.
//!
//! A machine is a set of named states. Each state runs a node of up to
//! three phases (`PreAction`, `Action`, `PostAction`), may be gated by a
//! guard, retried with exponential backoff, or run as a block of nested
//! states in parallel. Every phase reports `Starting`, `Output` or `Error`,
//! and `Finished` events, which the machine folds into its [`Context`] and
//! publishes to subscribers.
//!
//! # Example
//!
//! ```
//! use ayatori::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), MachineError> {
//!     let ctx = Context::new().with("user", "alice".to_string());
//!
//!     let mut machine = StateMachine::builder()
//!         .initial("Greet")
//!         .context(ctx)
//!         .state(
//!             "Greet",
//!             StateDefinition::single(StateNode::from_fn(|ctx, _scope| {
//!                 let user = ctx.get::<String>("user").ok_or("no user")?;
//!                 Ok(json!(format!("hello, {}", user)))
//!             })),
//!         )
//!         .build()?;
//!
//!     let output = machine.start().await?;
//!     assert_eq!(output.data, Some(json!("hello, alice")));
//!     Ok(())
//! }
//! ```

mod channel;
mod config;
mod definition;
mod executor;
mod machine;
mod node;
mod registry;

// Re-export core types
pub use ayatori_core::*;

pub use channel::{EventChannel, DEFAULT_EVENT_CAPACITY};
pub use config::MachineConfig;
pub use definition::{StateDefinition, StateKind};
pub use executor::StateOutcome;
pub use machine::{Progress, StateMachine, StateMachineBuilder};
pub use node::{NodeReport, StateNode};
pub use registry::StateRegistry;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        json, ActionStatus, Context, ErrorHandler, EventKey, Guard, LifecycleEvent,
        MachineConfig, MachineError, NodeFailure, Phase, PhaseError, PhaseHandler, PhaseOutput,
        PhaseScope, Progress, RetryPolicy, StateDefinition, StateMachine, StateName, StateNode,
        StateOutcome, TransitionMode, Value,
    };
}
