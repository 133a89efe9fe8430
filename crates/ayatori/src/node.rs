//! State nodes: the ordered phases a state executes.

use ayatori_core::{
    phase_fn, Context, EventSink, LifecycleEvent, MachineView, Phase, PhaseError, PhaseHandler,
    PhaseScope, StateName, Value,
};
use futures_util::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::{debug, warn};

/// Executable unit of a state: `pre_action → action → post_action`.
///
/// Every phase runs through the same wrapper, which emits
/// `Starting`, then `Output` or `Error`, then always `Finished`. A failed
/// phase does not stop the phases after it.
///
/// # Examples
///
/// ```
/// use ayatori::{json, StateNode};
///
/// let node = StateNode::from_fn(|_ctx, _scope| Ok(json!("done")))
///     .pre_action_fn(|_ctx, _scope| Ok(json!("prepared")))
///     .post_action_fn(|_ctx, _scope| Ok(json!("cleaned up")));
/// assert_eq!(node.phase_count(), 3);
/// ```
pub struct StateNode {
    pre_action: Option<Box<dyn PhaseHandler>>,
    action: Box<dyn PhaseHandler>,
    post_action: Option<Box<dyn PhaseHandler>>,
    timeout: Option<Duration>,
}

impl fmt::Debug for StateNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateNode")
            .field("pre_action", &self.pre_action.is_some())
            .field("post_action", &self.post_action.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Result of one execution of a node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeReport {
    /// Phases that failed, with their rendered errors.
    pub errors: Vec<(Phase, String)>,
}

impl NodeReport {
    /// Returns `true` if every phase succeeded.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

impl StateNode {
    /// Creates a node around its mandatory action.
    pub fn new(action: impl PhaseHandler + 'static) -> Self {
        Self {
            pre_action: None,
            action: Box::new(action),
            post_action: None,
            timeout: None,
        }
    }

    /// Creates a node whose action is a closure.
    pub fn from_fn<F>(action: F) -> Self
    where
        F: Fn(&Context, &PhaseScope) -> Result<Value, PhaseError> + Send + Sync + 'static,
    {
        Self::new(phase_fn(action))
    }

    /// Sets the phase run before the action.
    pub fn pre_action(mut self, handler: impl PhaseHandler + 'static) -> Self {
        self.pre_action = Some(Box::new(handler));
        self
    }

    /// Closure form of [`pre_action`](Self::pre_action).
    pub fn pre_action_fn<F>(self, handler: F) -> Self
    where
        F: Fn(&Context, &PhaseScope) -> Result<Value, PhaseError> + Send + Sync + 'static,
    {
        self.pre_action(phase_fn(handler))
    }

    /// Sets the phase run after the action.
    pub fn post_action(mut self, handler: impl PhaseHandler + 'static) -> Self {
        self.post_action = Some(Box::new(handler));
        self
    }

    /// Closure form of [`post_action`](Self::post_action).
    pub fn post_action_fn<F>(self, handler: F) -> Self
    where
        F: Fn(&Context, &PhaseScope) -> Result<Value, PhaseError> + Send + Sync + 'static,
    {
        self.post_action(phase_fn(handler))
    }

    /// Bounds every phase of this node, overriding the machine default.
    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Number of configured phases (1 to 3).
    pub fn phase_count(&self) -> usize {
        1 + usize::from(self.pre_action.is_some()) + usize::from(self.post_action.is_some())
    }

    fn phases(&self) -> impl Iterator<Item = (Phase, &dyn PhaseHandler)> {
        [
            (Phase::PreAction, self.pre_action.as_deref()),
            (Phase::Action, Some(self.action.as_ref())),
            (Phase::PostAction, self.post_action.as_deref()),
        ]
        .into_iter()
        .filter_map(|(phase, handler)| handler.map(|h| (phase, h)))
    }

    /// Runs every configured phase in order, emitting into `sink`.
    pub async fn execute(
        &self,
        sink: &mut dyn EventSink,
        state: &StateName,
        attempt: u32,
        machine: &MachineView,
        default_timeout: Option<Duration>,
    ) -> NodeReport {
        let limit = self.timeout.or(default_timeout);
        let mut report = NodeReport::default();

        for (phase, handler) in self.phases() {
            let scope = PhaseScope {
                state: state.clone(),
                phase,
                attempt,
                machine: machine.clone(),
            };
            if let Err(message) = run_phase(handler, sink, scope, limit).await {
                report.errors.push((phase, message));
            }
        }

        report
    }
}

async fn run_phase(
    handler: &dyn PhaseHandler,
    sink: &mut dyn EventSink,
    scope: PhaseScope,
    limit: Option<Duration>,
) -> Result<(), String> {
    let state = scope.state.clone();
    let phase = scope.phase;
    sink.emit(LifecycleEvent::starting(state.clone(), phase));

    let invocation = AssertUnwindSafe(handler.run(sink.context(), &scope)).catch_unwind();
    let result = match limit {
        Some(limit) => match tokio::time::timeout(limit, invocation).await {
            Ok(result) => result,
            Err(_) => Ok(Err(PhaseError::Timeout(limit))),
        },
        None => invocation.await,
    };
    let result = result.unwrap_or_else(|panic| Err(PhaseError::unexpected(panic_message(panic))));

    let outcome = match result {
        Ok(data) => {
            debug!(state = %state, phase = %phase, "Phase produced output");
            sink.emit(LifecycleEvent::output(state.clone(), phase, data));
            Ok(())
        }
        Err(error) => {
            let message = error.to_string();
            warn!(state = %state, phase = %phase, error = %message, "Phase failed");
            sink.emit(LifecycleEvent::error(state.clone(), phase, message.clone()));
            Err(message)
        }
    };

    sink.emit(LifecycleEvent::finished(state, phase));
    outcome
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "phase panicked".to_string()
    }
}
