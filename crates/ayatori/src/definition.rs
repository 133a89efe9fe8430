//! State definitions: what a state runs and where it goes next.

use crate::node::StateNode;
use ayatori_core::{
    Context, ErrorHandler, Guard, NodeFailure, RetryPolicy, StateName, DEFAULT_MAX_ATTEMPTS,
};
use std::fmt;

/// What a state executes.
pub enum StateKind {
    /// A single state node.
    Single(StateNode),
    /// Nested states run concurrently; the block settles once all have.
    ///
    /// Targets of nested states are ignored.
    Block(Vec<(StateName, StateDefinition)>),
}

impl fmt::Debug for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateKind::Single(node) => f.debug_tuple("Single").field(node).finish(),
            StateKind::Block(children) => f
                .debug_tuple("Block")
                .field(&children.iter().map(|(name, _)| name).collect::<Vec<_>>())
                .finish(),
        }
    }
}

/// One named step of the workflow graph.
///
/// # Examples
///
/// ```
/// use ayatori::{json, StateDefinition, StateNode};
///
/// let fetch = StateDefinition::single(StateNode::from_fn(|_ctx, _scope| Ok(json!(1))))
///     .target("Process")
///     .guard(|ctx| ctx.contains_key("url"))
///     .retry(3, 2)
///     .on_error(|_ctx, failure| eprintln!("{}", failure));
///
/// assert_eq!(fetch.target_state().map(|t| t.as_str()), Some("Process"));
/// ```
pub struct StateDefinition {
    kind: StateKind,
    target: Option<StateName>,
    guard: Option<Box<dyn Guard>>,
    retry: RetryPolicy,
    on_error: Option<Box<dyn ErrorHandler>>,
}

impl fmt::Debug for StateDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateDefinition")
            .field("kind", &self.kind)
            .field("target", &self.target)
            .field("guard", &self.guard.is_some())
            .field("retry", &self.retry)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl StateDefinition {
    fn with_kind(kind: StateKind) -> Self {
        Self {
            kind,
            target: None,
            guard: None,
            retry: RetryPolicy::None,
            on_error: None,
        }
    }

    /// A state running one node.
    pub fn single(node: StateNode) -> Self {
        Self::with_kind(StateKind::Single(node))
    }

    /// A state running nested states concurrently.
    pub fn block<N: Into<StateName>>(
        children: impl IntoIterator<Item = (N, StateDefinition)>,
    ) -> Self {
        Self::with_kind(StateKind::Block(
            children
                .into_iter()
                .map(|(name, definition)| (name.into(), definition))
                .collect(),
        ))
    }

    /// Sets the state traversal moves to next. An empty name leaves the
    /// state terminal.
    pub fn target(mut self, target: impl Into<StateName>) -> Self {
        let target = target.into();
        self.target = (!target.as_str().is_empty()).then_some(target);
        self
    }

    /// Runs the state only when `guard` returns `true`.
    pub fn guard<F>(self, guard: F) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        self.guard_with(guard)
    }

    /// Trait-object form of [`guard`](Self::guard).
    pub fn guard_with(mut self, guard: impl Guard + 'static) -> Self {
        self.guard = Some(Box::new(guard));
        self
    }

    /// Retries a failed node up to `max_attempts` times, waiting
    /// `base_secs^k` seconds before retry `k`.
    pub fn retry(self, max_attempts: u32, base_secs: u32) -> Self {
        self.retry_policy(RetryPolicy::backoff(max_attempts, base_secs))
    }

    /// [`retry`](Self::retry) with the default of five attempts.
    pub fn retry_backoff(self, base_secs: u32) -> Self {
        self.retry(DEFAULT_MAX_ATTEMPTS, base_secs)
    }

    /// Sets an arbitrary retry policy.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Calls `handler` once the node has failed for good.
    pub fn on_error<F>(self, handler: F) -> Self
    where
        F: Fn(&Context, &NodeFailure) + Send + Sync + 'static,
    {
        self.on_error_with(handler)
    }

    /// Trait-object form of [`on_error`](Self::on_error).
    pub fn on_error_with(mut self, handler: impl ErrorHandler + 'static) -> Self {
        self.on_error = Some(Box::new(handler));
        self
    }

    /// What the state executes.
    pub fn kind(&self) -> &StateKind {
        &self.kind
    }

    /// Returns `true` for block states.
    pub fn is_block(&self) -> bool {
        matches!(self.kind, StateKind::Block(_))
    }

    /// The next state, `None` for terminal states.
    pub fn target_state(&self) -> Option<&StateName> {
        self.target.as_ref()
    }

    pub(crate) fn guard_ref(&self) -> Option<&dyn Guard> {
        self.guard.as_deref()
    }

    /// The retry policy, [`RetryPolicy::None`] unless configured.
    pub fn retry_config(&self) -> &RetryPolicy {
        &self.retry
    }

    pub(crate) fn error_handler(&self) -> Option<&dyn ErrorHandler> {
        self.on_error.as_deref()
    }
}
