//! The state machine: owns the context, the registry and the event channel,
//! and drives traversal of the state graph.

use crate::channel::{EventChannel, Listener};
use crate::config::MachineConfig;
use crate::definition::StateDefinition;
use crate::executor::{Executor, StateOutcome};
use crate::registry::StateRegistry;
use ayatori_core::{
    Context, LifecycleEvent, MachineError, MachineView, Phase, PhaseOutput, RunReport, StateName,
    TransitionMode,
};
use std::fmt;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Result of a manual step.
#[derive(Debug)]
pub enum Progress<'m> {
    /// A state ran and the machine can step again.
    Stepped(&'m mut StateMachine),
    /// The run is over.
    Completed,
}

impl<'m> Progress<'m> {
    /// Returns `true` once the run is over.
    pub fn is_completed(&self) -> bool {
        matches!(self, Progress::Completed)
    }

    /// The machine, unless the run is over.
    pub fn machine(self) -> Option<&'m mut StateMachine> {
        match self {
            Progress::Stepped(machine) => Some(machine),
            Progress::Completed => None,
        }
    }
}

impl fmt::Display for Progress<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Progress::Stepped(machine) => match &machine.current {
                Some(current) => write!(f, "State Machine is at {}", current),
                None => write!(f, "State Machine is idle"),
            },
            Progress::Completed => write!(f, "State Machine is Completed"),
        }
    }
}

/// Drives a graph of named states.
///
/// Phase failures never abort traversal; inspect [`context`](Self::context)
/// (or subscribe to events) to find them.
///
/// # Examples
///
/// ```
/// use ayatori::prelude::*;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), MachineError> {
/// let mut machine = StateMachine::builder()
///     .initial("Start")
///     .state(
///         "Start",
///         StateDefinition::single(StateNode::from_fn(|_ctx, _scope| Ok(json!("A"))))
///             .target("Next"),
///     )
///     .state(
///         "Next",
///         StateDefinition::single(StateNode::from_fn(|_ctx, _scope| Ok(json!("B")))),
///     )
///     .build()?;
///
/// let output = machine.start().await?;
/// assert_eq!(output.data, Some(json!("B")));
/// assert_eq!(machine.context().status("Next"), Some(ActionStatus::Finished));
/// # Ok(())
/// # }
/// ```
pub struct StateMachine {
    initial: StateName,
    registry: StateRegistry,
    context: Context,
    channel: EventChannel,
    config: MachineConfig,
    current: Option<StateName>,
    last_outcome: Option<StateOutcome>,
    finished: bool,
}

impl fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("initial", &self.initial)
            .field("transition", &self.config.transition)
            .field("current", &self.current)
            .field("finished", &self.finished)
            .field("registry", &self.registry)
            .finish()
    }
}

impl StateMachine {
    /// Creates a new machine builder.
    pub fn builder() -> StateMachineBuilder {
        StateMachineBuilder::new()
    }

    /// The entry state.
    pub fn initial(&self) -> &StateName {
        &self.initial
    }

    /// The traversal mode.
    pub fn transition(&self) -> TransitionMode {
        self.config.transition
    }

    /// The configuration the machine was built with.
    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// The registered states.
    pub fn registry(&self) -> &StateRegistry {
        &self.registry
    }

    /// The shared context, including the `output` and `status` namespaces.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Consumes the machine and returns its context.
    pub fn into_context(self) -> Context {
        self.context
    }

    /// Snapshot of every state's status and outputs.
    pub fn report(&self) -> RunReport {
        self.context.report()
    }

    /// The last state traversal resolved.
    pub fn current_state(&self) -> Option<&StateName> {
        self.current.as_ref()
    }

    /// How the last executed state ended.
    pub fn last_outcome(&self) -> Option<&StateOutcome> {
        self.last_outcome.as_ref()
    }

    /// Returns `true` once [`finish`](Self::finish) has run.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Subscribes to lifecycle events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.channel.subscribe()
    }

    /// Runs the machine from its initial state.
    ///
    /// In automatic mode traversal follows targets until a terminal state
    /// and then finishes the run. In manual mode only the initial state
    /// runs; continue with [`execute_next`](Self::execute_next).
    ///
    /// Returns the `Action` output of the last state reached, empty if that
    /// state was bypassed.
    ///
    /// # Errors
    ///
    /// - [`MachineError::StateNotFound`] if the initial state, or a target
    ///   reached during traversal, is not registered
    /// - [`MachineError::AlreadyFinished`] if the run has ended
    pub async fn start(&mut self) -> Result<PhaseOutput, MachineError> {
        if self.finished {
            return Err(MachineError::AlreadyFinished);
        }
        if !self.registry.contains(self.initial.as_str()) {
            return Err(MachineError::StateNotFound(self.initial.clone()));
        }

        info!(
            initial = %self.initial,
            transition = ?self.config.transition,
            "Starting state machine"
        );

        let mut name = self.initial.clone();
        loop {
            if let Err(error) = self.execute_state(&name).await {
                warn!(error = %error, "Traversal aborted");
                self.finish();
                return Err(error);
            }
            if self.config.transition == TransitionMode::Manual {
                break;
            }
            match self.current_target() {
                Some(target) => name = target,
                None => {
                    self.finish();
                    break;
                }
            }
        }

        Ok(self.last_output())
    }

    /// Returns `true` if the current state has a target.
    pub fn has_next(&self) -> bool {
        self.current_target().is_some()
    }

    /// Runs the current state's target (manual mode).
    ///
    /// Returns [`Progress::Completed`] and finishes the run once the state
    /// just executed is terminal, or when there is no target to run.
    ///
    /// # Errors
    ///
    /// - [`MachineError::NotManual`] in automatic mode
    /// - [`MachineError::NotStarted`] before [`start`](Self::start)
    /// - [`MachineError::StateNotFound`] if the target is not registered
    pub async fn execute_next(&mut self) -> Result<Progress<'_>, MachineError> {
        if self.config.transition != TransitionMode::Manual {
            return Err(MachineError::NotManual);
        }
        if self.current.is_none() {
            return Err(MachineError::NotStarted);
        }
        if self.finished {
            return Ok(Progress::Completed);
        }

        let Some(target) = self.current_target() else {
            self.finish();
            return Ok(Progress::Completed);
        };

        if let Err(error) = self.execute_state(&target).await {
            warn!(error = %error, "Traversal aborted");
            self.finish();
            return Err(error);
        }

        if self.has_next() {
            Ok(Progress::Stepped(self))
        } else {
            self.finish();
            Ok(Progress::Completed)
        }
    }

    /// Ends the run: detaches the event listener. Idempotent.
    ///
    /// Nothing is written to the context afterwards.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.channel.detach();
        info!(current = ?self.current, "State machine finished");
    }

    fn current_target(&self) -> Option<StateName> {
        self.current
            .as_ref()
            .and_then(|current| self.registry.get(current.as_str()))
            .and_then(|definition| definition.target_state().cloned())
    }

    fn last_output(&self) -> PhaseOutput {
        self.current
            .as_ref()
            .and_then(|current| self.context.output(current.as_str(), Phase::Action))
            .cloned()
            .unwrap_or_default()
    }

    fn view(&self) -> MachineView {
        MachineView {
            initial: self.initial.clone(),
            transition: self.config.transition,
        }
    }

    async fn execute_state(&mut self, name: &StateName) -> Result<(), MachineError> {
        let executor = Executor::new(self.view(), self.config.phase_timeout);
        let definition = self.registry.resolve(name.as_str())?;
        self.current = Some(name.clone());
        info!(state = %name, "Entering state");

        let mut listener = Listener::new(&mut self.context, &self.channel);
        let execution = executor.run(name, definition, &mut listener).await;
        self.last_outcome = Some(execution.settle(&self.context));
        Ok(())
    }
}

/// Builder for [`StateMachine`].
#[derive(Debug, Default)]
pub struct StateMachineBuilder {
    initial: Option<StateName>,
    context: Option<Context>,
    registry: StateRegistry,
    config: MachineConfig,
}

impl StateMachineBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the entry state.
    pub fn initial(mut self, name: impl Into<StateName>) -> Self {
        self.initial = Some(name.into());
        self
    }

    /// Seeds the context. Keys `output` and `status` (any case) are
    /// rejected by [`build`](Self::build).
    pub fn context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    /// Registers a state; a later registration of the same name wins.
    pub fn state(mut self, name: impl Into<StateName>, definition: StateDefinition) -> Self {
        self.registry.insert(name, definition);
        self
    }

    /// Registers several states.
    pub fn states<N: Into<StateName>>(
        mut self,
        states: impl IntoIterator<Item = (N, StateDefinition)>,
    ) -> Self {
        for (name, definition) in states {
            self.registry.insert(name, definition);
        }
        self
    }

    /// Sets the traversal mode. Default: automatic.
    pub fn transition(mut self, transition: TransitionMode) -> Self {
        self.config.transition = transition;
        self
    }

    /// Rejects unresolved targets in [`build`](Self::build).
    pub fn strict_targets(mut self, strict: bool) -> Self {
        self.config.strict_targets = strict;
        self
    }

    /// Default timeout for phases of nodes without their own.
    pub fn phase_timeout(mut self, limit: Duration) -> Self {
        self.config.phase_timeout = Some(limit);
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: MachineConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the machine.
    ///
    /// The initial state is not resolved here; [`StateMachine::start`]
    /// does that.
    ///
    /// # Errors
    ///
    /// - [`MachineError::Configuration`] without an initial state, or when
    ///   a block child reuses another state's name
    /// - [`MachineError::ReservedKeys`] when the context uses reserved keys
    /// - [`MachineError::UnresolvedTarget`] with strict targets enabled
    pub fn build(self) -> Result<StateMachine, MachineError> {
        let initial = self.initial.ok_or_else(|| {
            MachineError::Configuration("Initial state must be specified".to_string())
        })?;

        self.registry.check_block_names()?;

        if self.config.strict_targets {
            if let Some((state, target)) = self.registry.unresolved_targets().into_iter().next() {
                return Err(MachineError::UnresolvedTarget { state, target });
            }
        }

        let context = self
            .context
            .unwrap_or_default()
            .prepare(self.registry.declared_names())?;

        Ok(StateMachine {
            initial,
            registry: self.registry,
            context,
            channel: EventChannel::new(self.config.event_capacity),
            config: self.config,
            current: None,
            last_outcome: None,
            finished: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::StateNode;
    use ayatori_core::{json, ActionStatus};

    fn returning(value: &'static str) -> StateDefinition {
        StateDefinition::single(StateNode::from_fn(move |_ctx, _scope| Ok(json!(value))))
    }

    #[tokio::test]
    async fn test_automatic_run() {
        let mut machine = StateMachine::builder()
            .initial("Start")
            .state("Start", returning("A").target("Next"))
            .state("Next", returning("B"))
            .build()
            .expect("valid machine");

        let output = machine.start().await.expect("run succeeds");
        assert_eq!(output.data, Some(json!("B")));
        assert_eq!(output.error, None);
        assert!(machine.is_finished());
        assert_eq!(machine.current_state(), Some(&StateName::new("Next")));
        assert_eq!(
            machine.context().status("Start"),
            Some(ActionStatus::Finished)
        );
    }

    #[tokio::test]
    async fn test_builder_requires_initial() {
        let result = StateMachine::builder().state("Start", returning("A")).build();
        assert_eq!(
            result.unwrap_err(),
            MachineError::Configuration("Initial state must be specified".to_string())
        );
    }

    #[tokio::test]
    async fn test_unknown_initial_fails_on_start() {
        let mut machine = StateMachine::builder()
            .initial("Missing")
            .state("Start", returning("A"))
            .build()
            .expect("built lazily");

        let err = machine.start().await.unwrap_err();
        assert_eq!(err, MachineError::StateNotFound(StateName::new("Missing")));
        assert_eq!(
            machine.context().status("Start"),
            Some(ActionStatus::Pending)
        );
    }

    #[tokio::test]
    async fn test_start_after_finish() {
        let mut machine = StateMachine::builder()
            .initial("Start")
            .state("Start", returning("A"))
            .build()
            .expect("valid machine");

        machine.start().await.expect("first run");
        assert_eq!(
            machine.start().await.unwrap_err(),
            MachineError::AlreadyFinished
        );
    }

    #[tokio::test]
    async fn test_finish_is_idempotent() {
        let mut machine = StateMachine::builder()
            .initial("Start")
            .state("Start", returning("A"))
            .build()
            .expect("valid machine");

        machine.finish();
        machine.finish();
        assert!(machine.is_finished());
    }

    #[test]
    fn test_progress_display() {
        assert_eq!(Progress::Completed.to_string(), "State Machine is Completed");
    }
}
