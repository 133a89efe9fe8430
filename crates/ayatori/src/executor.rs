//! Execution of a single state: guard, node or block, retry, error handler.

use crate::channel::Forwarder;
use crate::definition::{StateDefinition, StateKind};
use ayatori_core::{
    ActionStatus, Context, ErrorHandler, EventSink, LifecycleEvent, MachineView, NodeFailure,
    Phase, StateName, Value,
};
use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// How one state execution ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateOutcome {
    /// The guard returned `false`; nothing ran.
    Bypassed,
    /// The node (or every block child) succeeded.
    Succeeded {
        /// Number of node executions.
        attempts: u32,
    },
    /// Every attempt failed.
    Failed(NodeFailure),
}

impl StateOutcome {
    /// Returns `true` if every attempt failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, StateOutcome::Failed(_))
    }
}

type Deferred<'a> = (&'a dyn ErrorHandler, NodeFailure);

/// A finished state execution whose error handlers have not run yet.
///
/// Block children only reach the machine context once the block settles,
/// so every handler waits until the whole top-level state has been folded.
#[must_use]
pub(crate) struct Execution<'a> {
    outcome: StateOutcome,
    deferred: Vec<Deferred<'a>>,
}

impl Execution<'_> {
    /// Calls the pending error handlers in failure order against `ctx`.
    pub(crate) fn settle(self, ctx: &Context) -> StateOutcome {
        for (handler, failure) in &self.deferred {
            handler.on_error(ctx, failure);
        }
        self.outcome
    }
}

pub(crate) struct Executor {
    machine: MachineView,
    phase_timeout: Option<Duration>,
}

impl Executor {
    pub(crate) fn new(machine: MachineView, phase_timeout: Option<Duration>) -> Self {
        Self {
            machine,
            phase_timeout,
        }
    }

    /// Runs one state against `sink`. Never fails: node failures are
    /// reported through events and the returned execution.
    pub(crate) fn run<'a, 's>(
        &'a self,
        name: &'a StateName,
        definition: &'a StateDefinition,
        sink: &'s mut dyn EventSink,
    ) -> BoxFuture<'s, Execution<'a>>
    where
        'a: 's,
    {
        async move {
            if let Some(guard) = definition.guard_ref() {
                if !guard.check(sink.context()) {
                    info!(state = %name, "Guard rejected state, bypassing");
                    return Execution {
                        outcome: StateOutcome::Bypassed,
                        deferred: Vec::new(),
                    };
                }
            }

            let policy = definition.retry_config();
            let mut deferred = Vec::new();
            let mut attempt = 0u32;
            loop {
                let errors = match definition.kind() {
                    StateKind::Single(node) => {
                        node.execute(sink, name, attempt, &self.machine, self.phase_timeout)
                            .await
                            .errors
                    }
                    StateKind::Block(children) => {
                        let (errors, nested) = self.fan_out(name, children, sink, attempt).await;
                        deferred.extend(nested);
                        errors
                    }
                };

                if errors.is_empty() {
                    info!(state = %name, attempts = attempt + 1, "State completed");
                    return Execution {
                        outcome: StateOutcome::Succeeded {
                            attempts: attempt + 1,
                        },
                        deferred,
                    };
                }

                if !policy.should_retry(attempt) {
                    let failure = NodeFailure {
                        state: name.clone(),
                        attempts: attempt + 1,
                        errors,
                    };
                    warn!(state = %name, attempts = failure.attempts, "State failed");
                    if let Some(handler) = definition.error_handler() {
                        deferred.push((handler, failure.clone()));
                    }
                    return Execution {
                        outcome: StateOutcome::Failed(failure),
                        deferred,
                    };
                }

                let delay = policy.delay_for_attempt(attempt).unwrap_or_default();
                info!(
                    state = %name,
                    retry = attempt + 1,
                    max_retries = policy.max_retries(),
                    delay = ?delay,
                    "State failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
        .boxed()
    }

    /// Runs block children concurrently and waits for all of them.
    ///
    /// The block reports as its own `Action` phase: the output maps each
    /// child to its action data, and the phase errors if any child failed.
    /// Error handlers of failed children are handed back to the caller.
    async fn fan_out<'a>(
        &'a self,
        name: &StateName,
        children: &'a [(StateName, StateDefinition)],
        sink: &mut dyn EventSink,
        attempt: u32,
    ) -> (Vec<(Phase, String)>, Vec<Deferred<'a>>) {
        sink.emit(LifecycleEvent::starting(name.clone(), Phase::Action));
        info!(state = %name, children = children.len(), attempt, "Fanning out block");

        let (queue, mut events) = mpsc::unbounded_channel();
        let executions = {
            let context = sink.context();
            let runs = children.iter().map(|(child_name, child)| {
                let mut forwarder = Forwarder::new(context, queue.clone());
                async move {
                    let execution = self.run(child_name, child, &mut forwarder).await;
                    (child_name, execution)
                }
            });
            join_all(runs).await
        };
        drop(queue);

        let mut child_data: HashMap<StateName, Value> = HashMap::new();
        while let Ok(event) = events.try_recv() {
            if event.phase() == Phase::Action && event.status() == ActionStatus::Output {
                if let Some(data) = event.payload.as_ref().and_then(|p| p.data.clone()) {
                    child_data.insert(event.state.clone(), data);
                }
            }
            sink.emit(event);
        }

        let mut data = serde_json::Map::new();
        let mut failed = Vec::new();
        let mut deferred = Vec::new();
        for (child_name, execution) in executions {
            if execution.outcome.is_failed() {
                failed.push(child_name.to_string());
            }
            deferred.extend(execution.deferred);
            let value = child_data.remove(child_name).unwrap_or(Value::Null);
            data.insert(child_name.to_string(), value);
        }

        sink.emit(LifecycleEvent::output(
            name.clone(),
            Phase::Action,
            Value::Object(data),
        ));

        let mut errors = Vec::new();
        if !failed.is_empty() {
            let message = format!("Block children failed: {}", failed.join(", "));
            sink.emit(LifecycleEvent::error(name.clone(), Phase::Action, message.clone()));
            errors.push((Phase::Action, message));
        }
        sink.emit(LifecycleEvent::finished(name.clone(), Phase::Action));
        (errors, deferred)
    }
}
