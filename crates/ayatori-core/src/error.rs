//! State machine error types.

use crate::event::Phase;
use crate::phase::StateName;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors that stop a state machine before or during traversal.
///
/// Phase failures never surface here; they are recorded in the context's
/// `status` and `output` namespaces instead.
///
/// # Non-Exhaustive
///
/// Always include a wildcard arm when matching:
///
/// ```
/// use ayatori_core::MachineError;
///
/// fn describe(error: &MachineError) -> String {
///     match error {
///         MachineError::ReservedKeys(keys) => format!("reserved: {}", keys.join(",")),
///         MachineError::StateNotFound(name) => format!("missing: {}", name),
///         _ => error.to_string(),
///     }
/// }
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MachineError {
    /// The caller context uses keys reserved for the engine's namespaces.
    ///
    /// Carries every offending key in the caller's spelling.
    #[error("Usage of reserved context keywords is prohibited: {}", .0.join(", "))]
    ReservedKeys(Vec<String>),

    /// A state name could not be resolved in the registry.
    ///
    /// Raised by `start()` for an unknown initial state, and during
    /// traversal when a target names an unregistered state.
    #[error("State not found: {0}")]
    StateNotFound(StateName),

    /// A target names an unregistered state (strict target checking only).
    #[error("State '{state}' targets unknown state '{target}'")]
    UnresolvedTarget {
        /// The state whose target is unresolved.
        state: StateName,
        /// The unresolved target.
        target: StateName,
    },

    /// The machine configuration is invalid.
    #[error("Invalid state machine configuration: {0}")]
    Configuration(String),

    /// `execute_next` was called on a machine in automatic mode.
    #[error("execute_next is only available in manual transition mode")]
    NotManual,

    /// `execute_next` was called before `start`.
    #[error("State machine has not been started")]
    NotStarted,

    /// `start` was called on a machine whose run has already ended.
    #[error("State machine has already finished")]
    AlreadyFinished,
}

/// Failure returned by a phase handler.
///
/// The rendered message is what lands in the `error` field of the phase's
/// output slot.
#[derive(Error, Debug)]
pub enum PhaseError {
    /// A failure with a message, recorded verbatim.
    #[error("{0}")]
    Failed(String),

    /// Any other failure, recorded with a generic prefix.
    #[error("Unexpected Error: {0}")]
    Unexpected(Box<dyn std::error::Error + Send + Sync>),

    /// The phase did not complete within the node's timeout.
    #[error("Phase timed out after {0:?}")]
    Timeout(Duration),
}

impl PhaseError {
    /// Creates a failure whose message is recorded verbatim.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Wraps an arbitrary error value.
    pub fn unexpected(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Unexpected(error.into())
    }
}

impl From<&str> for PhaseError {
    fn from(message: &str) -> Self {
        Self::failed(message)
    }
}

impl From<String> for PhaseError {
    fn from(message: String) -> Self {
        Self::Failed(message)
    }
}

/// Report of a node whose attempts all failed.
///
/// Handed to the state's `on_error` handler once retries are exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFailure {
    /// The state whose node failed.
    pub state: StateName,
    /// Number of node executions, including the first one.
    pub attempts: u32,
    /// Phase errors of the last attempt, in phase order.
    pub errors: Vec<(Phase, String)>,
}

impl fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "State '{}' failed after {} attempt(s)",
            self.state, self.attempts
        )?;
        for (phase, error) in &self.errors {
            write!(f, "; {}: {}", phase, error)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = MachineError::ReservedKeys(vec!["Output".to_string(), "status".to_string()]);
        assert_eq!(
            error.to_string(),
            "Usage of reserved context keywords is prohibited: Output, status"
        );

        let error = MachineError::StateNotFound(StateName::new("Missing"));
        assert_eq!(error.to_string(), "State not found: Missing");
    }

    #[test]
    fn test_phase_error_messages() {
        assert_eq!(PhaseError::from("boom").to_string(), "boom");

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        assert_eq!(
            PhaseError::unexpected(io).to_string(),
            "Unexpected Error: disk gone"
        );

        assert_eq!(
            PhaseError::Timeout(Duration::from_millis(50)).to_string(),
            "Phase timed out after 50ms"
        );
    }

    #[test]
    fn test_node_failure_display() {
        let failure = NodeFailure {
            state: StateName::new("Fetch"),
            attempts: 3,
            errors: vec![(Phase::Action, "network down".to_string())],
        };
        assert_eq!(
            failure.to_string(),
            "State 'Fetch' failed after 3 attempt(s); Action: network down"
        );
    }
}
