//! Machine-wide configuration.

use crate::channel::DEFAULT_EVENT_CAPACITY;
use ayatori_core::TransitionMode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a [`StateMachine`](crate::StateMachine).
///
/// Deserializable so callers can load it from their own config source;
/// missing fields take their defaults.
///
/// # Examples
///
/// ```
/// use ayatori::{MachineConfig, TransitionMode};
/// use std::time::Duration;
///
/// let config = MachineConfig {
///     transition: TransitionMode::Manual,
///     phase_timeout: Some(Duration::from_secs(60)),
///     ..MachineConfig::default()
/// };
/// assert!(!config.strict_targets);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Traversal mode. Default: automatic.
    pub transition: TransitionMode,
    /// Reject unresolved targets at build time instead of at traversal.
    /// Default: `false`.
    pub strict_targets: bool,
    /// Timeout for phases of nodes without their own. Default: none.
    pub phase_timeout: Option<Duration>,
    /// Capacity of the broadcast event feed. Default: 256.
    pub event_capacity: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            transition: TransitionMode::Automatic,
            strict_targets: false,
            phase_timeout: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = MachineConfig::default();
        assert_eq!(config.transition, TransitionMode::Automatic);
        assert!(!config.strict_targets);
        assert_eq!(config.phase_timeout, None);
        assert_eq!(config.event_capacity, 256);
    }

    #[test]
    fn test_config_partial_deserialize() {
        let config: MachineConfig =
            serde_json::from_str(r#"{ "transition": "Manual", "strict_targets": true }"#).unwrap();
        assert_eq!(config.transition, TransitionMode::Manual);
        assert!(config.strict_targets);
        assert_eq!(config.event_capacity, DEFAULT_EVENT_CAPACITY);
    }
}
