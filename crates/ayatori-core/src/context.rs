//! Execution context: caller data plus the engine's `output` and `status`
//! namespaces.

use crate::error::MachineError;
use crate::event::{ActionStatus, LifecycleEvent, Phase};
use crate::phase::StateName;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Keys the engine reserves for its own namespaces, compared case-insensitively.
pub const RESERVED_KEYS: [&str; 2] = ["output", "status"];

/// Type-safe context key wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextKey(String);

impl ContextKey {
    /// Creates a new ContextKey.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the key collides with a reserved namespace.
    pub fn is_reserved(&self) -> bool {
        RESERVED_KEYS
            .iter()
            .any(|reserved| self.0.eq_ignore_ascii_case(reserved))
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContextKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ContextKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for ContextKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for ContextKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Output slot of one phase: the value it returned or the error it raised.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseOutput {
    /// Value returned by the phase.
    pub data: Option<Value>,
    /// Rendered failure of the phase.
    pub error: Option<String>,
}

impl PhaseOutput {
    /// Returns `true` if neither data nor error is set.
    pub fn is_empty(&self) -> bool {
        self.data.is_none() && self.error.is_none()
    }
}

/// Serializable snapshot of the engine namespaces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Status per state.
    pub status: BTreeMap<StateName, ActionStatus>,
    /// Phase outputs per state.
    pub output: BTreeMap<StateName, BTreeMap<Phase, PhaseOutput>>,
}

/// Execution context shared by every state of a machine.
///
/// Caller data is stored heterogeneously and retrieved by downcasting. The
/// engine keeps two further namespaces next to it: `output` (state ->
/// phase -> [`PhaseOutput`]) and `status` (state -> [`ActionStatus`]).
///
/// # Examples
///
/// ```
/// use ayatori_core::Context;
///
/// let mut ctx = Context::new();
/// ctx.insert("user_id", 123u64);
/// ctx.insert("name", "Alice".to_string());
///
/// assert_eq!(ctx.get::<u64>("user_id"), Some(&123));
/// assert_eq!(ctx.get::<String>("name"), Some(&"Alice".to_string()));
///
/// // Wrong type returns None
/// assert_eq!(ctx.get::<String>("user_id"), None);
/// ```
pub struct Context {
    data: HashMap<ContextKey, Box<dyn Any + Send + Sync>>,
    output: BTreeMap<StateName, BTreeMap<Phase, PhaseOutput>>,
    status: BTreeMap<StateName, ActionStatus>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("keys", &self.data.keys().collect::<Vec<_>>())
            .field("status", &self.status)
            .field("output", &self.output)
            .finish()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Creates a new empty context.
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            output: BTreeMap::new(),
            status: BTreeMap::new(),
        }
    }

    /// Inserts a value with the given key.
    ///
    /// If the key already exists, the previous value is replaced.
    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<ContextKey>, value: T) {
        self.data.insert(key.into(), Box::new(value));
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with<T: Any + Send + Sync>(mut self, key: impl Into<ContextKey>, value: T) -> Self {
        self.insert(key, value);
        self
    }

    /// Returns a reference to the value for the given key.
    ///
    /// Returns `None` if the key doesn't exist or the type doesn't match.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.data.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    /// Removes a value by key and returns it.
    pub fn remove<T: Any>(&mut self, key: &str) -> Option<T> {
        self.data
            .remove(key)
            .and_then(|v| v.downcast::<T>().ok())
            .map(|b| *b)
    }

    /// Returns `true` if the context contains a caller value for the given key.
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Returns an iterator over all caller keys.
    pub fn keys(&self) -> impl Iterator<Item = &ContextKey> {
        self.data.keys()
    }

    /// Returns the number of caller entries.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the context holds no caller entries.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Caller keys that collide with [`RESERVED_KEYS`], sorted.
    pub fn reserved_collisions(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .data
            .keys()
            .filter(|key| key.is_reserved())
            .map(|key| key.as_str().to_string())
            .collect();
        keys.sort();
        keys
    }

    /// Validates caller keys and seeds the engine namespaces.
    ///
    /// Every state gets an empty `output` slot and a `Pending` status.
    ///
    /// # Errors
    ///
    /// [`MachineError::ReservedKeys`] naming every caller key that equals
    /// `output` or `status` ignoring case.
    pub fn prepare<'a>(
        mut self,
        states: impl IntoIterator<Item = &'a StateName>,
    ) -> Result<Self, MachineError> {
        let collisions = self.reserved_collisions();
        if !collisions.is_empty() {
            return Err(MachineError::ReservedKeys(collisions));
        }

        self.output.clear();
        self.status.clear();
        for state in states {
            self.output.insert(state.clone(), BTreeMap::new());
            self.status.insert(state.clone(), ActionStatus::Pending);
        }
        Ok(self)
    }

    /// Status of a state, `None` for undeclared states.
    pub fn status(&self, state: &str) -> Option<ActionStatus> {
        self.status.get(state).copied()
    }

    /// Output slot of one phase of a state.
    pub fn output(&self, state: &str, phase: Phase) -> Option<&PhaseOutput> {
        self.output.get(state).and_then(|phases| phases.get(&phase))
    }

    /// All phase outputs recorded for a state.
    pub fn outputs(&self, state: &str) -> Option<&BTreeMap<Phase, PhaseOutput>> {
        self.output.get(state)
    }

    /// Iterates over every declared state and its status.
    pub fn statuses(&self) -> impl Iterator<Item = (&StateName, ActionStatus)> {
        self.status.iter().map(|(name, status)| (name, *status))
    }

    /// Snapshot of the engine namespaces.
    pub fn report(&self) -> RunReport {
        RunReport {
            status: self.status.clone(),
            output: self.output.clone(),
        }
    }

    /// Folds a lifecycle event into the engine namespaces.
    ///
    /// - `Starting` clears the output slots of the phase and of every phase
    ///   after it, then sets the status.
    /// - `Output` writes the payload into the phase's output slot.
    /// - `Error` records the error in the slot and sets the status.
    /// - `Finished` sets the status, unless a phase of the state holds an
    ///   error.
    pub fn apply(&mut self, event: &LifecycleEvent) {
        let phase = event.phase();
        match event.status() {
            ActionStatus::Output => {
                let slot = self.slot(&event.state, phase);
                *slot = event.payload.clone().unwrap_or_default();
            }
            ActionStatus::Error => {
                let error = event.payload.as_ref().and_then(|p| p.error.clone());
                self.slot(&event.state, phase).error = error;
                self.status.insert(event.state.clone(), ActionStatus::Error);
            }
            ActionStatus::Starting => {
                // Later phases belong to a previous attempt.
                if let Some(phases) = self.output.get_mut(event.state.as_str()) {
                    phases.retain(|recorded, _| *recorded < phase);
                }
                self.status.insert(event.state.clone(), ActionStatus::Starting);
            }
            ActionStatus::Finished => {
                let failed = self
                    .outputs(event.state.as_str())
                    .is_some_and(|phases| phases.values().any(|slot| slot.error.is_some()));
                if !failed {
                    self.status.insert(event.state.clone(), ActionStatus::Finished);
                }
            }
            ActionStatus::Pending => {
                self.status.insert(event.state.clone(), ActionStatus::Pending);
            }
        }
    }

    fn slot(&mut self, state: &StateName, phase: Phase) -> &mut PhaseOutput {
        self.output
            .entry(state.clone())
            .or_default()
            .entry(phase)
            .or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names(names: &[&str]) -> Vec<StateName> {
        names.iter().map(|n| StateName::new(*n)).collect()
    }

    #[test]
    fn test_heterogeneous_storage() {
        let mut ctx = Context::new();

        ctx.insert("int", 42i32);
        ctx.insert("string", "hello".to_string());
        ctx.insert("bool", true);

        assert_eq!(ctx.get::<i32>("int"), Some(&42));
        assert_eq!(ctx.get::<String>("string"), Some(&"hello".to_string()));
        assert_eq!(ctx.get::<bool>("bool"), Some(&true));
        assert_eq!(ctx.get::<String>("int"), None);
    }

    #[test]
    fn test_remove() {
        let mut ctx = Context::new().with("key", "value".to_string());

        let removed = ctx.remove::<String>("key");
        assert_eq!(removed, Some("value".to_string()));
        assert!(!ctx.contains_key("key"));
    }

    #[test]
    fn test_prepare_seeds_namespaces() {
        let states = names(&["Start", "Next"]);
        let ctx = Context::new().with("seed", 1u8).prepare(&states).unwrap();

        assert_eq!(ctx.status("Start"), Some(ActionStatus::Pending));
        assert_eq!(ctx.status("Next"), Some(ActionStatus::Pending));
        assert_eq!(ctx.status("Other"), None);
        assert!(ctx.outputs("Start").is_some_and(|o| o.is_empty()));
        assert_eq!(ctx.output("Start", Phase::Action), None);
        assert_eq!(ctx.get::<u8>("seed"), Some(&1));
    }

    #[test]
    fn test_prepare_rejects_reserved_keys() {
        let ctx = Context::new()
            .with("Output", 1u8)
            .with("STATUS", 2u8)
            .with("outputs", 3u8);

        let err = ctx.prepare(&names(&["Start"])).unwrap_err();
        assert_eq!(
            err,
            MachineError::ReservedKeys(vec!["Output".to_string(), "STATUS".to_string()])
        );
    }

    #[test]
    fn test_apply_success_sequence() {
        let start = StateName::new("Start");
        let mut ctx = Context::new().prepare([&start]).unwrap();

        ctx.apply(&LifecycleEvent::starting(start.clone(), Phase::Action));
        assert_eq!(ctx.status("Start"), Some(ActionStatus::Starting));

        ctx.apply(&LifecycleEvent::output(start.clone(), Phase::Action, json!("A")));
        ctx.apply(&LifecycleEvent::finished(start.clone(), Phase::Action));

        assert_eq!(ctx.status("Start"), Some(ActionStatus::Finished));
        assert_eq!(
            ctx.output("Start", Phase::Action).and_then(|o| o.data.clone()),
            Some(json!("A"))
        );
    }

    #[test]
    fn test_apply_error_survives_finished() {
        let start = StateName::new("Start");
        let mut ctx = Context::new().prepare([&start]).unwrap();

        ctx.apply(&LifecycleEvent::starting(start.clone(), Phase::Action));
        ctx.apply(&LifecycleEvent::error(start.clone(), Phase::Action, "boom"));
        ctx.apply(&LifecycleEvent::finished(start.clone(), Phase::Action));

        assert_eq!(ctx.status("Start"), Some(ActionStatus::Error));
        assert_eq!(
            ctx.output("Start", Phase::Action),
            Some(&PhaseOutput {
                data: None,
                error: Some("boom".to_string()),
            })
        );

        // A successful post-action does not hide the failed action.
        ctx.apply(&LifecycleEvent::starting(start.clone(), Phase::PostAction));
        ctx.apply(&LifecycleEvent::output(start.clone(), Phase::PostAction, json!(0)));
        ctx.apply(&LifecycleEvent::finished(start.clone(), Phase::PostAction));
        assert_eq!(ctx.status("Start"), Some(ActionStatus::Error));

        // A later successful attempt clears the stale error.
        ctx.apply(&LifecycleEvent::starting(start.clone(), Phase::Action));
        ctx.apply(&LifecycleEvent::output(start.clone(), Phase::Action, json!(1)));
        ctx.apply(&LifecycleEvent::finished(start.clone(), Phase::Action));
        assert_eq!(ctx.status("Start"), Some(ActionStatus::Finished));
    }

    #[test]
    fn test_retry_attempt_starts_clean() {
        let start = StateName::new("Start");
        let mut ctx = Context::new().prepare([&start]).unwrap();

        for event in [
            LifecycleEvent::starting(start.clone(), Phase::PreAction),
            LifecycleEvent::output(start.clone(), Phase::PreAction, json!("pre")),
            LifecycleEvent::finished(start.clone(), Phase::PreAction),
            LifecycleEvent::starting(start.clone(), Phase::Action),
            LifecycleEvent::error(start.clone(), Phase::Action, "boom"),
            LifecycleEvent::finished(start.clone(), Phase::Action),
        ] {
            ctx.apply(&event);
        }
        assert_eq!(ctx.status("Start"), Some(ActionStatus::Error));

        ctx.apply(&LifecycleEvent::starting(start.clone(), Phase::PreAction));
        assert_eq!(ctx.output("Start", Phase::Action), None);

        ctx.apply(&LifecycleEvent::output(start.clone(), Phase::PreAction, json!("pre")));
        ctx.apply(&LifecycleEvent::finished(start.clone(), Phase::PreAction));
        assert_eq!(ctx.status("Start"), Some(ActionStatus::Finished));
    }

    #[test]
    fn test_report_serializes() {
        let start = StateName::new("Start");
        let mut ctx = Context::new().prepare([&start]).unwrap();
        ctx.apply(&LifecycleEvent::output(start, Phase::Action, json!({"n": 1})));

        let report = serde_json::to_value(ctx.report()).unwrap();
        assert_eq!(report["status"]["Start"], json!("Pending"));
        assert_eq!(report["output"]["Start"]["Action"]["data"], json!({"n": 1}));
    }
}
