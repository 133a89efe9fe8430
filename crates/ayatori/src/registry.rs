//! Registry of state definitions, keyed by name.

use crate::definition::{StateDefinition, StateKind};
use ayatori_core::{MachineError, StateName};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Immutable mapping from state name to definition.
///
/// Built once by the machine builder. Registering a name twice keeps the
/// last definition. Targets are only checked on request, see
/// [`unresolved_targets`](Self::unresolved_targets).
#[derive(Default)]
pub struct StateRegistry {
    states: HashMap<StateName, StateDefinition>,
}

impl fmt::Debug for StateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateRegistry")
            .field("states", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

impl StateRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a definition, returning the one it replaced.
    pub fn insert(
        &mut self,
        name: impl Into<StateName>,
        definition: StateDefinition,
    ) -> Option<StateDefinition> {
        self.states.insert(name.into(), definition)
    }

    /// Looks a state up by name.
    pub fn get(&self, name: &str) -> Option<&StateDefinition> {
        self.states.get(name)
    }

    /// Looks a state up, failing with [`MachineError::StateNotFound`].
    pub fn resolve(&self, name: &str) -> Result<&StateDefinition, MachineError> {
        self.states
            .get(name)
            .ok_or_else(|| MachineError::StateNotFound(StateName::new(name)))
    }

    /// Returns `true` if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    /// Iterates over registered names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &StateName> {
        self.states.keys()
    }

    /// Number of registered states, block children excluded.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns `true` if no state is registered.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Every state that needs a context slot: registered states and the
    /// children of blocks, at any depth.
    pub fn declared_names(&self) -> Vec<&StateName> {
        let mut names = Vec::new();
        for (name, definition) in &self.states {
            names.push(name);
            collect_children(definition, &mut names);
        }
        names
    }

    /// `(state, target)` pairs whose target is not registered, sorted.
    pub fn unresolved_targets(&self) -> Vec<(StateName, StateName)> {
        let mut unresolved: Vec<_> = self
            .states
            .iter()
            .filter_map(|(name, definition)| {
                definition
                    .target_state()
                    .filter(|target| !self.contains(target.as_str()))
                    .map(|target| (name.clone(), target.clone()))
            })
            .collect();
        unresolved.sort();
        unresolved
    }

    /// Checks that block children use names no other state uses.
    pub fn check_block_names(&self) -> Result<(), MachineError> {
        let mut seen: HashSet<&StateName> = self.states.keys().collect();
        let mut children = Vec::new();
        for definition in self.states.values() {
            collect_children(definition, &mut children);
        }
        for child in children {
            if !seen.insert(child) {
                return Err(MachineError::Configuration(format!(
                    "Block child name '{}' is already used by another state",
                    child
                )));
            }
        }
        Ok(())
    }
}

fn collect_children<'a>(definition: &'a StateDefinition, names: &mut Vec<&'a StateName>) {
    if let StateKind::Block(children) = definition.kind() {
        for (name, child) in children {
            names.push(name);
            collect_children(child, names);
        }
    }
}

impl<N: Into<StateName>> FromIterator<(N, StateDefinition)> for StateRegistry {
    fn from_iter<I: IntoIterator<Item = (N, StateDefinition)>>(iter: I) -> Self {
        let mut registry = Self::new();
        for (name, definition) in iter {
            registry.insert(name, definition);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::StateNode;
    use ayatori_core::json;

    fn single() -> StateDefinition {
        StateDefinition::single(StateNode::from_fn(|_ctx, _scope| Ok(json!(null))))
    }

    #[test]
    fn test_resolve() {
        let registry: StateRegistry = [("Start", single())].into_iter().collect();

        assert!(registry.resolve("Start").is_ok());
        assert_eq!(
            registry.resolve("Missing").unwrap_err(),
            MachineError::StateNotFound(StateName::new("Missing"))
        );
    }

    #[test]
    fn test_last_registration_wins() {
        let mut registry = StateRegistry::new();
        registry.insert("Start", single());
        let replaced = registry.insert("Start", single().target("Next"));

        assert!(replaced.is_some());
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get("Start").and_then(|d| d.target_state()),
            Some(&StateName::new("Next"))
        );
    }

    #[test]
    fn test_unresolved_targets_are_reported_not_rejected() {
        let registry: StateRegistry = [
            ("Start", single().target("Next")),
            ("Next", single().target("Nowhere")),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            registry.unresolved_targets(),
            vec![(StateName::new("Next"), StateName::new("Nowhere"))]
        );
    }

    #[test]
    fn test_declared_names_include_block_children() {
        let registry: StateRegistry = [
            ("Start", single()),
            (
                "Fan",
                StateDefinition::block([
                    ("Left", single()),
                    ("Right", StateDefinition::block([("Inner", single())])),
                ]),
            ),
        ]
        .into_iter()
        .collect();

        let mut names: Vec<&str> = registry
            .declared_names()
            .into_iter()
            .map(|n| n.as_str())
            .collect();
        names.sort();
        assert_eq!(names, vec!["Fan", "Inner", "Left", "Right", "Start"]);
        assert!(registry.check_block_names().is_ok());
    }

    #[test]
    fn test_block_child_name_collision() {
        let registry: StateRegistry = [
            ("Start", single()),
            ("Fan", StateDefinition::block([("Start", single())])),
        ]
        .into_iter()
        .collect();

        assert!(matches!(
            registry.check_block_names(),
            Err(MachineError::Configuration(_))
        ));
    }
}
