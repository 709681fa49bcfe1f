//! Record of the transitions taken during a run.

use super::key::Key;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One transition taken by the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    /// Name of the state whose action produced the key
    pub from: String,
    /// Name of the state selected by the key
    pub to: String,
    /// The key that fired the transition
    pub key: Key,
    /// Zero-based index of the step that produced the key
    pub step: usize,
    /// When the transition was taken
    pub timestamp: DateTime<Utc>,
}

/// Ordered history of transitions.
///
/// # Example
///
/// ```rust
/// use scenario_harness::core::{Key, StateHistory, StateTransition};
/// use chrono::Utc;
///
/// let mut history = StateHistory::new();
/// history.record(StateTransition {
///     from: "Drive".to_string(),
///     to: "Switch".to_string(),
///     key: Key::from(true),
///     step: 0,
///     timestamp: Utc::now(),
/// });
///
/// assert_eq!(history.get_path(), vec!["Drive", "Switch"]);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateHistory {
    transitions: Vec<StateTransition>,
}

impl StateHistory {
    pub fn new() -> Self {
        Self {
            transitions: Vec::new(),
        }
    }

    pub fn record(&mut self, transition: StateTransition) {
        self.transitions.push(transition);
    }

    /// Names of the states traversed: the first source, then every target.
    pub fn get_path(&self) -> Vec<&str> {
        let mut path = Vec::with_capacity(self.transitions.len() + 1);
        if let Some(first) = self.transitions.first() {
            path.push(first.from.as_str());
        }
        path.extend(self.transitions.iter().map(|t| t.to.as_str()));
        path
    }

    /// Time between the first and last recorded transition.
    pub fn duration(&self) -> Option<Duration> {
        let first = self.transitions.first()?;
        let last = self.transitions.last()?;
        last.timestamp
            .signed_duration_since(first.timestamp)
            .to_std()
            .ok()
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}
