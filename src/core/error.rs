//! Errors raised while building and running engines.

use super::key::{Key, KeyKind};
use thiserror::Error;

/// Failure reported by a state action.
///
/// Actions talk to collaborators (actors, environments, sinks, child
/// engines) whose errors are carried through unchanged.
pub type ActionError = Box<dyn std::error::Error + Send + Sync>;

/// A malformed graph or a mis-specialized guard.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigurationError {
    #[error("Engine has no registered states")]
    NoStates,

    #[error("Transition source is not registered with this engine")]
    UnregisteredSource,

    #[error("Transition from '{from}' targets a state not registered with this engine")]
    UnregisteredTarget { from: String },

    #[error("Initial state is not registered with this engine")]
    UnregisteredInitial,

    #[error("Guard evaluated before it was specialized with a relation")]
    UnspecializedGuard,

    #[error("Guard is already specialized as '{existing}'")]
    GuardAlreadySpecialized { existing: String },

    #[error("Guard cannot compare non-numeric key {key}")]
    NonNumericKey { key: Key },

    #[error("State '{state}' returns {kind} keys but has a guard transition")]
    GuardOnNonNumericState { state: String, kind: KeyKind },

    #[error("State '{state}' needs a bound parameter but none was bound")]
    MissingParameter { state: String },
}

/// Errors that can occur when building an engine.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Engine graph is invalid: {}", summarize(.0))]
    Invalid(Vec<ConfigurationError>),
}

impl BuildError {
    /// All violations found while validating the graph.
    pub fn violations(&self) -> &[ConfigurationError] {
        match self {
            Self::Invalid(violations) => violations,
        }
    }
}

fn summarize(violations: &[ConfigurationError]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("State '{state}' is misconfigured: {source}")]
    Misconfigured {
        state: String,
        #[source]
        source: ConfigurationError,
    },

    #[error("State '{state}' returned key {key}, which matches none of its {candidates} transitions")]
    UnresolvedTransition {
        state: String,
        key: Key,
        candidates: usize,
    },

    #[error("Action of state '{state}' failed: {source}")]
    Action {
        state: String,
        #[source]
        source: ActionError,
    },

    #[error("Run exceeded the limit of {limit} steps (last state '{state}')")]
    StepLimitExceeded { limit: usize, state: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_error_lists_every_violation() {
        let error = BuildError::Invalid(vec![
            ConfigurationError::UnspecializedGuard,
            ConfigurationError::UnregisteredTarget {
                from: "Drive".to_string(),
            },
        ]);

        let message = error.to_string();
        assert!(message.contains("specialized"));
        assert!(message.contains("'Drive'"));
        assert_eq!(error.violations().len(), 2);
    }

    #[test]
    fn unresolved_transition_names_state_and_key() {
        let error = EngineError::UnresolvedTransition {
            state: "Check".to_string(),
            key: Key::from(4),
            candidates: 2,
        };

        let message = error.to_string();
        assert!(message.contains("'Check'"));
        assert!(message.contains("key 4"));
    }
}
