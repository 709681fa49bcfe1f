//! Assembling and validating engine graphs.
//!
//! Graphs are assembled once: states are registered, transitions appended
//! in order, then `build()` checks the whole graph. Validation accumulates
//! every violation instead of stopping at the first one.

use super::engine::Engine;
use super::error::{BuildError, ConfigurationError};
use super::key::KeyKind;
use super::matcher::{Matcher, Transition};
use super::state::{State, StateId};
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;
use uuid::Uuid;

type Check = Validation<(), NonEmptyVec<ConfigurationError>>;

struct PendingTransition {
    from: StateId,
    transition: Transition,
}

/// Builder for an [`Engine`] graph.
///
/// # Example
///
/// ```rust
/// use scenario_harness::core::{EngineBuilder, Guard, Key, Matcher, RunConfig, State};
///
/// let mut builder = EngineBuilder::<i64>::new();
/// let count = builder.add_state(State::new("Count", |_ctx, n: i64| {
///     if n > 0 {
///         Ok((Key::from(n - 1), n - 1))
///     } else {
///         Ok((Key::EXHAUSTED, n))
///     }
/// }));
/// let done = builder.add_state(State::new("Done", |_ctx, n: i64| Ok((Key::from(true), n))).ending());
/// builder
///     .add_transition(count, Matcher::guard(Guard::greater_or_equal(0)), count)
///     .add_transition(count, Matcher::exact(Key::EXHAUSTED), done);
///
/// let outcome = builder.build().unwrap().run(3, &RunConfig::default()).unwrap();
/// assert_eq!(outcome.final_state, "Done");
/// assert_eq!(outcome.payload, 0);
/// ```
pub struct EngineBuilder<P, C = ()> {
    registry: Uuid,
    states: Vec<State<P, C>>,
    pending: Vec<PendingTransition>,
    initial: Option<StateId>,
}

impl<P, C> EngineBuilder<P, C> {
    pub fn new() -> Self {
        Self {
            registry: Uuid::new_v4(),
            states: Vec::new(),
            pending: Vec::new(),
            initial: None,
        }
    }

    /// Register a state and return its handle.
    pub fn add_state(&mut self, state: State<P, C>) -> StateId {
        let id = StateId::new(self.registry, self.states.len());
        self.states.push(state);
        id
    }

    /// Register several states at once, returning handles in order.
    pub fn add_states(&mut self, states: impl IntoIterator<Item = State<P, C>>) -> Vec<StateId> {
        states
            .into_iter()
            .map(|state| self.add_state(state))
            .collect()
    }

    /// Append a transition to `from`'s table.
    ///
    /// Order matters: at run time the first matching entry wins.
    pub fn add_transition(
        &mut self,
        from: StateId,
        matcher: impl Into<Matcher>,
        to: StateId,
    ) -> &mut Self {
        self.pending.push(PendingTransition {
            from,
            transition: Transition {
                matcher: matcher.into(),
                target: to,
            },
        });
        self
    }

    /// Override the starting state (defaults to the first registered).
    pub fn set_initial(&mut self, state: StateId) -> &mut Self {
        self.initial = Some(state);
        self
    }

    /// Validate the graph and produce a runnable engine.
    pub fn build(mut self) -> Result<Engine<P, C>, BuildError> {
        match self.validate() {
            Validation::Success(_) => {}
            Validation::Failure(errors) => {
                return Err(BuildError::Invalid(errors.iter().cloned().collect()));
            }
        }

        for pending in self.pending.drain(..) {
            self.states[pending.from.index()]
                .transitions
                .push(pending.transition);
        }

        let initial = self
            .initial
            .unwrap_or_else(|| StateId::new(self.registry, 0));
        Ok(Engine::from_parts(self.registry, self.states, initial))
    }

    fn owns(&self, id: StateId) -> bool {
        id.registry() == self.registry && id.index() < self.states.len()
    }

    fn validate(&self) -> Validation<(), NonEmptyVec<ConfigurationError>> {
        let mut checks: Vec<Check> = Vec::new();

        if self.states.is_empty() {
            checks.push(Validation::fail(ConfigurationError::NoStates));
        }

        if let Some(initial) = self.initial {
            checks.push(require(
                self.owns(initial),
                ConfigurationError::UnregisteredInitial,
            ));
        }

        for pending in &self.pending {
            if !self.owns(pending.from) {
                checks.push(Validation::fail(ConfigurationError::UnregisteredSource));
                continue;
            }
            let source = &self.states[pending.from.index()];

            checks.push(require(
                self.owns(pending.transition.target),
                ConfigurationError::UnregisteredTarget {
                    from: source.name.clone(),
                },
            ));

            if let Matcher::Guard(guard) = pending.transition.matcher {
                checks.push(require(
                    guard.is_specialized(),
                    ConfigurationError::UnspecializedGuard,
                ));
                if let Some(kind @ KeyKind::Boolean) = source.key_kind {
                    checks.push(Validation::fail(
                        ConfigurationError::GuardOnNonNumericState {
                            state: source.name.clone(),
                            kind,
                        },
                    ));
                }
            }
        }

        Validation::all_vec(checks).map(|_| ())
    }
}

fn require(condition: bool, violation: ConfigurationError) -> Check {
    if condition {
        Validation::success(())
    } else {
        Validation::fail(violation)
    }
}

impl<P, C> Default for EngineBuilder<P, C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Guard, Key};

    fn noop(name: &str) -> State<(), ()> {
        State::new(name, |_ctx, ()| Ok((Key::from(true), ())))
    }

    #[test]
    fn empty_graph_is_rejected() {
        let result = EngineBuilder::<(), ()>::new().build();

        let error = result.unwrap_err();
        assert_eq!(error.violations(), &[ConfigurationError::NoStates]);
    }

    #[test]
    fn first_registered_state_is_initial_by_default() {
        let mut builder = EngineBuilder::new();
        let first = builder.add_state(noop("First"));
        builder.add_state(noop("Second"));

        let engine = builder.build().unwrap();
        assert_eq!(engine.current_state(), first);
        assert_eq!(engine.state(first).map(State::name), Some("First"));
    }

    #[test]
    fn set_initial_overrides_the_default() {
        let mut builder = EngineBuilder::new();
        builder.add_state(noop("First"));
        let second = builder.add_state(noop("Second"));
        builder.set_initial(second);

        let engine = builder.build().unwrap();
        assert_eq!(engine.current_state(), second);
    }

    #[test]
    fn validation_accumulates_all_violations() {
        let mut foreign = EngineBuilder::<(), ()>::new();
        let stranger = foreign.add_state(noop("Stranger"));

        let mut builder = EngineBuilder::new();
        let a = builder.add_state(noop("A").returns(KeyKind::Boolean));
        builder
            .add_transition(a, Matcher::guard(Guard::new()), a)
            .add_transition(a, true, stranger)
            .set_initial(stranger);

        let error = builder.build().unwrap_err();
        let violations = error.violations();

        assert!(violations.contains(&ConfigurationError::UnspecializedGuard));
        assert!(violations.contains(&ConfigurationError::GuardOnNonNumericState {
            state: "A".to_string(),
            kind: KeyKind::Boolean,
        }));
        assert!(violations.contains(&ConfigurationError::UnregisteredTarget {
            from: "A".to_string(),
        }));
        assert!(violations.contains(&ConfigurationError::UnregisteredInitial));
    }

    #[test]
    fn transition_from_foreign_state_is_rejected() {
        let mut foreign = EngineBuilder::<(), ()>::new();
        let stranger = foreign.add_state(noop("Stranger"));

        let mut builder = EngineBuilder::new();
        let a = builder.add_state(noop("A"));
        builder.add_transition(stranger, true, a);

        let error = builder.build().unwrap_err();
        assert_eq!(error.violations(), &[ConfigurationError::UnregisteredSource]);
    }

    #[test]
    fn transitions_keep_registration_order() {
        let mut builder = EngineBuilder::new();
        let a = builder.add_state(noop("A"));
        let b = builder.add_state(noop("B"));
        builder
            .add_transition(a, Matcher::guard(Guard::greater_than(0)), a)
            .add_transition(a, 0, a)
            .add_transition(a, -1, b);

        let engine = builder.build().unwrap();
        let table = engine.state(a).unwrap().transitions();

        assert_eq!(table.len(), 3);
        assert!(table[0].matcher.is_guard());
        assert_eq!(table[1].matcher, Matcher::exact(0));
        assert_eq!(table[2].target, b);
    }
}
