//! The run-to-completion dispatcher.

use super::error::{ConfigurationError, EngineError};
use super::history::{StateHistory, StateTransition};
use super::key::Key;
use super::matcher::first_match;
use super::state::{State, StateId, StepContext};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;
use uuid::Uuid;

/// Per-run settings passed into [`Engine::run`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Pause between iterations. Affects cadence only.
    pub step_delay: Duration,
    /// Keep a [`StateHistory`] of the run. It grows by one entry per step,
    /// so leave it off for runs that only end when interrupted.
    pub record_history: bool,
    /// Abort with [`EngineError::StepLimitExceeded`] after this many steps.
    pub max_steps: Option<usize>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            step_delay: Duration::ZERO,
            record_history: true,
            max_steps: None,
        }
    }
}

impl RunConfig {
    pub fn paced(step_delay: Duration) -> Self {
        Self {
            step_delay,
            ..Self::default()
        }
    }

    pub fn with_history(mut self, record_history: bool) -> Self {
        self.record_history = record_history;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }
}

/// Result of a completed run.
#[derive(Debug)]
pub struct RunOutcome<P> {
    /// Key returned by the ending state's action
    pub key: Key,
    /// Payload returned by the ending state's action
    pub payload: P,
    /// Name of the ending state
    pub final_state: String,
    /// Number of actions executed, the ending one included
    pub steps: usize,
    /// Transitions taken, empty unless history recording is on
    pub history: StateHistory,
}

/// A validated graph of states with a single current state.
///
/// Engines are produced by [`EngineBuilder`](super::EngineBuilder) and
/// consumed by [`run`](Engine::run); a scenario or a nested call builds a
/// fresh one each time.
pub struct Engine<P, C = ()> {
    registry: Uuid,
    states: Vec<State<P, C>>,
    current: StateId,
}

impl<P, C> Engine<P, C> {
    pub(crate) fn from_parts(registry: Uuid, states: Vec<State<P, C>>, current: StateId) -> Self {
        Self {
            registry,
            states,
            current,
        }
    }

    pub fn current_state(&self) -> StateId {
        self.current
    }

    /// Move the starting point before the run begins.
    pub fn set_current_state(&mut self, state: StateId) -> Result<(), ConfigurationError> {
        if self.state(state).is_none() {
            return Err(ConfigurationError::UnregisteredInitial);
        }
        self.current = state;
        Ok(())
    }

    /// Look up a registered state.
    pub fn state(&self, id: StateId) -> Option<&State<P, C>> {
        if id.registry() != self.registry {
            return None;
        }
        self.states.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Run until an ending state executes.
    ///
    /// Each iteration invokes the current state's action, then either
    /// returns (ending state) or follows the first transition whose matcher
    /// accepts the returned key. A key no entry accepts aborts the run with
    /// [`EngineError::UnresolvedTransition`].
    pub fn run(self, payload: P, config: &RunConfig) -> Result<RunOutcome<P>, EngineError> {
        self.run_at_depth(payload, config, 0)
    }

    /// Run as a child of the state whose context is `parent`.
    ///
    /// The child reuses the parent's run configuration and executes on the
    /// caller's thread; control returns once the child reaches an ending
    /// state. Nothing bounds the nesting depth, so a child graph that
    /// builds itself again recurses until the stack runs out.
    pub fn run_nested<PC>(
        self,
        parent: &StepContext<'_, PC>,
        payload: P,
    ) -> Result<RunOutcome<P>, EngineError> {
        self.run_at_depth(payload, parent.config(), parent.depth() + 1)
    }

    fn run_at_depth(
        mut self,
        mut payload: P,
        config: &RunConfig,
        depth: usize,
    ) -> Result<RunOutcome<P>, EngineError> {
        let span = tracing::debug_span!("engine", registry = %self.registry, depth);
        let _entered = span.enter();

        let mut current = self.current.index();
        let mut history = StateHistory::new();
        let mut steps = 0usize;

        tracing::debug!(
            initial = %self.states[current].name,
            states = self.states.len(),
            "Starting run"
        );

        loop {
            if let Some(limit) = config.max_steps {
                if steps >= limit {
                    return Err(EngineError::StepLimitExceeded {
                        limit,
                        state: self.states[current].name.clone(),
                    });
                }
            }

            let State {
                name,
                action,
                param,
                ending,
                transitions,
                ..
            } = &mut self.states[current];

            let context = StepContext::new(param.as_ref(), config, depth, name);
            let (key, next) = action(&context, payload).map_err(|source| EngineError::Action {
                state: name.clone(),
                source,
            })?;
            let step = steps;
            steps += 1;

            if *ending {
                tracing::debug!(state = %name, %key, steps, "Reached ending state");
                return Ok(RunOutcome {
                    key,
                    payload: next,
                    final_state: name.clone(),
                    steps,
                    history,
                });
            }

            let target = first_match(transitions, &key)
                .map_err(|source| EngineError::Misconfigured {
                    state: name.clone(),
                    source,
                })?
                .ok_or_else(|| EngineError::UnresolvedTransition {
                    state: name.clone(),
                    key,
                    candidates: transitions.len(),
                })?;

            if config.record_history {
                let from = name.clone();
                history.record(StateTransition {
                    from,
                    to: self.states[target.index()].name.clone(),
                    key,
                    step,
                    timestamp: Utc::now(),
                });
            }
            tracing::trace!(
                from = %self.states[current].name,
                to = %self.states[target.index()].name,
                %key,
                "Transition"
            );

            current = target.index();
            payload = next;

            if !config.step_delay.is_zero() {
                thread::sleep(config.step_delay);
            }
        }
    }
}

impl<P, C> std::fmt::Debug for Engine<P, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry)
            .field("states", &self.states)
            .field("current", &self.current)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EngineBuilder, Guard, KeyKind, Matcher};

    /// Returns `counter - 1` while that stays positive, then the sentinel.
    fn countdown() -> State<i64> {
        State::new("A", |_ctx, counter: i64| {
            let next = counter - 1;
            if next > 0 {
                Ok((Key::from(next), next))
            } else {
                Ok((Key::EXHAUSTED, next))
            }
        })
        .returns(KeyKind::Numeric)
    }

    fn countdown_engine() -> Engine<i64> {
        let mut builder = EngineBuilder::new();
        let a = builder.add_state(countdown());
        let b = builder.add_state(State::new("B", |_ctx, n: i64| Ok((Key::from(42), n))).ending());
        builder
            .add_transition(a, Matcher::guard(Guard::greater_than(0)), a)
            .add_transition(a, Key::EXHAUSTED, b);
        builder.build().unwrap()
    }

    #[test]
    fn countdown_reaches_ending_state() {
        let outcome = countdown_engine().run(2, &RunConfig::default()).unwrap();

        assert_eq!(outcome.key, Key::from(42));
        assert_eq!(outcome.payload, 0);
        assert_eq!(outcome.final_state, "B");
        assert_eq!(outcome.steps, 3);
        assert_eq!(outcome.history.get_path(), vec!["A", "A", "B"]);
    }

    #[test]
    fn unmatched_key_is_fatal() {
        let mut builder = EngineBuilder::<i64>::new();
        let a = builder.add_state(State::new("A", |_ctx, n: i64| Ok((Key::from(n), n))));
        let b = builder.add_state(State::new("B", |_ctx, n: i64| Ok((Key::from(n), n))).ending());
        builder
            .add_transition(a, Matcher::guard(Guard::greater_than(0)), a)
            .add_transition(a, Key::EXHAUSTED, b);

        let error = builder.build().unwrap().run(0, &RunConfig::default()).unwrap_err();

        match error {
            EngineError::UnresolvedTransition {
                state,
                key,
                candidates,
            } => {
                assert_eq!(state, "A");
                assert_eq!(key, Key::from(0));
                assert_eq!(candidates, 2);
            }
            other => panic!("Expected UnresolvedTransition, got {other:?}"),
        }
    }

    #[test]
    fn ending_state_skips_transition_lookup() {
        let mut builder = EngineBuilder::<i64>::new();
        let only = builder.add_state(
            State::new("Only", |_ctx, n: i64| Ok((Key::from(false), n + 1))).ending(),
        );
        builder.add_transition(only, true, only);

        let outcome = builder.build().unwrap().run(0, &RunConfig::default()).unwrap();

        assert_eq!(outcome.key, Key::from(false));
        assert_eq!(outcome.payload, 1);
        assert_eq!(outcome.steps, 1);
        assert!(outcome.history.is_empty());
    }

    #[test]
    fn guard_over_boolean_key_aborts_run() {
        let mut builder = EngineBuilder::<i64>::new();
        let a = builder.add_state(State::new("A", |_ctx, n: i64| Ok((Key::from(true), n))));
        builder.add_transition(a, Matcher::guard(Guard::greater_than(0)), a);

        let error = builder.build().unwrap().run(0, &RunConfig::default()).unwrap_err();

        assert!(matches!(
            error,
            EngineError::Misconfigured {
                source: ConfigurationError::NonNumericKey { .. },
                ..
            }
        ));
    }

    #[test]
    fn action_failure_propagates_unchanged() {
        #[derive(Debug, thiserror::Error)]
        #[error("actuator jammed")]
        struct Jammed;

        let mut builder = EngineBuilder::<(), ()>::new();
        builder.add_state(State::new("Drive", |_ctx, ()| Err(Jammed.into())));

        let error = builder.build().unwrap().run((), &RunConfig::default()).unwrap_err();

        match error {
            EngineError::Action { state, source } => {
                assert_eq!(state, "Drive");
                assert!(source.downcast_ref::<Jammed>().is_some());
            }
            other => panic!("Expected Action error, got {other:?}"),
        }
    }

    #[test]
    fn step_limit_stops_endless_self_loop() {
        let mut builder = EngineBuilder::<(), ()>::new();
        let spin = builder.add_state(State::new("Spin", |_ctx, ()| Ok((Key::from(true), ()))));
        builder.add_transition(spin, true, spin);

        let config = RunConfig::default().with_max_steps(25);
        let error = builder.build().unwrap().run((), &config).unwrap_err();

        assert!(matches!(
            error,
            EngineError::StepLimitExceeded { limit: 25, .. }
        ));
    }

    #[test]
    fn bound_parameter_reaches_the_action() {
        let mut builder = EngineBuilder::<u32, u32>::new();
        builder.add_state(
            State::new("Add", |ctx: &StepContext<'_, u32>, n: u32| {
                let bonus = ctx.require_param()?;
                Ok((Key::from(true), n + bonus))
            })
            .bind(10)
            .ending(),
        );

        let outcome = builder.build().unwrap().run(5, &RunConfig::default()).unwrap();
        assert_eq!(outcome.payload, 15);
    }

    #[test]
    fn history_can_be_switched_off() {
        let config = RunConfig::default().with_history(false);
        let mut builder = EngineBuilder::<i64>::new();
        let a = builder.add_state(State::new("A", |_ctx, n: i64| {
            if n > 0 {
                Ok((Key::from(true), n - 1))
            } else {
                Ok((Key::from(false), n))
            }
        }));
        let b = builder.add_state(State::new("B", |_ctx, n: i64| Ok((Key::from(true), n))).ending());
        builder.add_transition(a, true, a).add_transition(a, false, b);

        let outcome = builder.build().unwrap().run(3, &config).unwrap();

        assert_eq!(outcome.steps, 5);
        assert!(outcome.history.is_empty());
    }

    #[test]
    fn set_current_state_rejects_foreign_handles() {
        let mut other = EngineBuilder::<i64>::new();
        let foreign = other.add_state(countdown());

        let mut engine = countdown_engine();
        assert_eq!(
            engine.set_current_state(foreign),
            Err(ConfigurationError::UnregisteredInitial)
        );
    }
}
