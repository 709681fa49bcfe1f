//! Running a child engine from inside a parent state's action.

use super::engine::{Engine, RunOutcome};
use super::error::BuildError;
use super::key::Key;
use super::state::{ActionResult, StepContext};

/// Build an action that runs a freshly built child engine to completion.
///
/// `build` assembles the child graph from the parent context and a view of
/// the payload; the child then runs on the same thread with the parent's
/// run configuration. `remap` sees the child's terminal outcome exactly as
/// the child produced it and picks the key the parent state returns. The
/// child's final payload is handed back to the parent unchanged.
///
/// A child factory that ends up nesting itself recurses without limit.
///
/// # Example
///
/// ```rust
/// use scenario_harness::core::{
///     nested, EngineBuilder, Key, RunConfig, RunOutcome, State, StepContext,
/// };
///
/// let mut parent = EngineBuilder::<u32>::new();
/// parent.add_state(
///     State::new(
///         "Child",
///         nested(
///             |_ctx: &StepContext<'_, ()>, _payload: &u32| {
///                 let mut child = EngineBuilder::<u32>::new();
///                 child.add_state(State::new("Bump", |_ctx, n: u32| Ok((Key::from(7), n + 1))).ending());
///                 child.build()
///             },
///             |outcome: &RunOutcome<u32>| Key::from(outcome.key == Key::from(7)),
///         ),
///     )
///     .ending(),
/// );
///
/// let outcome = parent.build().unwrap().run(1, &RunConfig::default()).unwrap();
/// assert_eq!(outcome.key, Key::from(true));
/// assert_eq!(outcome.payload, 2);
/// ```
pub fn nested<P, C, CC, F, R>(
    mut build: F,
    mut remap: R,
) -> impl FnMut(&StepContext<'_, C>, P) -> ActionResult<P>
where
    F: FnMut(&StepContext<'_, C>, &P) -> Result<Engine<P, CC>, BuildError> + 'static,
    R: FnMut(&RunOutcome<P>) -> Key + 'static,
{
    move |ctx, payload| {
        let child = build(ctx, &payload)?;
        let outcome = child.run_nested(ctx, payload)?;
        let key = remap(&outcome);
        tracing::debug!(
            parent = ctx.state_name(),
            depth = ctx.depth() + 1,
            child_state = %outcome.final_state,
            child_key = %outcome.key,
            %key,
            "Child engine finished"
        );
        Ok((key, outcome.payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EngineBuilder, EngineError, Guard, Matcher, RunConfig, State};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn child_graph(budget: i64) -> Result<Engine<i64>, BuildError> {
        let mut child = EngineBuilder::new();
        let spend = child.add_state(State::new("Spend", |_ctx, n: i64| {
            if n <= 0 {
                Ok((Key::EXHAUSTED, n))
            } else {
                Ok((Key::from(n - 1), n - 1))
            }
        }));
        let done = child.add_state(State::new("Done", |_ctx, n: i64| Ok((Key::EXHAUSTED, n))).ending());
        child
            .add_transition(spend, Matcher::guard(Guard::greater_than(0)), spend)
            .add_transition(spend, 0, spend)
            .add_transition(spend, -1, done);
        if budget <= 0 {
            child.set_initial(done);
        }
        child.build()
    }

    #[test]
    fn remap_sees_the_unmodified_child_outcome() {
        let seen: Rc<RefCell<Vec<(Key, i64, String)>>> = Rc::default();
        let log = Rc::clone(&seen);

        let mut parent = EngineBuilder::<i64>::new();
        let run_child = parent.add_state(State::new(
            "RunChild",
            nested(
                |_ctx: &StepContext<'_, ()>, budget: &i64| child_graph(*budget),
                move |outcome: &RunOutcome<i64>| {
                    log.borrow_mut().push((
                        outcome.key,
                        outcome.payload,
                        outcome.final_state.clone(),
                    ));
                    Key::from(true)
                },
            ),
        ));
        let resume = parent.add_state(State::new("Resume", |_ctx, n: i64| Ok((Key::from(true), n))).ending());
        parent.add_transition(run_child, true, resume);

        let outcome = parent.build().unwrap().run(3, &RunConfig::default()).unwrap();

        assert_eq!(outcome.final_state, "Resume");
        assert_eq!(
            seen.borrow().as_slice(),
            &[(Key::EXHAUSTED, 0, "Done".to_string())]
        );
    }

    #[test]
    fn repeated_child_runs_are_deterministic() {
        let run_once = || {
            let child = child_graph(4).unwrap();
            child.run(4, &RunConfig::default()).unwrap().key
        };

        assert_eq!(run_once(), run_once());
    }

    #[test]
    fn zero_budget_starts_at_the_ending_state() {
        let outcome = child_graph(0).unwrap().run(0, &RunConfig::default()).unwrap();

        assert_eq!(outcome.final_state, "Done");
        assert_eq!(outcome.steps, 1);
    }

    #[test]
    fn child_failure_surfaces_through_the_parent() {
        let mut parent = EngineBuilder::<i64>::new();
        parent.add_state(
            State::new(
                "RunChild",
                nested(
                    |_ctx: &StepContext<'_, ()>, _budget: &i64| {
                        let mut child = EngineBuilder::<i64>::new();
                        child.add_state(State::new("Stuck", |_ctx, n: i64| Ok((Key::from(9), n))));
                        child.build()
                    },
                    |_outcome: &RunOutcome<i64>| Key::from(true),
                ),
            )
            .ending(),
        );

        let error = parent.build().unwrap().run(1, &RunConfig::default()).unwrap_err();

        match error {
            EngineError::Action { state, source } => {
                assert_eq!(state, "RunChild");
                let child = source.downcast_ref::<EngineError>().unwrap();
                assert!(matches!(child, EngineError::UnresolvedTransition { .. }));
            }
            other => panic!("Expected Action error, got {other:?}"),
        }
    }
}
