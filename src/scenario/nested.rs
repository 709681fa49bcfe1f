//! A primary episode, a nested run of fault episodes, then primary again.
//!
//! The child engine spends the fault-episode budget carried in the payload:
//!
//! ```text
//! Fault --(> 0)--> Fault
//! Fault --(0)----> Fault
//! Fault --(-1)---> FaultLast (ending)
//! ```
//!
//! A payload that arrives with no budget starts the child at `FaultLast`,
//! which returns straight away.

use super::{with_recorder, Drive, Recorder};
use crate::core::{
    nested, ActionResult, BuildError, Engine, EngineBuilder, Guard, Key, KeyKind, Matcher,
    RunOutcome, State, StepContext,
};
use crate::sim::{Actor, Controller, Environment};

const PRIMARY_SOURCE: &str = "primary_main";
const FAULT_SOURCE: &str = "fallback_sub";

/// Drive the primary controller; on episode end reset and return `true`.
fn primary_step<A, E>() -> impl FnMut(&StepContext<'_, Recorder>, Drive<A, E>) -> ActionResult<Drive<A, E>>
where
    A: Actor + 'static,
    E: Environment + 'static,
{
    |ctx: &StepContext<'_, Recorder>, mut drive: Drive<A, E>| {
        let done = drive.drive(Controller::Primary)?;
        if let Some(recorder) = ctx.param() {
            recorder.log_step(&drive.observation, PRIMARY_SOURCE, None)?;
        }
        if done {
            drive.reset()?;
        }
        Ok((Key::from(done), drive))
    }
}

/// Drive randomly while budget remains.
///
/// Mid-episode the key is the remaining budget. When an episode ends the
/// budget drops by one and becomes the key. With nothing left the key is
/// the exhausted sentinel and the environment is not touched.
fn fault_step<A, E>() -> impl FnMut(&StepContext<'_, Recorder>, Drive<A, E>) -> ActionResult<Drive<A, E>>
where
    A: Actor + 'static,
    E: Environment + 'static,
{
    |ctx: &StepContext<'_, Recorder>, mut drive: Drive<A, E>| {
        if drive.budget <= 0 {
            return Ok((Key::EXHAUSTED, drive));
        }
        let done = drive.drive(Controller::Fallback)?;
        if let Some(recorder) = ctx.param() {
            recorder.log_step(&drive.observation, FAULT_SOURCE, Some(drive.budget))?;
        }
        if done {
            drive.reset()?;
            drive.budget -= 1;
            tracing::info!(remaining = drive.budget, "Fault episode finished");
        }
        Ok((Key::from(drive.budget), drive))
    }
}

/// The child graph run by the `FaultEpisodes` state.
pub fn fault_episodes<A, E>(
    recorder: Option<&Recorder>,
    budget: i64,
) -> Result<Engine<Drive<A, E>, Recorder>, BuildError>
where
    A: Actor + 'static,
    E: Environment + 'static,
{
    let mut child = EngineBuilder::new();
    let fault = child.add_state(with_recorder(
        State::new("Fault", fault_step()).returns(KeyKind::Numeric),
        recorder,
    ));
    let last = child.add_state(with_recorder(
        State::new("FaultLast", fault_step()).ending(),
        recorder,
    ));

    child
        .add_transition(fault, Matcher::guard(Guard::greater_than(0)), fault)
        .add_transition(fault, 0, fault)
        .add_transition(fault, Key::EXHAUSTED, last);
    if budget <= 0 {
        child.set_initial(last);
    }
    child.build()
}

/// Build the nested graph, logging every step when `recorder` is set.
pub fn build<A, E>(recorder: Option<Recorder>) -> Result<Engine<Drive<A, E>, Recorder>, BuildError>
where
    A: Actor + 'static,
    E: Environment + 'static,
{
    let recorder = recorder.as_ref();
    let mut builder = EngineBuilder::new();

    let lead = builder.add_state(with_recorder(
        State::new("PrimaryLead", primary_step()).returns(KeyKind::Boolean),
        recorder,
    ));
    let child = builder.add_state(with_recorder(
        State::new(
            "FaultEpisodes",
            nested(
                |ctx: &StepContext<'_, Recorder>, drive: &Drive<A, E>| {
                    fault_episodes(ctx.param(), drive.budget)
                },
                |outcome: &RunOutcome<Drive<A, E>>| Key::from(outcome.key.is_exhausted()),
            ),
        ),
        recorder,
    ));
    let follow = builder.add_state(with_recorder(
        State::new("PrimaryFollow", primary_step()).returns(KeyKind::Boolean),
        recorder,
    ));
    let last = builder.add_state(with_recorder(
        State::new("PrimaryFinal", primary_step()).ending(),
        recorder,
    ));

    builder
        .add_transition(lead, false, lead)
        .add_transition(lead, true, child)
        .add_transition(child, true, follow)
        .add_transition(follow, false, follow)
        .add_transition(follow, true, last)
        .set_initial(lead);

    builder.build()
}
