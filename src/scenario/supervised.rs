//! Fault driving under the distance-trend monitor.
//!
//! The fallback controller drives for `intervention` steps, then the
//! safety check compares the distance to goal with the one it logged last
//! time. Drifting away hands a single step to the primary policy.

use super::{limit_reached, Drive, Recorder};
use crate::core::{BuildError, Engine, EngineBuilder, Guard, Key, KeyKind, Matcher, State, StepContext};
use crate::monitor::DistanceTrendMonitor;
use crate::sim::{Actor, Controller, Environment};

/// Build the supervised graph. Every safety check is logged to `recorder`.
///
/// `intervention` must be at least 1: the free-drive table sends budgets
/// below 1 to the safety check. Without an episode limit the run only
/// stops when interrupted.
pub fn build<A, E>(
    recorder: Recorder,
    intervention: i64,
    episode_limit: Option<usize>,
) -> Result<Engine<Drive<A, E>, Recorder>, BuildError>
where
    A: Actor + 'static,
    E: Environment + 'static,
{
    let monitor = DistanceTrendMonitor::new(recorder.table());
    let mut builder = EngineBuilder::new();

    let steer = builder.add_state(State::new(
        "Steer",
        move |_ctx: &StepContext<'_, Recorder>, mut drive: Drive<A, E>| {
            if drive.drive(Controller::Primary)? {
                drive.reset()?;
                if limit_reached(episode_limit, drive.episodes) {
                    return Ok((Key::EXHAUSTED, drive));
                }
            }
            drive.budget = intervention;
            Ok((Key::from(true), drive))
        },
    ));

    let free_drive = builder.add_state(
        State::new(
            "FreeDrive",
            move |_ctx: &StepContext<'_, Recorder>, mut drive: Drive<A, E>| {
                if !drive.drive(Controller::Fallback)? {
                    drive.budget -= 1;
                    return Ok((Key::from(drive.budget), drive));
                }
                drive.reset()?;
                if limit_reached(episode_limit, drive.episodes) {
                    return Ok((Key::EXHAUSTED, drive));
                }
                drive.budget = intervention;
                Ok((Key::from(drive.budget), drive))
            },
        )
        .returns(KeyKind::Numeric),
    );

    let safety_check = builder.add_state(
        State::new(
            "SafetyCheck",
            move |ctx: &StepContext<'_, Recorder>, mut drive: Drive<A, E>| {
                let recorder = ctx.require_param()?;
                let assessment =
                    recorder.hold(|sink| monitor.evaluate(sink, &drive.observation))??;
                if assessment.intervenes() {
                    return Ok((Key::from(false), drive));
                }
                drive.budget = intervention;
                Ok((Key::from(true), drive))
            },
        )
        .bind(recorder)
        .returns(KeyKind::Boolean),
    );

    let finish = builder.add_state(
        State::new("Finish", |_ctx, drive: Drive<A, E>| Ok((Key::EXHAUSTED, drive))).ending(),
    );

    builder
        .add_transition(free_drive, Matcher::guard(Guard::greater_than(0)), free_drive)
        .add_transition(free_drive, Key::EXHAUSTED, finish)
        .add_transition(free_drive, Matcher::guard(Guard::less_than(1)), safety_check)
        .add_transition(safety_check, true, free_drive)
        .add_transition(safety_check, false, steer)
        .add_transition(steer, true, free_drive)
        .add_transition(steer, Key::EXHAUSTED, finish)
        .set_initial(safety_check);

    builder.build()
}
