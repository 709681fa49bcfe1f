//! Primary and fault driving take turns, one episode each.

use super::{limit_reached, with_recorder, Drive, Recorder};
use crate::core::{
    ActionResult, BuildError, Engine, EngineBuilder, Key, KeyKind, State, StepContext,
};
use crate::sim::{Actor, Controller, Environment};

/// Drive one step under `controller`; `true` once the episode is over.
fn episode_step<A, E>(
    controller: Controller,
) -> impl FnMut(&StepContext<'_, Recorder>, Drive<A, E>) -> ActionResult<Drive<A, E>>
where
    A: Actor + 'static,
    E: Environment + 'static,
{
    move |ctx: &StepContext<'_, Recorder>, mut drive: Drive<A, E>| {
        let done = drive.drive(controller)?;
        if let Some(recorder) = ctx.param() {
            recorder.log_step(&drive.observation, controller.as_str(), None)?;
        }
        Ok((Key::from(done), drive))
    }
}

/// Reset the environment and hand over to the other controller.
///
/// Returns `true` after a primary episode (fault driving next), `false`
/// after a fault episode, and the exhausted sentinel once `episode_limit`
/// episodes are done.
fn switcher<A, E>(
    episode_limit: Option<usize>,
) -> impl FnMut(&StepContext<'_, Recorder>, Drive<A, E>) -> ActionResult<Drive<A, E>>
where
    A: Actor + 'static,
    E: Environment + 'static,
{
    move |_ctx: &StepContext<'_, Recorder>, mut drive: Drive<A, E>| {
        if limit_reached(episode_limit, drive.episodes) {
            return Ok((Key::EXHAUSTED, drive));
        }
        drive.reset()?;
        let next = drive.origin.other();
        tracing::info!(episodes = drive.episodes, %next, "Switching controller");
        Ok((Key::from(drive.origin == Controller::Primary), drive))
    }
}

/// Build the alternating graph, logging every step when `recorder` is set.
///
/// Without an episode limit the run only stops when interrupted.
pub fn build<A, E>(
    recorder: Option<Recorder>,
    episode_limit: Option<usize>,
) -> Result<Engine<Drive<A, E>, Recorder>, BuildError>
where
    A: Actor + 'static,
    E: Environment + 'static,
{
    let recorder = recorder.as_ref();
    let mut builder = EngineBuilder::new();

    let primary = builder.add_state(with_recorder(
        State::new("Primary", episode_step(Controller::Primary)).returns(KeyKind::Boolean),
        recorder,
    ));
    let fault = builder.add_state(with_recorder(
        State::new("Fault", episode_step(Controller::Fallback)).returns(KeyKind::Boolean),
        recorder,
    ));
    let switch = builder.add_state(State::new("Switch", switcher(episode_limit)));
    let finish = builder.add_state(
        State::new("Finish", |_ctx, drive: Drive<A, E>| Ok((Key::EXHAUSTED, drive))).ending(),
    );

    builder
        .add_transition(primary, true, switch)
        .add_transition(primary, false, primary)
        .add_transition(fault, true, switch)
        .add_transition(fault, false, fault)
        .add_transition(switch, Key::EXHAUSTED, finish)
        .add_transition(switch, true, fault)
        .add_transition(switch, false, primary)
        .set_initial(primary);

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RunConfig;
    use crate::scenario::{HaltSwitch, SOURCE_TAG};
    use crate::sim::{GoalSeeker, PointMass, PointMassConfig};
    use crate::telemetry::{MemorySink, TagValue, TelemetrySink};
    use std::sync::Arc;

    fn short_drive() -> Drive<GoalSeeker, PointMass> {
        let env = PointMass::with_config(
            4,
            PointMassConfig {
                max_steps: 5,
                ..PointMassConfig::default()
            },
        );
        Drive::start(GoalSeeker::default(), env, 0, HaltSwitch::new()).unwrap()
    }

    #[test]
    fn alternates_until_the_episode_limit() {
        let engine = build(None, Some(4)).unwrap();

        let outcome = engine.run(short_drive(), &RunConfig::default()).unwrap();

        assert_eq!(outcome.final_state, "Finish");
        assert_eq!(outcome.key, Key::EXHAUSTED);
        assert_eq!(outcome.payload.episodes, 4);
        let path = outcome.history.get_path();
        assert_eq!(path[0], "Primary");
        let first_switch = path.iter().position(|s| *s == "Switch").unwrap();
        assert_eq!(path[first_switch + 1], "Fault");
    }

    #[test]
    fn logged_variant_writes_every_step() {
        let sink = Arc::new(MemorySink::new());
        let engine = build(Some(Recorder::new(sink.clone(), "AlternatingTest")), Some(2)).unwrap();

        let outcome = engine.run(short_drive(), &RunConfig::default()).unwrap();

        let rows = sink.read_all("AlternatingTest").unwrap();
        assert_eq!(rows.len(), outcome.payload.env_steps);
        assert_eq!(rows[0].tag_value(SOURCE_TAG), Some(&TagValue::from("primary")));
        assert!(rows
            .iter()
            .any(|row| row.tag_value(SOURCE_TAG) == Some(&TagValue::from("fallback"))));
    }

    #[test]
    fn unlimited_run_needs_the_step_cap() {
        let engine = build(None, None).unwrap();

        let error = engine
            .run(short_drive(), &RunConfig::default().with_max_steps(40))
            .unwrap_err();

        assert!(matches!(
            error,
            crate::core::EngineError::StepLimitExceeded { limit: 40, .. }
        ));
    }
}
