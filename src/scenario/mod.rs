//! Scripted test scenarios.
//!
//! Every scenario is an engine graph over the same payload, a [`Drive`]
//! holding the actor, the environment and the latest observation. States
//! that log telemetry have a [`Recorder`] bound to them; the unlogged
//! variants build the same graph without one.
//!
//! ```text
//! alternating:  Primary <-> Switch <-> Fault, Switch -> Finish
//! nested:       PrimaryLead -> FaultEpisodes{Fault <-> FaultLast} -> PrimaryFollow -> PrimaryFinal
//! supervised:   SafetyCheck -> FreeDrive | Steer, FreeDrive -> SafetyCheck
//! ```

pub mod alternating;
pub mod nested;
pub mod supervised;

use crate::config::{ConfigError, ScenarioConfig, ScenarioKind};
use crate::core::{ActionError, BuildError, Engine, EngineError, Key, State, StateHistory};
use crate::sim::{Actor, CollaboratorError, Controller, Environment, Observation};
use crate::telemetry::{SharedSink, SinkError, TelemetryRecord, TelemetrySink};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Tag naming who produced a logged step.
pub const SOURCE_TAG: &str = "source";
/// Tag carrying the remaining fault-episode budget.
pub const LOOP_TAG: &str = "loop";

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("Invalid scenario configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Scenario graph is invalid: {0}")]
    Build(#[from] BuildError),

    #[error("Scenario run failed: {0}")]
    Engine(#[from] EngineError),

    #[error("Collaborator failed: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("Telemetry write failed: {0}")]
    Telemetry(#[from] SinkError),

    #[error("Run halted: no further environment steps or telemetry writes")]
    Halted,
}

impl ScenarioError {
    /// True when the run stopped because the halt switch was tripped.
    pub fn is_halted(&self) -> bool {
        match self {
            Self::Halted => true,
            Self::Engine(error) => halted_in(error),
            _ => false,
        }
    }
}

/// Look through action failures, nested runs included, for a halt.
fn halted_in(error: &EngineError) -> bool {
    let EngineError::Action { source, .. } = error else {
        return false;
    };
    if let Some(scenario) = source.downcast_ref::<ScenarioError>() {
        return scenario.is_halted();
    }
    source.downcast_ref::<EngineError>().is_some_and(halted_in)
}

/// How long [`HaltSwitch::trip`] waits for a step already under way.
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct HaltState {
    tripped: AtomicBool,
    in_flight: RwLock<()>,
}

/// Shared switch that stops scenarios from stepping the environment or
/// writing telemetry.
///
/// Environment steps and telemetry writes run under [`hold`](Self::hold).
/// Once [`trip`](Self::trip) returns, none of them is running and none will
/// start, so the table can be purged safely.
#[derive(Clone, Debug, Default)]
pub struct HaltSwitch(Arc<HaltState>);

impl HaltSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the switch and wait up to [`SETTLE_TIMEOUT`] for work in flight.
    pub fn trip(&self) {
        self.trip_within(SETTLE_TIMEOUT);
    }

    /// Trip the switch and wait up to `timeout` for work in flight.
    ///
    /// Returns `false` if a step was still running when the wait ran out.
    pub fn trip_within(&self, timeout: Duration) -> bool {
        self.0.tripped.store(true, Ordering::SeqCst);
        let settled = self.0.in_flight.try_write_for(timeout).is_some();
        if !settled {
            tracing::warn!(?timeout, "Step still running after the halt");
        }
        settled
    }

    pub fn is_tripped(&self) -> bool {
        self.0.tripped.load(Ordering::SeqCst)
    }

    /// Run `work` unless the switch is tripped; a trip waits for it to finish.
    pub fn hold<T>(&self, work: impl FnOnce() -> T) -> Option<T> {
        let _in_flight = self.0.in_flight.read();
        if self.is_tripped() {
            return None;
        }
        Some(work())
    }
}

/// Payload threaded through every scenario state.
pub struct Drive<A, E> {
    pub actor: A,
    pub env: E,
    /// Latest observation of the environment
    pub observation: Observation,
    /// Remaining fault episodes (nested) or steps until the next check (supervised)
    pub budget: i64,
    /// Controller that finished the last episode
    pub origin: Controller,
    /// Completed episodes
    pub episodes: usize,
    /// Environment steps taken
    pub env_steps: usize,
    halt: HaltSwitch,
}

impl<A: Actor, E: Environment> Drive<A, E> {
    /// Reset the environment and start driving from its first observation.
    pub fn start(actor: A, mut env: E, budget: i64, halt: HaltSwitch) -> Result<Self, CollaboratorError> {
        let observation = env.reset()?;
        Ok(Self {
            actor,
            env,
            observation,
            budget,
            origin: Controller::Primary,
            episodes: 0,
            env_steps: 0,
            halt,
        })
    }

    /// Take one environment step under `controller`; returns whether the episode ended.
    ///
    /// The primary controller asks the actor, the fallback samples a random
    /// action. Collaborator failures are passed through unchanged.
    pub fn drive(&mut self, controller: Controller) -> Result<bool, ActionError> {
        let halt = self.halt.clone();
        halt.hold(|| self.step(controller))
            .unwrap_or_else(|| Err(ScenarioError::Halted.into()))
    }

    fn step(&mut self, controller: Controller) -> Result<bool, ActionError> {
        let command = match controller {
            Controller::Primary => self.actor.predict(&self.observation)?,
            Controller::Fallback => self.env.sample_action(),
        };
        let step = self.env.step(command)?;
        self.observation = step.observation;
        self.env_steps += 1;
        if step.done {
            self.episodes += 1;
            self.origin = controller;
            tracing::debug!(%controller, episodes = self.episodes, "Episode finished");
        }
        Ok(step.done)
    }

    /// Start a new episode. Refused once the run is halted.
    pub fn reset(&mut self) -> Result<(), ActionError> {
        let halt = self.halt.clone();
        let observation = halt.hold(|| self.env.reset()).ok_or(ScenarioError::Halted)??;
        self.observation = observation;
        Ok(())
    }

    pub fn close(&mut self) {
        self.env.close();
    }
}

impl<A, E> fmt::Debug for Drive<A, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Drive")
            .field("observation", &self.observation)
            .field("budget", &self.budget)
            .field("origin", &self.origin)
            .field("episodes", &self.episodes)
            .field("env_steps", &self.env_steps)
            .finish()
    }
}

/// Telemetry sink handle bound to the states of a logged scenario.
///
/// Writes go through the recorder's [`HaltSwitch`] and are refused once it
/// has been tripped.
#[derive(Clone)]
pub struct Recorder {
    sink: SharedSink,
    table: String,
    halt: HaltSwitch,
}

impl Recorder {
    pub fn new(sink: SharedSink, table: impl Into<String>) -> Self {
        Self {
            sink,
            table: table.into(),
            halt: HaltSwitch::new(),
        }
    }

    /// Share `halt` with the drive so a trip seals the table too.
    pub fn with_halt(mut self, halt: HaltSwitch) -> Self {
        self.halt = halt;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Use the sink unless the run has been halted.
    pub fn hold<T>(&self, work: impl FnOnce(&dyn TelemetrySink) -> T) -> Result<T, ScenarioError> {
        self.halt
            .hold(|| work(self.sink.as_ref()))
            .ok_or(ScenarioError::Halted)
    }

    /// Log the goal offset of `observation`, tagged with its source.
    pub fn log_step(
        &self,
        observation: &Observation,
        source: &str,
        remaining: Option<i64>,
    ) -> Result<(), ScenarioError> {
        let mut record = TelemetryRecord::new(self.table.as_str()).tag(SOURCE_TAG, source);
        if let Some(remaining) = remaining {
            record = record.tag(LOOP_TAG, remaining);
        }
        if let Some((x, y)) = observation.goal_offset() {
            record = record.goal_offset(x, y);
        }
        self.hold(|sink| sink.write(record))??;
        Ok(())
    }
}

impl fmt::Debug for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder").field("table", &self.table).finish()
    }
}

/// Bind `recorder` to `state` when the scenario logs.
pub(crate) fn with_recorder<P>(
    state: State<P, Recorder>,
    recorder: Option<&Recorder>,
) -> State<P, Recorder> {
    match recorder {
        Some(recorder) => state.bind(recorder.clone()),
        None => state,
    }
}

pub(crate) fn limit_reached(limit: Option<usize>, episodes: usize) -> bool {
    matches!(limit, Some(limit) if episodes >= limit)
}

/// Summary of a finished scenario.
#[derive(Debug)]
pub struct ScenarioOutcome {
    pub kind: ScenarioKind,
    pub final_state: String,
    pub key: Key,
    /// Engine steps of the top-level run
    pub steps: usize,
    pub env_steps: usize,
    pub episodes: usize,
    /// Budget left in the final payload
    pub budget: i64,
    pub history: StateHistory,
}

/// Build the configured scenario, run it to completion and close the environment.
pub fn run<A, E>(
    config: &ScenarioConfig,
    actor: A,
    env: E,
    sink: SharedSink,
    halt: HaltSwitch,
) -> Result<ScenarioOutcome, ScenarioError>
where
    A: Actor + 'static,
    E: Environment + 'static,
{
    config.validate()?;
    let recorder = Recorder::new(sink, config.table()).with_halt(halt.clone());
    let budget = match config.scenario {
        ScenarioKind::Supervised => config.intervention,
        _ => config.fault_episodes,
    };

    let engine: Engine<Drive<A, E>, Recorder> = match config.scenario {
        ScenarioKind::Alternating => alternating::build(None, config.episodes)?,
        ScenarioKind::LoggedAlternating => alternating::build(Some(recorder), config.episodes)?,
        ScenarioKind::Nested => nested::build(None)?,
        ScenarioKind::NestedLogged => nested::build(Some(recorder))?,
        ScenarioKind::Supervised => {
            supervised::build(recorder, config.intervention, config.episodes)?
        }
    };

    tracing::info!(
        scenario = %config.scenario,
        table = config.table(),
        budget,
        episodes = ?config.episodes,
        "Starting scenario"
    );

    let drive = Drive::start(actor, env, budget, halt)?;
    let outcome = engine.run(drive, &config.run_config())?;
    let mut drive = outcome.payload;
    drive.close();

    tracing::info!(
        scenario = %config.scenario,
        final_state = %outcome.final_state,
        steps = outcome.steps,
        env_steps = drive.env_steps,
        episodes = drive.episodes,
        "Scenario finished"
    );

    Ok(ScenarioOutcome {
        kind: config.scenario,
        final_state: outcome.final_state,
        key: outcome.key,
        steps: outcome.steps,
        env_steps: drive.env_steps,
        episodes: drive.episodes,
        budget: drive.budget,
        history: outcome.history,
    })
}
