use super::{CollaboratorError, Command, Environment, Observation, Step};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Tunables of the [`PointMass`] environment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointMassConfig {
    /// Start positions are drawn from `[-arena, arena]` on both axes.
    pub arena: f64,
    /// Reaching within this distance of the goal ends the episode.
    pub goal_radius: f64,
    /// Episode length cap.
    pub max_steps: usize,
    /// Commands are clamped to `[-max_accel, max_accel]` per axis.
    pub max_accel: f64,
    pub dt: f64,
    /// Fraction of velocity lost each step.
    pub drag: f64,
}

impl Default for PointMassConfig {
    fn default() -> Self {
        Self {
            arena: 5.0,
            goal_radius: 0.25,
            max_steps: 400,
            max_accel: 1.0,
            dt: 0.1,
            drag: 0.02,
        }
    }
}

/// A point with velocity on a plane, pushed around by acceleration commands.
///
/// The goal sits at the origin. Observations are `[dx, dy, vx, vy]`, the
/// offset to the goal followed by the velocity. Randomness (start positions
/// and sampled actions) comes from a seeded generator, so two environments
/// built with the same seed behave identically.
///
/// # Example
///
/// ```rust
/// use scenario_harness::sim::{Environment, PointMass};
///
/// let mut env = PointMass::new(7);
/// let first = env.reset().unwrap();
/// let command = env.sample_action();
/// let step = env.step(command).unwrap();
///
/// assert_eq!(first.len(), 4);
/// assert!(!step.done || step.observation.distance_to_goal().is_some());
/// ```
#[derive(Debug)]
pub struct PointMass {
    config: PointMassConfig,
    rng: StdRng,
    position: (f64, f64),
    velocity: (f64, f64),
    steps: usize,
    running: bool,
    closed: bool,
}

impl PointMass {
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, PointMassConfig::default())
    }

    pub fn with_config(seed: u64, config: PointMassConfig) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            position: (0.0, 0.0),
            velocity: (0.0, 0.0),
            steps: 0,
            running: false,
            closed: false,
        }
    }

    pub fn config(&self) -> &PointMassConfig {
        &self.config
    }

    /// Steps taken in the current episode.
    pub fn episode_steps(&self) -> usize {
        self.steps
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn observe(&self) -> Observation {
        let (x, y) = self.position;
        let (vx, vy) = self.velocity;
        Observation::new(vec![-x, -y, vx, vy])
    }
}

impl Environment for PointMass {
    fn reset(&mut self) -> Result<Observation, CollaboratorError> {
        if self.closed {
            return Err(CollaboratorError::Closed);
        }
        let arena = self.config.arena;
        self.position = (
            self.rng.gen_range(-arena..=arena),
            self.rng.gen_range(-arena..=arena),
        );
        self.velocity = (0.0, 0.0);
        self.steps = 0;
        self.running = true;
        Ok(self.observe())
    }

    fn step(&mut self, command: Command) -> Result<Step, CollaboratorError> {
        if self.closed {
            return Err(CollaboratorError::Closed);
        }
        if !self.running {
            return Err(CollaboratorError::NotReset);
        }

        let PointMassConfig {
            goal_radius,
            max_steps,
            max_accel,
            dt,
            drag,
            ..
        } = self.config;
        let ax = command.ax.clamp(-max_accel, max_accel);
        let ay = command.ay.clamp(-max_accel, max_accel);

        self.velocity.0 = (self.velocity.0 + ax * dt) * (1.0 - drag);
        self.velocity.1 = (self.velocity.1 + ay * dt) * (1.0 - drag);
        self.position.0 += self.velocity.0 * dt;
        self.position.1 += self.velocity.1 * dt;
        self.steps += 1;

        let distance = self.position.0.hypot(self.position.1);
        let reached = distance <= goal_radius;
        let done = reached || self.steps >= max_steps;
        if done {
            self.running = false;
        }

        Ok(Step {
            observation: self.observe(),
            reward: if reached { 10.0 } else { -distance },
            done,
        })
    }

    fn sample_action(&mut self) -> Command {
        let max = self.config.max_accel;
        Command::new(self.rng.gen_range(-max..=max), self.rng.gen_range(-max..=max))
    }

    fn close(&mut self) {
        self.closed = true;
        self.running = false;
    }
}
