//! Collaborators driven by the scenarios.
//!
//! An [`Actor`] is the trained policy, an [`Environment`] the controlled
//! process. Both are traits so that real integrations can be plugged in;
//! [`GoalSeeker`] and [`PointMass`] are deterministic stand-ins that let
//! every scenario run without a model or a simulator.

mod goal_seeker;
mod point_mass;

pub use goal_seeker::GoalSeeker;
pub use point_mass::{PointMass, PointMassConfig};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failures raised by an actor or an environment.
///
/// Scenario actions return these unchanged; the engine wraps them in
/// [`EngineError::Action`](crate::core::EngineError::Action).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CollaboratorError {
    #[error("Environment is closed")]
    Closed,

    #[error("Environment must be reset before stepping")]
    NotReset,

    #[error("Observation has {actual} components, expected at least {expected}")]
    ObservationShape { expected: usize, actual: usize },

    #[error("Collaborator failed: {0}")]
    Failed(String),
}

/// State of the controlled process as seen by the actor.
///
/// The first two components are the offset from the current position to
/// the goal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation(Vec<f64>);

impl Observation {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `(x, y)` offset to the goal, if the observation carries one.
    pub fn goal_offset(&self) -> Option<(f64, f64)> {
        match self.0.as_slice() {
            [x, y, ..] => Some((*x, *y)),
            _ => None,
        }
    }

    /// Euclidean distance to the goal.
    pub fn distance_to_goal(&self) -> Option<f64> {
        self.goal_offset().map(|(x, y)| x.hypot(y))
    }
}

impl From<Vec<f64>> for Observation {
    fn from(values: Vec<f64>) -> Self {
        Self::new(values)
    }
}

/// Acceleration requested from the environment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub ax: f64,
    pub ay: f64,
}

impl Command {
    pub fn new(ax: f64, ay: f64) -> Self {
        Self { ax, ay }
    }
}

/// Outcome of one environment step.
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub observation: Observation,
    pub reward: f64,
    /// The episode is over; the environment needs a reset.
    pub done: bool,
}

/// Which policy is in control.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Controller {
    /// The trained actor
    Primary,
    /// Random fault injection
    Fallback,
}

impl Controller {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
        }
    }

    /// The controller that takes over after this one.
    pub fn other(&self) -> Self {
        match self {
            Self::Primary => Self::Fallback,
            Self::Fallback => Self::Primary,
        }
    }
}

impl fmt::Display for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A policy mapping observations to commands.
pub trait Actor {
    fn predict(&mut self, observation: &Observation) -> Result<Command, CollaboratorError>;
}

/// The controlled process.
pub trait Environment {
    /// Start a new episode and return its first observation.
    fn reset(&mut self) -> Result<Observation, CollaboratorError>;

    fn step(&mut self, command: Command) -> Result<Step, CollaboratorError>;

    /// A random command from the environment's action space.
    fn sample_action(&mut self) -> Command;

    /// Release the environment; later steps fail with [`CollaboratorError::Closed`].
    fn close(&mut self);
}
