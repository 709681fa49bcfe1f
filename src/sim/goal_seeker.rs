use super::{Actor, CollaboratorError, Command, Observation};

/// Proportional-derivative controller steering toward the goal.
///
/// Expects observations laid out as `[dx, dy, vx, vy]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GoalSeeker {
    pub kp: f64,
    pub kd: f64,
}

impl GoalSeeker {
    pub fn new(kp: f64, kd: f64) -> Self {
        Self { kp, kd }
    }
}

impl Default for GoalSeeker {
    fn default() -> Self {
        Self::new(1.0, 1.6)
    }
}

impl Actor for GoalSeeker {
    fn predict(&mut self, observation: &Observation) -> Result<Command, CollaboratorError> {
        match observation.as_slice() {
            [dx, dy, vx, vy, ..] => Ok(Command::new(
                self.kp * dx - self.kd * vx,
                self.kp * dy - self.kd * vy,
            )),
            other => Err(CollaboratorError::ObservationShape {
                expected: 4,
                actual: other.len(),
            }),
        }
    }
}
