//! Distance-trend safety monitor.
//!
//! The monitor compares how far the process is from its goal now with the
//! distance recorded at the previous check. Moving away from the goal while
//! the fallback controller drives hands control to the primary policy.
//! Every decision is logged to the telemetry table, and that log is also
//! the baseline for the next check.

use crate::sim::{Controller, Observation};
use crate::telemetry::{SinkError, TelemetryRecord, TelemetrySink};
use thiserror::Error;

/// Tag naming the controller the monitor switched to.
pub const SWITCHING_TO_TAG: &str = "switching_to";

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Monitor could not use the telemetry sink: {0}")]
    Sink(#[from] SinkError),

    #[error("Previous record in '{table}' lacks the goal offset fields")]
    MissingField { table: String },

    #[error("Observation has {actual} components, the monitor needs 2")]
    ShortObservation { actual: usize },
}

/// Decision taken by one check.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Assessment {
    /// Controller that drives next
    pub controller: Controller,
    /// Distance to the goal now
    pub distance: f64,
    /// Distance logged by the previous check, if there was one
    pub previous: Option<f64>,
}

impl Assessment {
    pub fn intervenes(&self) -> bool {
        self.controller == Controller::Primary
    }
}

/// Compares the current distance to goal against the last logged one.
///
/// # Example
///
/// ```rust
/// use scenario_harness::monitor::DistanceTrendMonitor;
/// use scenario_harness::sim::{Controller, Observation};
/// use scenario_harness::telemetry::MemorySink;
///
/// let sink = MemorySink::new();
/// let monitor = DistanceTrendMonitor::new("Supervised");
///
/// let first = monitor.evaluate(&sink, &Observation::new(vec![3.0, 4.0])).unwrap();
/// assert_eq!(first.controller, Controller::Fallback);
///
/// let drifted = monitor.evaluate(&sink, &Observation::new(vec![6.0, 8.0])).unwrap();
/// assert_eq!(drifted.controller, Controller::Primary);
/// assert_eq!(drifted.previous, Some(5.0));
/// ```
#[derive(Clone, Debug)]
pub struct DistanceTrendMonitor {
    table: String,
}

impl DistanceTrendMonitor {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Check the trend and log the decision.
    ///
    /// Only the most recent record is consulted. An empty table means no
    /// baseline, and the fallback controller keeps driving.
    pub fn evaluate(
        &self,
        sink: &dyn TelemetrySink,
        observation: &Observation,
    ) -> Result<Assessment, MonitorError> {
        let (x, y) = observation
            .goal_offset()
            .ok_or(MonitorError::ShortObservation {
                actual: observation.len(),
            })?;
        let distance = x.hypot(y);

        let previous = match sink.read_latest(&self.table, 1) {
            Ok(rows) => {
                let (old_x, old_y) = rows
                    .first()
                    .and_then(TelemetryRecord::goal_offset_value)
                    .ok_or_else(|| MonitorError::MissingField {
                        table: self.table.clone(),
                    })?;
                Some(old_x.hypot(old_y))
            }
            Err(error) if error.is_empty_table() => {
                tracing::debug!(table = %self.table, "No baseline yet");
                None
            }
            Err(error) => return Err(error.into()),
        };

        let controller = match previous {
            Some(old) if distance > old => Controller::Primary,
            _ => Controller::Fallback,
        };

        sink.write(
            TelemetryRecord::new(self.table.as_str())
                .tag(SWITCHING_TO_TAG, controller.as_str())
                .goal_offset(x, y),
        )?;

        if controller == Controller::Primary {
            tracing::info!(distance, previous = ?previous, "Moving away from goal, switching to primary");
        } else {
            tracing::debug!(distance, previous = ?previous, "Staying on fallback");
        }

        Ok(Assessment {
            controller,
            distance,
            previous,
        })
    }
}
