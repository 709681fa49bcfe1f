//! Telemetry sink errors.

use thiserror::Error;

/// Errors reported by a [`TelemetrySink`](super::TelemetrySink).
///
/// `EmptyTable` is a condition rather than a fault: it tells the caller
/// there is no previous row to compare against.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Table '{table}' has no rows")]
    EmptyTable { table: String },

    #[error("Telemetry backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Invalid table name '{0}': use letters, digits, '_' or '-'")]
    InvalidTable(String),

    #[error("Table '{table}': '{name}' is not a finite number")]
    NonFinite { table: String, name: String },

    #[error("Telemetry I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Telemetry record encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl SinkError {
    /// True for the "no prior baseline" condition.
    pub fn is_empty_table(&self) -> bool {
        matches!(self, Self::EmptyTable { .. })
    }
}
