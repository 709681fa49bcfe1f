//! Append-only telemetry storage.
//!
//! A sink stores measurements per table. Scenarios append to it on every
//! step, the safety monitor reads the latest row back, and the teardown
//! dumps and purges a table when the run stops.
//!
//! # Example
//!
//! ```rust
//! use scenario_harness::telemetry::{MemorySink, TelemetryRecord, TelemetrySink};
//!
//! let sink = MemorySink::new();
//! assert!(sink.read_latest("Drive", 1).unwrap_err().is_empty_table());
//!
//! sink.write(TelemetryRecord::new("Drive").tag("source", "primary").field("x_dist_to_goal", 3.0))
//!     .unwrap();
//!
//! let latest = sink.read_latest("Drive", 1).unwrap();
//! assert_eq!(latest[0].field_value("x_dist_to_goal"), Some(3.0));
//! ```

mod error;
mod jsonl;
mod memory;
mod record;

pub use error::SinkError;
pub use jsonl::JsonLinesSink;
pub use memory::MemorySink;
pub use record::{render_table, TagValue, TelemetryRecord, X_DIST_TO_GOAL, Y_DIST_TO_GOAL};

use std::sync::Arc;

/// Predicate selecting the rows removed by [`TelemetrySink::delete_where`].
pub type RowPredicate<'a> = &'a dyn Fn(&TelemetryRecord) -> bool;

/// Sink shared between states, nested engines and the teardown handler.
pub type SharedSink = Arc<dyn TelemetrySink>;

/// Append-only measurement store.
///
/// Implementations must fail fast rather than block forever when the
/// backend cannot be reached.
pub trait TelemetrySink: Send + Sync {
    /// Append one record to the table named in the record.
    fn write(&self, record: TelemetryRecord) -> Result<(), SinkError>;

    /// Up to `n` most recent rows, newest first.
    ///
    /// Rows with equal timestamps are returned most recently written
    /// first. A table with no rows yields [`SinkError::EmptyTable`].
    fn read_latest(&self, table: &str, n: usize) -> Result<Vec<TelemetryRecord>, SinkError>;

    /// Every row of the table, oldest first. Empty tables give an empty list.
    fn read_all(&self, table: &str) -> Result<Vec<TelemetryRecord>, SinkError>;

    /// Remove the rows matching `predicate`, returning how many went.
    fn delete_where(&self, table: &str, predicate: RowPredicate<'_>) -> Result<usize, SinkError>;
}

/// Reject table names that cannot double as file names.
pub(crate) fn validate_table(table: &str) -> Result<(), SinkError> {
    let valid = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(SinkError::InvalidTable(table.to_string()))
    }
}

/// Check a record before it is stored.
///
/// Non-finite numbers have no JSON form, and a row that cannot be read back
/// would make its whole table unreadable.
pub(crate) fn validate_record(record: &TelemetryRecord) -> Result<(), SinkError> {
    validate_table(&record.table)?;
    let numbers = record
        .fields
        .iter()
        .map(|(name, value)| (name, *value))
        .chain(record.tags.iter().filter_map(|(name, value)| match value {
            TagValue::Number(number) => Some((name, *number)),
            TagValue::Text(_) => None,
        }));
    for (name, value) in numbers {
        if !value.is_finite() {
            return Err(SinkError::NonFinite {
                table: record.table.clone(),
                name: name.clone(),
            });
        }
    }
    Ok(())
}

/// Order rows newest first and keep `n`, assuming `rows` is in write order.
pub(crate) fn newest_first(
    table: &str,
    mut rows: Vec<TelemetryRecord>,
    n: usize,
) -> Result<Vec<TelemetryRecord>, SinkError> {
    if rows.is_empty() {
        return Err(SinkError::EmptyTable {
            table: table.to_string(),
        });
    }
    rows.reverse();
    rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    rows.truncate(n);
    Ok(rows)
}

/// Order rows oldest first, keeping write order among equal timestamps.
pub(crate) fn oldest_first(mut rows: Vec<TelemetryRecord>) -> Vec<TelemetryRecord> {
    rows.sort_by_key(|row| row.timestamp);
    rows
}
