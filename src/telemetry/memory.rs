//! In-process telemetry sink.

use super::{
    newest_first, oldest_first, validate_record, RowPredicate, SinkError, TelemetryRecord,
    TelemetrySink,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(250);

/// Tables kept in memory behind a reader-writer lock.
///
/// Every operation waits at most `lock_timeout` for the lock and reports
/// [`SinkError::Unavailable`] instead of hanging.
#[derive(Debug)]
pub struct MemorySink {
    tables: RwLock<HashMap<String, Vec<TelemetryRecord>>>,
    lock_timeout: Duration,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            lock_timeout,
        }
    }

    /// Number of rows currently held for `table`.
    pub fn len(&self, table: &str) -> Result<usize, SinkError> {
        Ok(self.read_all(table)?.len())
    }

    fn unavailable(&self) -> SinkError {
        SinkError::Unavailable {
            reason: format!("table lock not acquired within {:?}", self.lock_timeout),
        }
    }

    fn snapshot(&self, table: &str) -> Result<Vec<TelemetryRecord>, SinkError> {
        let tables = self
            .tables
            .try_read_for(self.lock_timeout)
            .ok_or_else(|| self.unavailable())?;
        Ok(tables.get(table).cloned().unwrap_or_default())
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetrySink for MemorySink {
    fn write(&self, record: TelemetryRecord) -> Result<(), SinkError> {
        validate_record(&record)?;
        let mut tables = self
            .tables
            .try_write_for(self.lock_timeout)
            .ok_or_else(|| self.unavailable())?;
        tables.entry(record.table.clone()).or_default().push(record);
        Ok(())
    }

    fn read_latest(&self, table: &str, n: usize) -> Result<Vec<TelemetryRecord>, SinkError> {
        newest_first(table, self.snapshot(table)?, n)
    }

    fn read_all(&self, table: &str) -> Result<Vec<TelemetryRecord>, SinkError> {
        Ok(oldest_first(self.snapshot(table)?))
    }

    fn delete_where(&self, table: &str, predicate: RowPredicate<'_>) -> Result<usize, SinkError> {
        let mut tables = self
            .tables
            .try_write_for(self.lock_timeout)
            .ok_or_else(|| self.unavailable())?;
        let Some(rows) = tables.get_mut(table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|row| !predicate(row));
        let removed = before - rows.len();
        if rows.is_empty() {
            tables.remove(table);
        }
        Ok(removed)
    }
}
