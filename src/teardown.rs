//! Dump-and-purge teardown for long-running logged scenarios.
//!
//! When a run is interrupted (or completes), the controlled process is
//! halted, the scenario's telemetry table is dumped and then purged. The
//! sequence runs at most once no matter how many times, or from how many
//! threads, it is triggered.

use crate::telemetry::{render_table, SharedSink, SinkError, TelemetryRecord};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

type HaltHook = Box<dyn FnOnce() + Send>;

/// Why the process is exiting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitReason {
    Completed,
    Interrupted,
    /// The run stopped on an error or a panic
    Failed,
}

impl ExitReason {
    /// Process exit status: 0, 128 + SIGINT, or 1.
    pub fn code(&self) -> i32 {
        match self {
            Self::Completed => 0,
            Self::Interrupted => 130,
            Self::Failed => 1,
        }
    }
}

/// Result of the one teardown that actually ran.
#[derive(Debug)]
pub struct TeardownReport {
    pub table: String,
    /// Rows dumped before the purge
    pub records: Vec<TelemetryRecord>,
    /// Rows removed by the purge
    pub purged: usize,
    /// Sink failures hit along the way; none of them stopped the teardown
    pub failures: Vec<String>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// The dumped rows as a text table, followed by any failures.
    pub fn render(&self) -> String {
        let mut out = render_table(&self.table, &self.records);
        for failure in &self.failures {
            out.push_str("teardown failure: ");
            out.push_str(failure);
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for TeardownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Idempotent halt, dump and purge of one telemetry table.
///
/// # Example
///
/// ```rust
/// use scenario_harness::teardown::InterruptTeardown;
/// use scenario_harness::telemetry::{MemorySink, SharedSink, TelemetryRecord, TelemetrySink};
/// use std::sync::Arc;
///
/// let sink: SharedSink = Arc::new(MemorySink::new());
/// sink.write(TelemetryRecord::new("Drive").field("x_dist_to_goal", 1.0)).unwrap();
///
/// let teardown = InterruptTeardown::new(Arc::clone(&sink), "Drive");
/// let report = teardown.teardown().unwrap();
/// assert_eq!(report.records.len(), 1);
/// assert_eq!(report.purged, 1);
///
/// assert!(teardown.teardown().is_none());
/// ```
pub struct InterruptTeardown {
    sink: SharedSink,
    table: String,
    fired: AtomicBool,
    on_halt: Mutex<Option<HaltHook>>,
}

impl InterruptTeardown {
    pub fn new(sink: SharedSink, table: impl Into<String>) -> Self {
        Self {
            sink,
            table: table.into(),
            fired: AtomicBool::new(false),
            on_halt: Mutex::new(None),
        }
    }

    /// Install the hook that stops the controlled process.
    pub fn on_halt(self, hook: impl FnOnce() + Send + 'static) -> Self {
        *self.on_halt.lock() = Some(Box::new(hook));
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Halt, dump and purge. Returns `None` if a teardown already ran.
    pub fn teardown(&self) -> Option<TeardownReport> {
        if self.fired.swap(true, Ordering::SeqCst) {
            tracing::debug!(table = %self.table, "Teardown already ran");
            return None;
        }
        tracing::info!(table = %self.table, "Tearing down");

        if let Some(hook) = self.on_halt.lock().take() {
            hook();
        }

        let mut failures = Vec::new();
        let records = self
            .sink
            .read_all(&self.table)
            .unwrap_or_else(|error| {
                note_failure(&mut failures, "dump", &error);
                Vec::new()
            });
        let purged = self
            .sink
            .delete_where(&self.table, &|_| true)
            .unwrap_or_else(|error| {
                note_failure(&mut failures, "purge", &error);
                0
            });

        tracing::info!(
            table = %self.table,
            dumped = records.len(),
            purged,
            failures = failures.len(),
            "Teardown finished"
        );

        Some(TeardownReport {
            table: self.table.clone(),
            records,
            purged,
            failures,
        })
    }
}

fn note_failure(failures: &mut Vec<String>, stage: &str, error: &SinkError) {
    tracing::error!(stage, %error, "Telemetry sink failed during teardown");
    failures.push(format!("{stage}: {error}"));
}

impl fmt::Debug for InterruptTeardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptTeardown")
            .field("table", &self.table)
            .field("fired", &self.has_fired())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{MemorySink, RowPredicate, TelemetrySink};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;

    /// Counts calls and fails every read and delete.
    #[derive(Default)]
    struct BrokenSink {
        deletes: AtomicUsize,
    }

    impl TelemetrySink for BrokenSink {
        fn write(&self, _record: TelemetryRecord) -> Result<(), SinkError> {
            Ok(())
        }

        fn read_latest(&self, _table: &str, _n: usize) -> Result<Vec<TelemetryRecord>, SinkError> {
            Err(SinkError::Unavailable {
                reason: "offline".to_string(),
            })
        }

        fn read_all(&self, _table: &str) -> Result<Vec<TelemetryRecord>, SinkError> {
            Err(SinkError::Unavailable {
                reason: "offline".to_string(),
            })
        }

        fn delete_where(&self, _table: &str, _predicate: RowPredicate<'_>) -> Result<usize, SinkError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Err(SinkError::Unavailable {
                reason: "offline".to_string(),
            })
        }
    }

    fn filled_sink(rows: usize) -> Arc<MemorySink> {
        let sink = Arc::new(MemorySink::new());
        for n in 0..rows {
            sink.write(TelemetryRecord::new("T").field("n", n as f64))
                .unwrap();
        }
        sink
    }

    #[test]
    fn dumps_then_purges() {
        let sink = filled_sink(3);
        let teardown = InterruptTeardown::new(sink.clone(), "T");

        let report = teardown.teardown().unwrap();

        assert_eq!(report.records.len(), 3);
        assert_eq!(report.purged, 3);
        assert!(report.is_clean());
        assert!(sink.read_all("T").unwrap().is_empty());
    }

    #[test]
    fn second_call_does_nothing() {
        let sink = filled_sink(2);
        let halts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&halts);
        let teardown = InterruptTeardown::new(sink.clone(), "T").on_halt(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(teardown.teardown().is_some());
        sink.write(TelemetryRecord::new("T").field("n", 9.0)).unwrap();
        assert!(teardown.teardown().is_none());

        assert_eq!(halts.load(Ordering::SeqCst), 1);
        assert_eq!(sink.len("T").unwrap(), 1);
        assert!(teardown.has_fired());
    }

    #[test]
    fn concurrent_triggers_run_once() {
        let teardown = Arc::new(InterruptTeardown::new(filled_sink(5), "T"));

        let reports: Vec<Option<TeardownReport>> = (0..8)
            .map(|_| {
                let teardown = Arc::clone(&teardown);
                thread::spawn(move || teardown.teardown())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();

        assert_eq!(reports.iter().filter(|r| r.is_some()).count(), 1);
    }

    #[test]
    fn sink_failures_are_reported_not_fatal() {
        let sink = Arc::new(BrokenSink::default());
        let teardown = InterruptTeardown::new(sink.clone(), "T");

        let report = teardown.teardown().unwrap();

        assert_eq!(report.failures.len(), 2);
        assert!(report.records.is_empty());
        assert_eq!(sink.deletes.load(Ordering::SeqCst), 1);
        assert!(report.render().contains("teardown failure: purge"));
    }

    #[test]
    fn exit_codes() {
        assert_eq!(ExitReason::Completed.code(), 0);
        assert_eq!(ExitReason::Interrupted.code(), 130);
        assert_eq!(ExitReason::Failed.code(), 1);
    }
}
