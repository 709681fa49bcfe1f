//! File-backed telemetry sink: one JSON-lines file per table.

use super::{
    newest_first, oldest_first, validate_record, validate_table, RowPredicate, SinkError,
    TelemetryRecord, TelemetrySink,
};
use parking_lot::Mutex;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(500);

/// Stores each table as `<dir>/<table>.jsonl`.
///
/// Writes append a single line. Deletes rewrite the surviving rows to a
/// temporary file and rename it over the table, so a crash mid-delete
/// leaves either the old or the new contents.
#[derive(Debug)]
pub struct JsonLinesSink {
    dir: PathBuf,
    io: Mutex<()>,
    lock_timeout: Duration,
}

impl JsonLinesSink {
    /// Open (and create if needed) the directory holding the tables.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            io: Mutex::new(()),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        })
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn table_path(&self, table: &str) -> Result<PathBuf, SinkError> {
        validate_table(table)?;
        Ok(self.dir.join(format!("{table}.jsonl")))
    }

    fn lock(&self) -> Result<parking_lot::MutexGuard<'_, ()>, SinkError> {
        self.io
            .try_lock_for(self.lock_timeout)
            .ok_or_else(|| SinkError::Unavailable {
                reason: format!(
                    "telemetry directory {} busy for {:?}",
                    self.dir.display(),
                    self.lock_timeout
                ),
            })
    }

    fn load(&self, path: &Path) -> Result<Vec<TelemetryRecord>, SinkError> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        fs::read_to_string(path)?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(SinkError::from))
            .collect()
    }
}

impl TelemetrySink for JsonLinesSink {
    fn write(&self, record: TelemetryRecord) -> Result<(), SinkError> {
        validate_record(&record)?;
        let path = self.table_path(&record.table)?;
        let line = serde_json::to_string(&record)?;
        let _guard = self.lock()?;
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    fn read_latest(&self, table: &str, n: usize) -> Result<Vec<TelemetryRecord>, SinkError> {
        let path = self.table_path(table)?;
        let rows = {
            let _guard = self.lock()?;
            self.load(&path)?
        };
        newest_first(table, rows, n)
    }

    fn read_all(&self, table: &str) -> Result<Vec<TelemetryRecord>, SinkError> {
        let path = self.table_path(table)?;
        let _guard = self.lock()?;
        Ok(oldest_first(self.load(&path)?))
    }

    fn delete_where(&self, table: &str, predicate: RowPredicate<'_>) -> Result<usize, SinkError> {
        let path = self.table_path(table)?;
        let _guard = self.lock()?;
        let rows = self.load(&path)?;
        let before = rows.len();
        let kept: Vec<TelemetryRecord> = rows.into_iter().filter(|row| !predicate(row)).collect();
        let removed = before - kept.len();
        if removed == 0 {
            return Ok(0);
        }

        if kept.is_empty() {
            fs::remove_file(&path)?;
            return Ok(removed);
        }

        let temp_path = self.dir.join(format!(".{table}.jsonl.tmp"));
        {
            let mut writer = BufWriter::new(fs::File::create(&temp_path)?);
            for row in &kept {
                serde_json::to_writer(&mut writer, row)?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }
        fs::rename(&temp_path, &path)?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_latest_round_trips() {
        let dir = tempdir().unwrap();
        let sink = JsonLinesSink::open(dir.path()).unwrap();
        let record = TelemetryRecord::new("DBTest")
            .tag("source", "fault")
            .tag("loop", 3)
            .field("x_dist_to_goal", 0.75);

        sink.write(record.clone()).unwrap();

        assert_eq!(sink.read_latest("DBTest", 1).unwrap(), vec![record]);
        assert!(dir.path().join("DBTest.jsonl").exists());
    }

    #[test]
    fn missing_table_is_empty() {
        let dir = tempdir().unwrap();
        let sink = JsonLinesSink::open(dir.path()).unwrap();

        assert!(sink.read_latest("Nothing", 1).unwrap_err().is_empty_table());
        assert!(sink.read_all("Nothing").unwrap().is_empty());
    }

    #[test]
    fn rows_survive_reopening_the_directory() {
        let dir = tempdir().unwrap();
        {
            let sink = JsonLinesSink::open(dir.path()).unwrap();
            sink.write(TelemetryRecord::new("T").field("n", 1.0)).unwrap();
            sink.write(TelemetryRecord::new("T").field("n", 2.0)).unwrap();
        }

        let reopened = JsonLinesSink::open(dir.path()).unwrap();
        let rows = reopened.read_all("T").unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].field_value("n"), Some(1.0));
    }

    #[test]
    fn delete_where_rewrites_surviving_rows() {
        let dir = tempdir().unwrap();
        let sink = JsonLinesSink::open(dir.path()).unwrap();
        for n in 0..5 {
            sink.write(TelemetryRecord::new("T").field("n", f64::from(n)))
                .unwrap();
        }

        let removed = sink
            .delete_where("T", &|row| row.field_value("n").unwrap_or(0.0) < 3.0)
            .unwrap();

        assert_eq!(removed, 3);
        let rest: Vec<f64> = sink
            .read_all("T")
            .unwrap()
            .iter()
            .filter_map(|r| r.field_value("n"))
            .collect();
        assert_eq!(rest, vec![3.0, 4.0]);
        assert!(!dir.path().join(".T.jsonl.tmp").exists());
    }

    #[test]
    fn purging_everything_removes_the_file() {
        let dir = tempdir().unwrap();
        let sink = JsonLinesSink::open(dir.path()).unwrap();
        sink.write(TelemetryRecord::new("T").field("n", 1.0)).unwrap();

        assert_eq!(sink.delete_where("T", &|_| true).unwrap(), 1);
        assert!(!dir.path().join("T.jsonl").exists());
        assert!(sink.read_latest("T", 1).unwrap_err().is_empty_table());
    }

    #[test]
    fn non_finite_row_never_reaches_the_file() {
        let dir = tempdir().unwrap();
        let sink = JsonLinesSink::open(dir.path()).unwrap();
        sink.write(TelemetryRecord::new("T").goal_offset(1.0, 1.0)).unwrap();

        let error = sink
            .write(TelemetryRecord::new("T").goal_offset(f64::NAN, 2.0))
            .unwrap_err();

        assert!(matches!(error, SinkError::NonFinite { ref table, .. } if table == "T"));
        assert_eq!(sink.read_latest("T", 1).unwrap().len(), 1);
        assert_eq!(sink.read_all("T").unwrap().len(), 1);
        assert_eq!(sink.delete_where("T", &|_| true).unwrap(), 1);
    }

    #[test]
    fn path_like_table_names_are_rejected() {
        let dir = tempdir().unwrap();
        let sink = JsonLinesSink::open(dir.path()).unwrap();

        let error = sink.read_all("../escape").unwrap_err();
        assert!(matches!(error, SinkError::InvalidTable(_)));
    }
}
