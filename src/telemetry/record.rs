//! Telemetry records and their text rendering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Field holding the x offset to the goal.
pub const X_DIST_TO_GOAL: &str = "x_dist_to_goal";
/// Field holding the y offset to the goal.
pub const Y_DIST_TO_GOAL: &str = "y_dist_to_goal";

/// Value of a record tag: text or a number.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Number(f64),
    Text(String),
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for TagValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for TagValue {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<i64> for TagValue {
    fn from(value: i64) -> Self {
        // Loop counters and budgets stay far below 2^53.
        Self::Number(value as f64)
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

/// One measurement appended to a table.
///
/// # Example
///
/// ```rust
/// use scenario_harness::telemetry::{TagValue, TelemetryRecord};
///
/// let record = TelemetryRecord::new("NestDBTest")
///     .tag("source", "primary")
///     .tag("loop", 3)
///     .field("x_dist_to_goal", 1.5);
///
/// assert_eq!(record.field_value("x_dist_to_goal"), Some(1.5));
/// assert_eq!(record.tags.get("loop"), Some(&TagValue::Number(3.0)));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub table: String,
    pub tags: BTreeMap<String, TagValue>,
    pub fields: BTreeMap<String, f64>,
    pub timestamp: DateTime<Utc>,
}

impl TelemetryRecord {
    /// Start a record for `table`, stamped with the current time.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn tag(mut self, name: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.tags.insert(name.into(), value.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: f64) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn field_value(&self, name: &str) -> Option<f64> {
        self.fields.get(name).copied()
    }

    pub fn tag_value(&self, name: &str) -> Option<&TagValue> {
        self.tags.get(name)
    }

    /// Set the goal offset fields.
    pub fn goal_offset(self, x: f64, y: f64) -> Self {
        self.field(X_DIST_TO_GOAL, x).field(Y_DIST_TO_GOAL, y)
    }

    /// The goal offset fields, when both are present.
    pub fn goal_offset_value(&self) -> Option<(f64, f64)> {
        Some((
            self.field_value(X_DIST_TO_GOAL)?,
            self.field_value(Y_DIST_TO_GOAL)?,
        ))
    }
}

/// Render rows as a plain text table: time, then every tag, then every field.
pub fn render_table(table: &str, records: &[TelemetryRecord]) -> String {
    if records.is_empty() {
        return format!("{table}: no rows\n");
    }

    let tag_names: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.tags.keys().map(String::as_str))
        .collect();
    let field_names: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.fields.keys().map(String::as_str))
        .collect();

    let mut header = vec!["time".to_string()];
    header.extend(tag_names.iter().map(|n| n.to_string()));
    header.extend(field_names.iter().map(|n| n.to_string()));

    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|record| {
            let mut row = vec![record.timestamp.to_rfc3339()];
            row.extend(tag_names.iter().map(|name| {
                record
                    .tag_value(name)
                    .map(ToString::to_string)
                    .unwrap_or_default()
            }));
            row.extend(field_names.iter().map(|name| {
                record
                    .field_value(name)
                    .map(|v| format!("{v:.4}"))
                    .unwrap_or_default()
            }));
            row
        })
        .collect();

    let widths: Vec<usize> = (0..header.len())
        .map(|col| {
            rows.iter()
                .map(|row| row[col].len())
                .chain(std::iter::once(header[col].len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let format_row = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut out = format!("{table} ({} rows)\n", records.len());
    out.push_str(&format_row(&header));
    out.push('\n');
    for row in &rows {
        out.push_str(&format_row(row));
        out.push('\n');
    }
    out
}
