//! Pure rendering of log entries, aggregates, diagnoses, and status.
//!
//! Every renderer is deterministic: the only time value in the output is the
//! input's own timestamp.
//!
//! Machine records are flat JSON objects with stable field names and a
//! `record` discriminator. They parse back into the original value with
//! [`parse_machine_line`].

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use toolscope_core::{AggregateStat, ContextValue, LogEntry, LogLevel, Severity};
use toolscope_diagnose::Diagnosis;

use crate::error::{ObserveError, Result};
use crate::status::ObservabilityStatus;

/// Name of the discriminator field in machine records.
pub const RECORD_FIELD: &str = "record";

const ANSI_RESET: &str = "\x1b[0m";

// =============================================================================
// Render
// =============================================================================

/// Human and machine renderings of one value.
pub trait Render {
    /// Value of the `record` discriminator.
    const KIND: RecordKind;

    /// Readable, deterministic text. `ansi` colours the marker.
    fn render_human(&self, ansi: bool) -> String;

    /// Flat structured record with stable field names, without the
    /// discriminator.
    fn machine_fields(&self) -> Map<String, Value>;

    /// Flat structured record including the `record` discriminator.
    fn render_machine(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(RECORD_FIELD.into(), Value::from(Self::KIND.as_str()));
        map.extend(self.machine_fields());
        map
    }

    /// One JSON line (no trailing newline).
    fn to_machine_line(&self) -> String {
        Value::Object(self.render_machine()).to_string()
    }
}

/// Kinds of machine records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// A [`LogEntry`].
    LogEntry,
    /// An [`AggregateStat`].
    Aggregate,
    /// A [`Diagnosis`].
    Diagnosis,
    /// An [`ObservabilityStatus`].
    Status,
}

impl RecordKind {
    /// Discriminator value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LogEntry => "log_entry",
            Self::Aggregate => "aggregate",
            Self::Diagnosis => "diagnosis",
            Self::Status => "status",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "log_entry" => Some(Self::LogEntry),
            "aggregate" => Some(Self::Aggregate),
            "diagnosis" => Some(Self::Diagnosis),
            "status" => Some(Self::Status),
            _ => None,
        }
    }
}

/// A parsed machine record.
#[derive(Debug, Clone, PartialEq)]
pub enum MachineRecord {
    /// An event log entry.
    LogEntry(LogEntry),
    /// A metrics aggregate.
    Aggregate(AggregateStat),
    /// A diagnosis.
    Diagnosis(Diagnosis),
    /// A status snapshot.
    Status(ObservabilityStatus),
}

/// Parses one machine line back into its value.
///
/// # Errors
/// Returns [`ObserveError::Serialization`] for invalid JSON, a missing or
/// unknown discriminator, or missing fields.
pub fn parse_machine_line(line: &str) -> Result<MachineRecord> {
    let value: Value = serde_json::from_str(line.trim())?;
    let Value::Object(mut map) = value else {
        return Err(ObserveError::serialization("machine record is not an object"));
    };
    let kind = map
        .remove(RECORD_FIELD)
        .and_then(|v| v.as_str().and_then(RecordKind::parse))
        .ok_or_else(|| ObserveError::serialization("missing or unknown record kind"))?;

    let value = Value::Object(map);
    Ok(match kind {
        RecordKind::LogEntry => MachineRecord::LogEntry(serde_json::from_value(value)?),
        RecordKind::Aggregate => MachineRecord::Aggregate(serde_json::from_value(value)?),
        RecordKind::Diagnosis => MachineRecord::Diagnosis(serde_json::from_value(value)?),
        RecordKind::Status => MachineRecord::Status(serde_json::from_value(value)?),
    })
}

/// Parses a machine line that must hold a log entry.
///
/// # Errors
/// Returns an error if the line is not a valid log entry record.
pub fn parse_log_entry(line: &str) -> Result<LogEntry> {
    match parse_machine_line(line)? {
        MachineRecord::LogEntry(entry) => Ok(entry),
        _ => Err(ObserveError::serialization("record is not a log entry")),
    }
}

// =============================================================================
// Field helpers
// =============================================================================

fn timestamp_exact(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn timestamp_human(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn duration_text(d: Duration) -> String {
    humantime::format_duration(d).to_string()
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn context_value(value: &ContextValue) -> Value {
    match value {
        ContextValue::Bool(b) => Value::Bool(*b),
        ContextValue::Int(i) => Value::from(*i),
        ContextValue::Float(f) => Value::from(*f),
        ContextValue::Str(s) => Value::from(s.as_str()),
    }
}

fn human_context_value(value: &ContextValue) -> String {
    match value {
        ContextValue::Str(s)
            if s.is_empty() || s.contains(|c: char| c.is_whitespace() || c == '=' || c == '"') =>
        {
            format!("{s:?}")
        }
        other => other.to_string(),
    }
}

const fn level_marker(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Debug => "[.]",
        LogLevel::Info => "[i]",
        LogLevel::Warning => "[!]",
        LogLevel::Error => "[x]",
    }
}

const fn level_colour(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Debug => "\x1b[2m",
        LogLevel::Info => "\x1b[32m",
        LogLevel::Warning => "\x1b[33m",
        LogLevel::Error => "\x1b[31m",
    }
}

const fn severity_marker(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "[i]",
        Severity::Warning => "[!]",
        Severity::Critical => "[x]",
    }
}

fn marked(marker: &str, label: &str, colour: &str, ansi: bool) -> String {
    if ansi {
        format!("{colour}{marker} {label}{ANSI_RESET}")
    } else {
        format!("{marker} {label}")
    }
}

// =============================================================================
// LogEntry
// =============================================================================

impl Render for LogEntry {
    const KIND: RecordKind = RecordKind::LogEntry;

    /// `<timestamp> <marker> <LEVEL> <component>: <message> k=v ...`
    fn render_human(&self, ansi: bool) -> String {
        let mut line = format!(
            "{} {} {}: {}",
            timestamp_human(&self.timestamp),
            marked(
                level_marker(self.level),
                self.level.as_str(),
                level_colour(self.level),
                ansi
            ),
            self.component,
            self.message
        );
        for (key, value) in &self.context {
            let _ = write!(line, " {key}={}", human_context_value(value));
        }
        line
    }

    fn machine_fields(&self) -> Map<String, Value> {
        let context: Map<String, Value> = self
            .context
            .iter()
            .map(|(k, v)| (k.clone(), context_value(v)))
            .collect();

        let mut map = Map::new();
        map.insert("timestamp".into(), Value::from(timestamp_exact(&self.timestamp)));
        map.insert("level".into(), Value::from(self.level.as_str()));
        map.insert("component".into(), Value::from(self.component.as_str()));
        map.insert("message".into(), Value::from(self.message.as_str()));
        map.insert("context".into(), Value::Object(context));
        map
    }
}

// =============================================================================
// AggregateStat
// =============================================================================

impl Render for AggregateStat {
    const KIND: RecordKind = RecordKind::Aggregate;

    fn render_human(&self, _ansi: bool) -> String {
        let mut text = format!(
            "{}: {} calls, {} ok, {} failed ({:.1}%), mean {}, min {}, max {}",
            self.operation,
            self.call_count,
            self.success_count,
            self.failure_count,
            self.success_rate() * 100.0,
            duration_text(self.mean_duration),
            duration_text(self.min_duration),
            duration_text(self.max_duration),
        );
        if let (Some(at), Some(outcome)) = (self.last_called_at, self.last_outcome) {
            let _ = write!(text, ", last {outcome} at {}", timestamp_human(&at));
        }
        text
    }

    fn machine_fields(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("operation".into(), Value::from(self.operation.as_str()));
        map.insert("call_count".into(), Value::from(self.call_count));
        map.insert("success_count".into(), Value::from(self.success_count));
        map.insert("failure_count".into(), Value::from(self.failure_count));
        map.insert("success_rate".into(), Value::from(self.success_rate()));
        map.insert("mean_duration".into(), Value::from(duration_text(self.mean_duration)));
        map.insert("mean_duration_ms".into(), Value::from(millis(self.mean_duration)));
        map.insert("min_duration".into(), Value::from(duration_text(self.min_duration)));
        map.insert("max_duration".into(), Value::from(duration_text(self.max_duration)));
        map.insert(
            "stddev_duration".into(),
            Value::from(duration_text(self.stddev_duration)),
        );
        map.insert(
            "last_called_at".into(),
            self.last_called_at
                .as_ref()
                .map_or(Value::Null, |ts| Value::from(timestamp_exact(ts))),
        );
        map.insert(
            "last_outcome".into(),
            self.last_outcome
                .map_or(Value::Null, |o| Value::from(o.as_str())),
        );
        map
    }
}

// =============================================================================
// Diagnosis
// =============================================================================

impl Render for Diagnosis {
    const KIND: RecordKind = RecordKind::Diagnosis;

    fn render_human(&self, ansi: bool) -> String {
        let colour = level_colour(self.severity.log_level());
        let label = self.severity.as_str().to_ascii_uppercase();
        let rule = self.rule_name.as_deref().unwrap_or("no matching rule");
        let first_line = self.raw_error_excerpt.lines().next().unwrap_or_default();
        format!(
            "{} {} ({rule}): {}\n    error: {first_line}",
            marked(severity_marker(self.severity), &label, colour, ansi),
            self.matched_category,
            self.suggestion,
        )
    }

    fn machine_fields(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(
            "matched_category".into(),
            Value::from(self.matched_category.as_str()),
        );
        map.insert(
            "rule_name".into(),
            self.rule_name
                .as_deref()
                .map_or(Value::Null, Value::from),
        );
        map.insert("severity".into(), Value::from(self.severity.as_str()));
        map.insert("suggestion".into(), Value::from(self.suggestion.as_str()));
        map.insert(
            "raw_error_excerpt".into(),
            Value::from(self.raw_error_excerpt.as_str()),
        );
        map.insert("timestamp".into(), Value::from(timestamp_exact(&self.timestamp)));
        map
    }
}

// =============================================================================
// ObservabilityStatus
// =============================================================================

impl Render for ObservabilityStatus {
    const KIND: RecordKind = RecordKind::Status;

    fn render_human(&self, ansi: bool) -> String {
        let (marker, label, level) = if self.is_healthy() {
            ("[i]", "HEALTHY", LogLevel::Info)
        } else {
            ("[!]", "DEGRADED", LogLevel::Warning)
        };
        let mut text = marked(marker, label, level_colour(level), ansi);
        let _ = write!(
            text,
            "\n  log dir:        {}\
             \n  log writable:   {}\
             \n  write failures: {}\
             \n  active log:     {} bytes\
             \n  archives:       {}\
             \n  rules loaded:   {}\
             \n  operations:     {} ({} calls)\
             \n  history:        {}/{}\
             \n  uptime:         {}",
            self.log_dir.display(),
            self.log_writable,
            self.write_failures,
            self.active_log_bytes,
            self.archive_count,
            self.rules_loaded,
            self.operations_tracked,
            self.total_calls,
            self.history_len,
            self.history_capacity,
            duration_text(Duration::from_secs(self.uptime.as_secs())),
        );
        text
    }

    fn machine_fields(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(
            "log_dir".into(),
            Value::from(self.log_dir.to_string_lossy().into_owned()),
        );
        map.insert("log_writable".into(), Value::from(self.log_writable));
        map.insert("write_failures".into(), Value::from(self.write_failures));
        map.insert("active_log_bytes".into(), Value::from(self.active_log_bytes));
        map.insert("archive_count".into(), Value::from(self.archive_count));
        map.insert("rules_loaded".into(), Value::from(self.rules_loaded));
        map.insert("operations_tracked".into(), Value::from(self.operations_tracked));
        map.insert("total_calls".into(), Value::from(self.total_calls));
        map.insert("history_len".into(), Value::from(self.history_len));
        map.insert("history_capacity".into(), Value::from(self.history_capacity));
        map.insert("uptime".into(), Value::from(duration_text(self.uptime)));
        map
    }
}

// =============================================================================
// Table
// =============================================================================

/// Renders a metrics snapshot as a column-aligned table.
#[must_use]
pub fn render_table(stats: &BTreeMap<String, AggregateStat>) -> String {
    const HEADERS: [&str; 8] = [
        "Operation", "Calls", "Success", "Failed", "Rate", "Mean", "Min", "Max",
    ];

    let rows: Vec<[String; 8]> = stats
        .values()
        .map(|s| {
            [
                s.operation.clone(),
                s.call_count.to_string(),
                s.success_count.to_string(),
                s.failure_count.to_string(),
                format!("{:.1}%", s.success_rate() * 100.0),
                format!("{:.1}ms", millis(s.mean_duration)),
                format!("{:.1}ms", millis(s.min_duration)),
                format!("{:.1}ms", millis(s.max_duration)),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let header: Vec<String> = HEADERS.iter().map(ToString::to_string).collect();
    push_row(&mut out, &header, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_row(&mut out, &rule, &widths);
    for row in &rows {
        push_row(&mut out, row, &widths);
    }
    out
}

// First column left-aligned, numbers right-aligned.
fn push_row(out: &mut String, cells: &[String], widths: &[usize; 8]) {
    let mut line = String::new();
    for (i, (cell, &width)) in cells.iter().zip(widths).enumerate() {
        if i > 0 {
            line.push_str("  ");
        }
        if i == 0 {
            let _ = write!(line, "{cell:<width$}");
        } else {
            let _ = write!(line, "{cell:>width$}");
        }
    }
    out.push_str(line.trim_end());
    out.push('\n');
}
