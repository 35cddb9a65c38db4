//! Core value types shared by every toolscope crate.
//!
//! Log entries, levels, severities, and the descriptors exchanged with the
//! toolchain wrapper that owns the actual build/flash/monitor invocations.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// =============================================================================
// LogLevel
// =============================================================================

/// Event log level.
///
/// Ordered from least to most severe, so `level >= LogLevel::Warning`
/// selects warnings and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Verbose diagnostics (heartbeats, internal detail).
    Debug,
    /// Normal operation.
    Info,
    /// Something failed but the host can carry on.
    Warning,
    /// An operation failed.
    Error,
}

impl LogLevel {
    /// All levels, least severe first.
    pub const ALL: [Self; 4] = [Self::Debug, Self::Info, Self::Warning, Self::Error];

    /// Returns the canonical upper-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARNING" | "WARN" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            other => Err(CoreError::validation(format!(
                "unknown log level '{other}' (expected DEBUG, INFO, WARNING or ERROR)"
            ))),
        }
    }
}

// =============================================================================
// Severity
// =============================================================================

/// Severity of a diagnosed failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational; the operation may still be usable.
    Info,
    /// Likely transient or environmental.
    Warning,
    /// Blocks the operation until fixed.
    Critical,
}

impl Severity {
    /// Returns the canonical lower-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }

    /// Log level used when a diagnosis of this severity is written to the event log.
    #[must_use]
    pub const fn log_level(&self) -> LogLevel {
        match self {
            Self::Critical => LogLevel::Error,
            Self::Warning | Self::Info => LogLevel::Warning,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(Self::Info),
            "warning" | "warn" => Ok(Self::Warning),
            "critical" | "error" => Ok(Self::Critical),
            other => Err(CoreError::validation(format!(
                "unknown severity '{other}' (expected info, warning or critical)"
            ))),
        }
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// Outcome of one instrumented operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The operation reported success.
    Success,
    /// The operation failed, was cancelled, or timed out.
    Failure,
}

impl Outcome {
    /// Converts a success flag into an outcome.
    #[must_use]
    pub const fn from_success(success: bool) -> Self {
        if success { Self::Success } else { Self::Failure }
    }

    /// Returns true for [`Outcome::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns the canonical lower-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// ContextValue / LogEntry
// =============================================================================

/// A scalar attached to a log entry's context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Finite floating point number.
    Float(f64),
    /// Text.
    Str(String),
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for ContextValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ContextValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ContextValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for ContextValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u64> for ContextValue {
    fn from(value: u64) -> Self {
        i64::try_from(value).map_or_else(|_| Self::Str(value.to_string()), Self::Int)
    }
}

impl From<usize> for ContextValue {
    fn from(value: usize) -> Self {
        i64::try_from(value).map_or_else(|_| Self::Str(value.to_string()), Self::Int)
    }
}

impl From<f64> for ContextValue {
    // JSON has no NaN/inf; keep them readable instead of turning them into null.
    fn from(value: f64) -> Self {
        if value.is_finite() {
            Self::Float(value)
        } else {
            Self::Str(value.to_string())
        }
    }
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// Context attached to a log entry. Sorted by key so rendering is stable.
pub type Context = BTreeMap<String, ContextValue>;

/// One event log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the entry was created.
    pub timestamp: DateTime<Utc>,
    /// Entry level.
    pub level: LogLevel,
    /// Emitting component (operation name, "observability", ...).
    pub component: String,
    /// Human message.
    pub message: String,
    /// Structured context.
    #[serde(default)]
    pub context: Context,
}

impl LogEntry {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(level: LogLevel, component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::at(Utc::now(), level, component, message)
    }

    /// Creates an entry with an explicit timestamp.
    #[must_use]
    pub fn at(
        timestamp: DateTime<Utc>,
        level: LogLevel,
        component: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            level,
            component: component.into(),
            message: message.into(),
            context: Context::new(),
        }
    }

    /// Adds a context value.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ContextValue>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Replaces the whole context.
    #[must_use]
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }
}

/// Strips control characters other than `\n`, `\r` and `\t`.
///
/// Borrows when there is nothing to strip, which is the common case.
#[must_use]
pub fn sanitize(text: &str) -> Cow<'_, str> {
    let is_unsafe = |c: char| c.is_control() && !matches!(c, '\n' | '\r' | '\t');
    if text.chars().any(is_unsafe) {
        Cow::Owned(text.chars().filter(|c| !is_unsafe(*c)).collect())
    } else {
        Cow::Borrowed(text)
    }
}

/// Truncates `text` to at most `max_chars` characters on a char boundary.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// =============================================================================
// Collaborator descriptors
// =============================================================================

/// Per-invocation descriptor supplied by the toolchain wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationRecord {
    /// Operation name ("build", "flash", ...).
    pub operation: String,
    /// When the invocation started.
    pub started_at: DateTime<Utc>,
    /// When the invocation finished.
    pub ended_at: DateTime<Utc>,
    /// Reported outcome.
    pub outcome: Outcome,
    /// Captured error text, if any.
    #[serde(default)]
    pub error_text: Option<String>,
}

impl InvocationRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(
        operation: impl Into<String>,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        outcome: Outcome,
    ) -> Self {
        Self {
            operation: operation.into(),
            started_at,
            ended_at,
            outcome,
            error_text: None,
        }
    }

    /// Attaches captured error text.
    #[must_use]
    pub fn with_error_text(mut self, text: impl Into<String>) -> Self {
        self.error_text = Some(text.into());
        self
    }

    /// Wall-clock duration. A clock that went backwards yields zero.
    #[must_use]
    pub fn duration(&self) -> Duration {
        (self.ended_at - self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// Captured output of an external tool process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Process exit code.
    pub exit_code: i32,
    /// Captured standard output.
    #[serde(default)]
    pub stdout: String,
    /// Captured standard error.
    #[serde(default)]
    pub stderr: String,
}

impl ToolOutput {
    /// Successful output.
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output.
    #[must_use]
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Returns true if the process exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// How an invocation's result reports success and failure text.
///
/// Implemented for `Result<T, E>` (error text is `E`'s display) and for
/// [`ToolOutput`] (error text is stderr, falling back to stdout).
pub trait ReportOutcome {
    /// Success or failure of the invocation.
    fn outcome(&self) -> Outcome;

    /// Text to diagnose when the invocation failed.
    fn error_text(&self) -> Option<String>;
}

impl<T, E: fmt::Display> ReportOutcome for std::result::Result<T, E> {
    fn outcome(&self) -> Outcome {
        Outcome::from_success(self.is_ok())
    }

    fn error_text(&self) -> Option<String> {
        self.as_ref().err().map(ToString::to_string)
    }
}

impl ReportOutcome for ToolOutput {
    fn outcome(&self) -> Outcome {
        Outcome::from_success(self.success())
    }

    fn error_text(&self) -> Option<String> {
        if self.success() {
            None
        } else if self.stderr.trim().is_empty() {
            Some(self.stdout.clone())
        } else {
            Some(self.stderr.clone())
        }
    }
}
