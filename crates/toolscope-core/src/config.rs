//! Observability configuration.
//!
//! Configuration is validated at load time, with sensible defaults and clear
//! error messages. Durations use humantime notation (`"10s"`, `"20m"`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::types::Severity;

/// Top-level configuration for an observability context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Working directory; logs live under `<root>/logs/`.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Base name of the log files.
    #[serde(default = "default_log_name")]
    pub log_name: String,

    /// Size of the active machine sink that triggers rotation.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    /// Archives kept per sink after rotation.
    #[serde(default = "default_max_archives")]
    pub max_archives: usize,

    /// Capacity of the diagnosis history ring buffer.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Heartbeat period for long-running operations. Zero disables heartbeats.
    #[serde(default = "default_heartbeat_interval", with = "humantime_serde")]
    pub heartbeat_interval: Duration,

    /// Forward each log entry to `tracing` as well as to the files.
    #[serde(default = "default_true")]
    pub echo_to_tracing: bool,

    /// Colour human-readable renderings with ANSI escapes.
    #[serde(default)]
    pub ansi: bool,

    /// Save metric aggregates at shutdown and restore them at open.
    #[serde(default = "default_true")]
    pub persist_metrics: bool,

    /// Per-operation timeouts.
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Extra diagnostic rules loaded after the built-in table.
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

fn default_root() -> PathBuf {
    PathBuf::from(".toolscope")
}

fn default_log_name() -> String {
    "toolscope".to_string()
}

fn default_max_file_bytes() -> u64 {
    10 * 1024 * 1024 // 10 MiB
}

fn default_max_archives() -> usize {
    5
}

fn default_history_capacity() -> usize {
    100
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_true() -> bool {
    true
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            log_name: default_log_name(),
            max_file_bytes: default_max_file_bytes(),
            max_archives: default_max_archives(),
            history_capacity: default_history_capacity(),
            heartbeat_interval: default_heartbeat_interval(),
            echo_to_tracing: true,
            ansi: false,
            persist_metrics: true,
            timeouts: TimeoutConfig::default(),
            rules: Vec::new(),
        }
    }
}

impl ObservabilityConfig {
    /// Creates a configuration rooted at `root` with default settings.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Sets the log file base name.
    #[must_use]
    pub fn with_log_name(mut self, name: impl Into<String>) -> Self {
        self.log_name = name.into();
        self
    }

    /// Sets the rotation threshold.
    #[must_use]
    pub const fn with_max_file_bytes(mut self, bytes: u64) -> Self {
        self.max_file_bytes = bytes;
        self
    }

    /// Sets how many archives are retained.
    #[must_use]
    pub const fn with_max_archives(mut self, count: usize) -> Self {
        self.max_archives = count;
        self
    }

    /// Sets the diagnosis history capacity.
    #[must_use]
    pub const fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Sets the heartbeat interval.
    #[must_use]
    pub const fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Enables or disables echoing entries to `tracing`.
    #[must_use]
    pub const fn with_echo_to_tracing(mut self, enabled: bool) -> Self {
        self.echo_to_tracing = enabled;
        self
    }

    /// Enables or disables ANSI colour in human renderings.
    #[must_use]
    pub const fn with_ansi(mut self, enabled: bool) -> Self {
        self.ansi = enabled;
        self
    }

    /// Enables or disables persisting metric aggregates across runs.
    #[must_use]
    pub const fn with_persist_metrics(mut self, enabled: bool) -> Self {
        self.persist_metrics = enabled;
        self
    }

    /// Appends an extra diagnostic rule.
    #[must_use]
    pub fn with_rule(mut self, rule: RuleConfig) -> Self {
        self.rules.push(rule);
        self
    }

    /// Returns the on-disk layout derived from this configuration.
    #[must_use]
    pub fn layout(&self) -> LogLayout {
        LogLayout::new(&self.root, &self.log_name)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.log_name.is_empty() {
            return Err(CoreError::config("log_name cannot be empty"));
        }
        if !self
            .log_name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CoreError::config(
                "log_name must contain only alphanumeric characters, hyphens, and underscores",
            ));
        }
        if self.max_file_bytes == 0 {
            return Err(CoreError::config("max_file_bytes must be positive"));
        }
        if self.max_archives == 0 {
            return Err(CoreError::config("max_archives must be positive"));
        }
        if self.history_capacity == 0 {
            return Err(CoreError::config("history_capacity must be positive"));
        }
        for rule in &self.rules {
            rule.validate()?;
        }
        Ok(())
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| CoreError::config(format!("failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    /// Returns an error if the text is not valid configuration.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| CoreError::config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// LogLayout
// =============================================================================

/// Paths of the event log files.
///
/// ```text
/// <root>/logs/<name>.log                  human sink (active)
/// <root>/logs/structured/<name>.jsonl     machine sink (active)
/// <root>/logs/archive/<name>.<seq>.log    rotated machine sinks
/// <root>/logs/archive/<name>-human.<seq>.log  rotated human sinks
/// <root>/logs/.lock                       cross-process writer lock
/// <root>/logs/structured/<name>-metrics.json  persisted aggregates
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLayout {
    /// Base name of the files.
    pub name: String,
    /// `<root>/logs`.
    pub log_dir: PathBuf,
    /// `<root>/logs/structured`.
    pub structured_dir: PathBuf,
    /// `<root>/logs/archive`.
    pub archive_dir: PathBuf,
}

impl LogLayout {
    /// Builds the layout for `root` and `name`.
    #[must_use]
    pub fn new(root: &Path, name: &str) -> Self {
        let log_dir = root.join("logs");
        Self {
            name: name.to_string(),
            structured_dir: log_dir.join("structured"),
            archive_dir: log_dir.join("archive"),
            log_dir,
        }
    }

    /// Active human-readable file.
    #[must_use]
    pub fn human_path(&self) -> PathBuf {
        self.log_dir.join(format!("{}.log", self.name))
    }

    /// Active machine-readable file.
    #[must_use]
    pub fn machine_path(&self) -> PathBuf {
        self.structured_dir.join(format!("{}.jsonl", self.name))
    }

    /// Aggregates saved at shutdown and restored at open.
    #[must_use]
    pub fn metrics_path(&self) -> PathBuf {
        self.structured_dir.join(format!("{}-metrics.json", self.name))
    }

    /// Advisory lock file shared by every writer of this directory.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.log_dir.join(".lock")
    }

    /// Archive path for a rotated machine sink.
    #[must_use]
    pub fn machine_archive(&self, sequence: u64) -> PathBuf {
        self.archive_dir
            .join(format!("{}.{sequence}.log", self.machine_archive_prefix()))
    }

    /// Archive path for a rotated human sink.
    #[must_use]
    pub fn human_archive(&self, sequence: u64) -> PathBuf {
        self.archive_dir
            .join(format!("{}.{sequence}.log", self.human_archive_prefix()))
    }

    /// File-name prefix shared by machine archives.
    #[must_use]
    pub fn machine_archive_prefix(&self) -> String {
        self.name.clone()
    }

    /// File-name prefix shared by human archives.
    #[must_use]
    pub fn human_archive_prefix(&self) -> String {
        format!("{}-human", self.name)
    }

    /// Parses the sequence number out of an archive file name with `prefix`.
    #[must_use]
    pub fn parse_sequence(prefix: &str, file_name: &str) -> Option<u64> {
        file_name
            .strip_prefix(prefix)?
            .strip_prefix('.')?
            .strip_suffix(".log")?
            .parse()
            .ok()
    }
}

// =============================================================================
// TimeoutConfig
// =============================================================================

/// Per-operation timeouts for instrumented invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Timeout for operations without an explicit entry.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub default: Duration,

    /// Explicit per-operation timeouts.
    #[serde(default = "default_operation_timeouts")]
    pub operations: BTreeMap<String, HumanDuration>,
}

/// A duration written in humantime notation inside a TOML map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HumanDuration(#[serde(with = "humantime_serde")] pub Duration);

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_operation_timeouts() -> BTreeMap<String, HumanDuration> {
    [
        ("build", 600),
        ("flash", 600),
        ("monitor", 1200),
        ("clean", 60),
        ("size", 30),
    ]
    .into_iter()
    .map(|(name, secs)| (name.to_string(), HumanDuration(Duration::from_secs(secs))))
    .collect()
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default: default_timeout(),
            operations: default_operation_timeouts(),
        }
    }
}

impl TimeoutConfig {
    /// Returns the timeout for an operation.
    ///
    /// An exact entry wins. Otherwise a leading tool prefix such as `esp_` is
    /// ignored, so `esp_build` and `build` share a timeout.
    #[must_use]
    pub fn for_operation(&self, operation: &str) -> Duration {
        self.operations
            .get(operation)
            .or_else(|| {
                operation
                    .split_once('_')
                    .and_then(|(_, rest)| self.operations.get(rest))
            })
            .map_or(self.default, |d| d.0)
    }
}

// =============================================================================
// RuleConfig
// =============================================================================

/// A diagnostic rule declared in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Unique rule name.
    pub name: String,
    /// Category reported on match.
    pub category: String,
    /// Severity reported on match.
    #[serde(default = "default_rule_severity")]
    pub severity: Severity,
    /// Suggestion reported on match.
    pub suggestion: String,
    /// Case-insensitive regular expressions.
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Case-insensitive literal substrings.
    #[serde(default)]
    pub substrings: Vec<String>,
    /// Insertion position in the rule table; appended when absent.
    #[serde(default)]
    pub position: Option<usize>,
}

fn default_rule_severity() -> Severity {
    Severity::Warning
}

impl RuleConfig {
    /// Validates the rule declaration (patterns are compiled later).
    ///
    /// # Errors
    /// Returns an error if required fields are missing.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::config("rule name cannot be empty"));
        }
        if self.category.trim().is_empty() {
            return Err(CoreError::config(format!(
                "rule '{}' has an empty category",
                self.name
            )));
        }
        if self.patterns.is_empty() && self.substrings.is_empty() {
            return Err(CoreError::config(format!(
                "rule '{}' needs at least one pattern or substring",
                self.name
            )));
        }
        Ok(())
    }
}
