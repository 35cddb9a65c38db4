//! Observability test harness.
//!
//! [`ObservabilityHarness`] owns a temporary project directory and an
//! [`Observability`] context rooted in it. [`ScriptedTool`] stands in for an
//! external toolchain process: it replays a fixed script of outputs, so tests
//! can drive success, failure, latency, and hangs without spawning anything.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tempfile::TempDir;
use toolscope_core::{LogEntry, ObservabilityConfig, RuleConfig, ToolOutput};
use toolscope_observe::{Observability, parse_log_entry};

use crate::error::Result;

// =============================================================================
// Scripted tool
// =============================================================================

#[derive(Debug, Clone)]
enum Step {
    Return { output: ToolOutput, latency: Duration },
    Hang,
}

/// A fake toolchain tool that replays a script of outputs.
///
/// Each [`ScriptedTool::invoke`] takes the next step, wrapping around at the
/// end. Clones share the script cursor. An empty script succeeds with empty
/// output.
#[derive(Debug, Clone)]
pub struct ScriptedTool {
    operation: String,
    steps: Vec<Step>,
    cursor: Arc<AtomicUsize>,
}

impl ScriptedTool {
    /// Creates a tool for `operation` with an empty script.
    #[must_use]
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            steps: Vec::new(),
            cursor: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Appends a successful step.
    #[must_use]
    pub fn then_succeed(self, stdout: impl Into<String>) -> Self {
        self.then_output(ToolOutput::ok(stdout), Duration::ZERO)
    }

    /// Appends a failing step.
    #[must_use]
    pub fn then_fail(self, exit_code: i32, stderr: impl Into<String>) -> Self {
        self.then_output(ToolOutput::failed(exit_code, stderr), Duration::ZERO)
    }

    /// Appends a step that returns `output` after `latency`.
    #[must_use]
    pub fn then_output(mut self, output: ToolOutput, latency: Duration) -> Self {
        self.steps.push(Step::Return { output, latency });
        self
    }

    /// Appends a step that never completes.
    #[must_use]
    pub fn then_hang(mut self) -> Self {
        self.steps.push(Step::Hang);
        self
    }

    /// Operation name this tool is instrumented under.
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Number of invocations so far, across all clones.
    #[must_use]
    pub fn invocations(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }

    /// Runs the next scripted step.
    pub async fn invoke(&self) -> ToolOutput {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed);
        if self.steps.is_empty() {
            return ToolOutput::ok(String::new());
        }
        match self.steps.get(index % self.steps.len()) {
            Some(Step::Return { output, latency }) => {
                if !latency.is_zero() {
                    tokio::time::sleep(*latency).await;
                }
                output.clone()
            }
            Some(Step::Hang) => std::future::pending().await,
            None => ToolOutput::ok(String::new()),
        }
    }
}

// =============================================================================
// Harness
// =============================================================================

/// An [`Observability`] context in a throwaway project directory.
#[derive(Debug)]
pub struct ObservabilityHarness {
    dir: TempDir,
    config: ObservabilityConfig,
    obs: Observability,
}

impl ObservabilityHarness {
    /// Creates a new harness builder.
    #[must_use]
    pub fn builder() -> ObservabilityHarnessBuilder {
        ObservabilityHarnessBuilder::default()
    }

    /// Creates a harness with default settings.
    ///
    /// # Errors
    /// Returns an error if the temporary directory cannot be created.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// The context under test.
    #[must_use]
    pub const fn observability(&self) -> &Observability {
        &self.obs
    }

    /// Project root the context writes under.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Configuration the context was opened with.
    #[must_use]
    pub const fn config(&self) -> &ObservabilityConfig {
        &self.config
    }

    /// Instruments one invocation of `tool`.
    pub async fn run(&self, tool: &ScriptedTool) -> ToolOutput {
        self.obs.instrument(tool.operation(), tool.invoke()).await
    }

    /// Instruments one invocation of `tool`, cancelling it after `timeout`.
    ///
    /// # Errors
    /// Returns [`crate::TestError::Timeout`] if the invocation was cancelled.
    pub async fn run_with_timeout(
        &self,
        tool: &ScriptedTool,
        timeout: Duration,
    ) -> Result<ToolOutput> {
        Ok(self
            .obs
            .instrument_with_timeout(tool.operation(), timeout, tool.invoke())
            .await?)
    }

    /// Shuts the context down and opens a fresh one on the same directory,
    /// as a new process would.
    ///
    /// # Errors
    /// Returns an error if shutdown or reopening fails.
    pub fn restart(&mut self) -> Result<()> {
        self.obs.shutdown()?;
        self.obs = Observability::open(self.config.clone())?;
        tracing::debug!(root = %self.dir.path().display(), "harness restarted");
        Ok(())
    }

    /// Every machine-sink entry on disk: archives oldest first, then the
    /// active file.
    ///
    /// # Errors
    /// Returns an error if a file cannot be read or a line does not parse.
    pub fn machine_history(&self) -> Result<Vec<LogEntry>> {
        let log = self.obs.event_log();
        let mut files = log.archives();
        files.push(log.layout().machine_path());

        let mut entries = Vec::new();
        for path in files {
            let text = match fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            for line in text.lines().filter(|l| !l.trim().is_empty()) {
                entries.push(parse_log_entry(line)?);
            }
        }
        Ok(entries)
    }

    /// Lines of the active human-readable sink.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read.
    pub fn human_lines(&self) -> Result<Vec<String>> {
        match fs::read_to_string(self.obs.event_log().layout().human_path()) {
            Ok(text) => Ok(text.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Builder for [`ObservabilityHarness`].
#[derive(Debug, Clone)]
pub struct ObservabilityHarnessBuilder {
    config: ObservabilityConfig,
}

impl Default for ObservabilityHarnessBuilder {
    fn default() -> Self {
        Self {
            config: ObservabilityConfig::default().with_echo_to_tracing(false),
        }
    }
}

impl ObservabilityHarnessBuilder {
    /// Sets the log file base name.
    #[must_use]
    pub fn with_log_name(mut self, name: impl Into<String>) -> Self {
        self.config = self.config.with_log_name(name);
        self
    }

    /// Sets the rotation threshold.
    #[must_use]
    pub fn with_max_file_bytes(mut self, bytes: u64) -> Self {
        self.config = self.config.with_max_file_bytes(bytes);
        self
    }

    /// Sets how many archives are retained.
    #[must_use]
    pub fn with_max_archives(mut self, count: usize) -> Self {
        self.config = self.config.with_max_archives(count);
        self
    }

    /// Sets the diagnosis history capacity.
    #[must_use]
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.config = self.config.with_history_capacity(capacity);
        self
    }

    /// Sets the heartbeat interval.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config = self.config.with_heartbeat_interval(interval);
        self
    }

    /// Mirrors entries to `tracing` (off by default in the harness).
    #[must_use]
    pub fn with_echo_to_tracing(mut self, enabled: bool) -> Self {
        self.config = self.config.with_echo_to_tracing(enabled);
        self
    }

    /// Saves metric aggregates across [`ObservabilityHarness::restart`].
    #[must_use]
    pub fn with_persist_metrics(mut self, enabled: bool) -> Self {
        self.config = self.config.with_persist_metrics(enabled);
        self
    }

    /// Adds a configured diagnostic rule.
    #[must_use]
    pub fn with_rule(mut self, rule: RuleConfig) -> Self {
        self.config = self.config.with_rule(rule);
        self
    }

    /// Creates the temporary directory and opens the context in it.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created or the
    /// configuration is invalid.
    pub fn build(self) -> Result<ObservabilityHarness> {
        let dir = TempDir::new()?;
        let mut config = self.config;
        config.root = dir.path().to_path_buf();
        let obs = Observability::open(config.clone())?;
        Ok(ObservabilityHarness { dir, config, obs })
    }
}
