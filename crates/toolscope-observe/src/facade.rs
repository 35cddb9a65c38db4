//! The observability context: one value that owns the event log, the
//! metrics collector, and the diagnostic engine, and wraps tool invocations
//! with all three.
//!
//! Build one [`Observability`] at the host's entry point and share it by
//! cloning; clones share state.

use std::future::Future;
use std::pin::pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use toolscope_core::{
    Context, ContextValue, InvocationRecord, LogEntry, LogLevel, MetricsCollector,
    MetricsSummary, ObservabilityConfig, Outcome, ReportOutcome,
};
use toolscope_diagnose::{Diagnosis, DiagnosticEngine, DiagnosticRule, RuleSummary};
use uuid::Uuid;

use crate::error::{InvocationTimeout, Result};
use crate::event_log::EventLog;
use crate::status::ObservabilityStatus;

/// Component name used for the context's own entries.
pub const SELF_COMPONENT: &str = "observability";

/// Default number of entries returned by [`Observability::logs_view`].
pub const DEFAULT_TAIL_COUNT: usize = 50;

/// Default number of diagnoses returned by [`Observability::error_history`].
pub const DEFAULT_HISTORY_COUNT: usize = 10;

/// Shared observability context.
#[derive(Debug, Clone)]
pub struct Observability {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: ObservabilityConfig,
    log: EventLog,
    metrics: MetricsCollector,
    diagnostics: DiagnosticEngine,
    started: Instant,
}

/// Why an invocation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ending {
    Returned,
    TimedOut,
    Cancelled,
}

/// How one invocation ended, as seen by the facade.
struct Completion<'a> {
    invocation_id: Uuid,
    elapsed: Duration,
    outcome: Outcome,
    error_text: Option<&'a str>,
    ending: Ending,
}

/// An invocation between its start entry and its terminal entry.
///
/// If the instrumenting future is dropped first (a caller's own timeout, an
/// aborted task), dropping this records the invocation as a cancelled
/// failure.
struct InFlight<'a> {
    obs: &'a Observability,
    operation: &'a str,
    invocation_id: Uuid,
    start: Instant,
    armed: bool,
}

impl InFlight<'_> {
    fn finish(
        mut self,
        outcome: Outcome,
        error_text: Option<&str>,
        ending: Ending,
    ) -> Option<Diagnosis> {
        self.armed = false;
        self.obs.complete(
            self.operation,
            &Completion {
                invocation_id: self.invocation_id,
                elapsed: self.start.elapsed(),
                outcome,
                error_text,
                ending,
            },
        )
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let message = format!(
            "operation '{}' was cancelled before it finished",
            self.operation
        );
        self.obs.complete(
            self.operation,
            &Completion {
                invocation_id: self.invocation_id,
                elapsed: self.start.elapsed(),
                outcome: Outcome::Failure,
                error_text: Some(&message),
                ending: Ending::Cancelled,
            },
        );
    }
}

impl Observability {
    /// Validates `config`, loads the rule table, opens the event log, and
    /// restores saved metric aggregates when `persist_metrics` is set.
    ///
    /// # Errors
    /// Returns an error if the configuration or a configured rule is invalid.
    /// An unwritable log directory is not an error; it shows up in
    /// [`Observability::status`]. An unreadable metrics file is logged and
    /// the collector starts empty.
    pub fn open(config: ObservabilityConfig) -> Result<Self> {
        config.validate()?;
        let diagnostics = DiagnosticEngine::from_config(config.history_capacity, &config.rules)?;
        let log = EventLog::from_config(&config);

        let metrics = MetricsCollector::new();
        let restored = if config.persist_metrics {
            let path = log.layout().metrics_path();
            metrics.load(&path).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "saved metrics ignored");
                0
            })
        } else {
            0
        };

        let obs = Self {
            inner: Arc::new(Inner {
                log,
                metrics,
                diagnostics,
                started: Instant::now(),
                config,
            }),
        };
        obs.inner.log.append(
            LogEntry::new(LogLevel::Info, SELF_COMPONENT, "observability started")
                .with("rules_loaded", obs.inner.diagnostics.rule_count())
                .with("operations_restored", restored)
                .with("log_dir", obs.inner.log.layout().log_dir.display().to_string()),
        );
        Ok(obs)
    }

    /// Appends an entry to the event log. Never fails.
    pub fn log(&self, level: LogLevel, component: &str, message: &str, context: Context) {
        self.inner.log.log(level, component, message, context);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Instrumentation
    // ═══════════════════════════════════════════════════════════════════════════

    /// Runs `invocation` under observation and returns its result unchanged.
    ///
    /// Logs a start entry, emits DEBUG heartbeats while it runs, records the
    /// duration and outcome, diagnoses failures, and logs a terminal entry.
    ///
    /// If the returned future is dropped before `invocation` finishes, the
    /// invocation is still recorded as a failure with a terminal entry.
    pub async fn instrument<F, R>(&self, operation: &str, invocation: F) -> R
    where
        F: Future<Output = R>,
        R: ReportOutcome,
    {
        let in_flight = self.start(operation, None);
        let result = self
            .with_heartbeats(operation, in_flight.invocation_id, invocation)
            .await;
        let error_text = result.error_text();
        in_flight.finish(result.outcome(), error_text.as_deref(), Ending::Returned);
        result
    }

    /// Like [`Observability::instrument`], but cancels `invocation` after
    /// `timeout`.
    ///
    /// A cancelled invocation is recorded as a failure, diagnosed with a
    /// synthesized timeout message, and logged with a terminal entry before
    /// [`InvocationTimeout`] is returned.
    pub async fn instrument_with_timeout<F, R>(
        &self,
        operation: &str,
        timeout: Duration,
        invocation: F,
    ) -> std::result::Result<R, InvocationTimeout>
    where
        F: Future<Output = R>,
        R: ReportOutcome,
    {
        let in_flight = self.start(operation, Some(timeout));
        let guarded = self.with_heartbeats(operation, in_flight.invocation_id, invocation);

        if let Ok(result) = tokio::time::timeout(timeout, guarded).await {
            let error_text = result.error_text();
            in_flight.finish(result.outcome(), error_text.as_deref(), Ending::Returned);
            Ok(result)
        } else {
            let err = InvocationTimeout {
                operation: operation.to_string(),
                timeout,
            };
            let message = err.to_string();
            in_flight.finish(Outcome::Failure, Some(message.as_str()), Ending::TimedOut);
            Err(err)
        }
    }

    /// Like [`Observability::instrument_with_timeout`], using the configured
    /// timeout for `operation`.
    pub async fn instrument_with_configured_timeout<F, R>(
        &self,
        operation: &str,
        invocation: F,
    ) -> std::result::Result<R, InvocationTimeout>
    where
        F: Future<Output = R>,
        R: ReportOutcome,
    {
        let timeout = self.inner.config.timeouts.for_operation(operation);
        self.instrument_with_timeout(operation, timeout, invocation)
            .await
    }

    /// Records an invocation that the caller timed itself.
    ///
    /// Returns the diagnosis when the invocation failed.
    pub fn observe(&self, record: &InvocationRecord) -> Option<Diagnosis> {
        self.complete(
            &record.operation,
            &Completion {
                invocation_id: Uuid::new_v4(),
                elapsed: record.duration(),
                outcome: record.outcome,
                error_text: record.error_text.as_deref(),
                ending: Ending::Returned,
            },
        )
    }

    fn start<'a>(&'a self, operation: &'a str, timeout: Option<Duration>) -> InFlight<'a> {
        let invocation_id = Uuid::new_v4();
        let mut entry = LogEntry::new(LogLevel::Info, operation, "operation started")
            .with("invocation_id", invocation_id.to_string());
        if let Some(timeout) = timeout {
            entry = entry.with("timeout", humantime::format_duration(timeout).to_string());
        }
        self.inner.log.append(entry);
        InFlight {
            obs: self,
            operation,
            invocation_id,
            start: Instant::now(),
            armed: true,
        }
    }

    async fn with_heartbeats<F: Future>(
        &self,
        operation: &str,
        invocation_id: Uuid,
        invocation: F,
    ) -> F::Output {
        let period = self.inner.config.heartbeat_interval;
        if period.is_zero() {
            return invocation.await;
        }

        let mut invocation = pin!(invocation);
        let start = Instant::now();
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                output = &mut invocation => return output,
                _ = ticker.tick() => {
                    self.inner.log.append(
                        LogEntry::new(LogLevel::Debug, operation, "operation still running")
                            .with("invocation_id", invocation_id.to_string())
                            .with("elapsed_ms", duration_ms(start.elapsed())),
                    );
                }
            }
        }
    }

    fn complete(&self, operation: &str, done: &Completion<'_>) -> Option<Diagnosis> {
        self.inner
            .metrics
            .record(operation, done.elapsed, done.outcome);

        let diagnosis = if done.outcome.is_success() {
            None
        } else {
            let fallback;
            let text = match done.error_text {
                Some(text) if !text.trim().is_empty() => text,
                _ => {
                    fallback = format!("operation '{operation}' failed without error output");
                    fallback.as_str()
                }
            };
            let diagnosis = self.inner.diagnostics.diagnose(text);
            self.inner.log.append(
                LogEntry::new(
                    diagnosis.severity.log_level(),
                    operation,
                    format!("{}: {}", diagnosis.matched_category, diagnosis.suggestion),
                )
                .with("invocation_id", done.invocation_id.to_string())
                .with("category", diagnosis.matched_category.as_str())
                .with("rule", diagnosis.rule_name.as_deref().unwrap_or("none"))
                .with("severity", diagnosis.severity.as_str())
                .with("error", diagnosis.raw_error_excerpt.as_str()),
            );
            Some(diagnosis)
        };

        let (level, message) = match (done.outcome, done.ending) {
            (Outcome::Success, _) => (LogLevel::Info, "operation completed"),
            (Outcome::Failure, Ending::TimedOut) => (LogLevel::Error, "operation timed out"),
            (Outcome::Failure, Ending::Cancelled) => (LogLevel::Error, "operation cancelled"),
            (Outcome::Failure, Ending::Returned) => (LogLevel::Error, "operation failed"),
        };
        let mut entry = LogEntry::new(level, operation, message)
            .with("invocation_id", done.invocation_id.to_string())
            .with("outcome", done.outcome.as_str())
            .with("duration_ms", duration_ms(done.elapsed));
        match done.ending {
            Ending::Returned => {}
            Ending::TimedOut => entry = entry.with("timed_out", true),
            Ending::Cancelled => entry = entry.with("cancelled", true),
        }
        self.inner.log.append(entry);
        diagnosis
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════════════════════

    /// Health signals for external health checks.
    #[must_use]
    pub fn status(&self) -> ObservabilityStatus {
        let inner = &self.inner;
        ObservabilityStatus {
            log_dir: inner.log.layout().log_dir.clone(),
            log_writable: inner.log.is_writable(),
            write_failures: inner.log.write_failures(),
            active_log_bytes: inner.log.active_size(),
            archive_count: inner.log.archives().len(),
            rules_loaded: inner.diagnostics.rule_count(),
            operations_tracked: inner.metrics.operation_count(),
            total_calls: inner.metrics.total_calls(),
            history_len: inner.diagnostics.history_len(),
            history_capacity: inner.diagnostics.capacity(),
            uptime: inner.started.elapsed(),
        }
    }

    /// One operation's aggregate (zeroed if unknown), or all of them.
    #[must_use]
    pub fn metrics_summary(&self, operation: Option<&str>) -> MetricsSummary {
        self.inner.metrics.summary(operation)
    }

    /// Most recent active-log entries of exactly `level`, oldest first.
    ///
    /// # Errors
    /// Returns an error if the active log cannot be read.
    pub fn logs_view(
        &self,
        level: Option<LogLevel>,
        tail_count: Option<usize>,
    ) -> Result<Vec<LogEntry>> {
        self.inner
            .log
            .tail(tail_count.unwrap_or(DEFAULT_TAIL_COUNT), level)
    }

    /// Most recent diagnoses, oldest first.
    #[must_use]
    pub fn error_history(&self, count: Option<usize>) -> Vec<Diagnosis> {
        self.inner
            .diagnostics
            .history(count.unwrap_or(DEFAULT_HISTORY_COUNT))
    }

    /// The latest diagnosis, if any.
    #[must_use]
    pub fn diagnose_last(&self) -> Option<Diagnosis> {
        self.inner.diagnostics.last()
    }

    /// Diagnoses arbitrary text (recorded in history).
    pub fn diagnose(&self, error_text: &str) -> Diagnosis {
        self.inner.diagnostics.diagnose(error_text)
    }

    /// Adds a diagnostic rule at runtime.
    ///
    /// # Errors
    /// Rejects duplicate names and positions past the end of the table.
    pub fn register_rule(&self, rule: DiagnosticRule, position: Option<usize>) -> Result<()> {
        self.inner.diagnostics.register_rule(rule, position)?;
        Ok(())
    }

    /// The rule table in match order, optionally only one category.
    #[must_use]
    pub fn rules(&self, category: Option<&str>) -> Vec<RuleSummary> {
        match category {
            Some(category) => self
                .inner
                .diagnostics
                .rules_by_category(category)
                .iter()
                .map(|r| r.summary())
                .collect(),
            None => self.inner.diagnostics.rules().iter().map(|r| r.summary()).collect(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Accessors / lifecycle
    // ═══════════════════════════════════════════════════════════════════════════

    /// The event log.
    #[must_use]
    pub fn event_log(&self) -> &EventLog {
        &self.inner.log
    }

    /// The metrics collector.
    #[must_use]
    pub fn metrics(&self) -> &MetricsCollector {
        &self.inner.metrics
    }

    /// The diagnostic engine.
    #[must_use]
    pub fn diagnostics(&self) -> &DiagnosticEngine {
        &self.inner.diagnostics
    }

    /// The configuration this context was opened with.
    #[must_use]
    pub fn config(&self) -> &ObservabilityConfig {
        &self.inner.config
    }

    /// Logs a final entry, syncs both sinks to disk, and saves the metric
    /// aggregates when `persist_metrics` is set.
    ///
    /// # Errors
    /// Returns the I/O error if syncing or saving fails.
    pub fn shutdown(&self) -> Result<()> {
        self.inner.log.append(
            LogEntry::new(LogLevel::Info, SELF_COMPONENT, "observability shutting down")
                .with("total_calls", self.inner.metrics.total_calls())
                .with("write_failures", self.inner.log.write_failures())
                .with(
                    "uptime",
                    humantime::format_duration(Duration::from_secs(
                        self.inner.started.elapsed().as_secs(),
                    ))
                    .to_string(),
                ),
        );
        self.inner.log.flush()?;
        if self.inner.config.persist_metrics {
            self.inner.metrics.save(&self.inner.log.layout().metrics_path())?;
        }
        Ok(())
    }
}

fn duration_ms(d: Duration) -> ContextValue {
    // Three decimals keep the human line short.
    ContextValue::from((d.as_secs_f64() * 1_000_000.0).round() / 1000.0)
}
