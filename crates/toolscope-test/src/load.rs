//! Load testing for the instrumentation facade.
//!
//! Concurrent workers drive [`Observability::instrument`] across a set of
//! operation names. Each worker tallies what it issued, and
//! [`InstrumentLoadReport::verify`] checks the collector's aggregates
//! against those tallies.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use toolscope_core::ToolOutput;
use toolscope_observe::Observability;

use crate::error::{Result, TestError};

/// Stderr of the synthetic failing invocation.
pub const SYNTHETIC_FAILURE: &str = "region `dram0_0_seg' overflowed by 64 bytes";

/// Load test configuration.
#[derive(Debug, Clone)]
pub struct InstrumentLoadConfig {
    /// Operation names, assigned round-robin.
    pub operations: Vec<String>,
    /// Number of concurrent workers.
    pub workers: u32,
    /// Invocations per worker.
    pub calls_per_worker: u32,
    /// Every n-th call of a worker fails (`None` for no failures).
    pub failure_every: Option<u32>,
    /// Simulated latency of each invocation.
    pub latency: Duration,
}

impl Default for InstrumentLoadConfig {
    fn default() -> Self {
        Self {
            operations: vec!["build".into(), "flash".into()],
            workers: 8,
            calls_per_worker: 50,
            failure_every: Some(10),
            latency: Duration::from_millis(1),
        }
    }
}

impl InstrumentLoadConfig {
    /// A short run for unit tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            workers: 4,
            calls_per_worker: 10,
            latency: Duration::ZERO,
            ..Default::default()
        }
    }

    /// Replaces the operation names.
    #[must_use]
    pub fn with_operations<I, S>(mut self, operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.operations = operations.into_iter().map(Into::into).collect();
        self
    }

    /// Total invocations the run will issue.
    #[must_use]
    pub fn total_calls(&self) -> u64 {
        u64::from(self.workers) * u64::from(self.calls_per_worker)
    }
}

/// Issued-call tallies for one operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationTally {
    /// Invocations issued.
    pub calls: u64,
    /// Invocations that reported failure.
    pub failures: u64,
}

impl OperationTally {
    fn merge(&mut self, other: Self) {
        self.calls += other.calls;
        self.failures += other.failures;
    }
}

/// Load tester for an [`Observability`] context.
#[derive(Debug, Clone)]
pub struct InstrumentLoadTester {
    config: InstrumentLoadConfig,
}

impl InstrumentLoadTester {
    /// Creates a new load tester.
    #[must_use]
    pub const fn new(config: InstrumentLoadConfig) -> Self {
        Self { config }
    }

    /// Runs all workers to completion.
    ///
    /// # Errors
    /// Returns an error if no operations are configured or a worker task
    /// fails to join.
    pub async fn run(&self, obs: &Observability) -> Result<InstrumentLoadReport> {
        if self.config.operations.is_empty() {
            return Err(TestError::LoadTest("no operations configured".into()));
        }
        tracing::info!(
            workers = self.config.workers,
            calls_per_worker = self.config.calls_per_worker,
            operations = ?self.config.operations,
            "starting instrument load test"
        );

        let start = Instant::now();
        let mut handles = Vec::with_capacity(self.config.workers as usize);
        for worker in 0..self.config.workers {
            let obs = obs.clone();
            let config = self.config.clone();
            handles.push(tokio::spawn(async move {
                run_worker(&obs, &config, worker).await
            }));
        }

        let mut per_operation: BTreeMap<String, OperationTally> = BTreeMap::new();
        let mut latencies_us = Vec::new();
        for handle in handles {
            let tally = handle
                .await
                .map_err(|e| TestError::LoadTest(format!("worker failed: {e}")))?;
            for (operation, counts) in tally.per_operation {
                per_operation.entry(operation).or_default().merge(counts);
            }
            latencies_us.extend(tally.latencies_us);
        }
        let elapsed = start.elapsed();
        latencies_us.sort_unstable();

        let total_calls: u64 = per_operation.values().map(|t| t.calls).sum();
        let failed: u64 = per_operation.values().map(|t| t.failures).sum();
        let report = InstrumentLoadReport {
            total_calls,
            failed,
            per_operation,
            latency_p50_us: percentile(&latencies_us, 50),
            latency_p99_us: percentile(&latencies_us, 99),
            throughput_cps: if elapsed.as_secs_f64() > 0.0 {
                total_calls as f64 / elapsed.as_secs_f64()
            } else {
                0.0
            },
        };

        tracing::info!(
            total = report.total_calls,
            failed = report.failed,
            p50_us = report.latency_p50_us,
            p99_us = report.latency_p99_us,
            throughput_cps = format!("{:.2}", report.throughput_cps),
            "instrument load test completed"
        );
        Ok(report)
    }

    /// Returns the test config.
    #[must_use]
    pub const fn config(&self) -> &InstrumentLoadConfig {
        &self.config
    }
}

impl Default for InstrumentLoadTester {
    fn default() -> Self {
        Self::new(InstrumentLoadConfig::default())
    }
}

#[derive(Default)]
struct WorkerTally {
    per_operation: BTreeMap<String, OperationTally>,
    latencies_us: Vec<u64>,
}

async fn run_worker(
    obs: &Observability,
    config: &InstrumentLoadConfig,
    worker: u32,
) -> WorkerTally {
    let mut tally = WorkerTally::default();
    let latency = config.latency;
    for call in 0..config.calls_per_worker {
        let index = (worker as usize + call as usize) % config.operations.len();
        let Some(operation) = config.operations.get(index) else {
            continue;
        };
        let fail = config
            .failure_every
            .is_some_and(|n| n > 0 && (call + 1) % n == 0);

        let started = Instant::now();
        let output = obs
            .instrument(operation, async move {
                if !latency.is_zero() {
                    tokio::time::sleep(latency).await;
                }
                if fail {
                    ToolOutput::failed(1, SYNTHETIC_FAILURE)
                } else {
                    ToolOutput::ok("")
                }
            })
            .await;
        tally
            .latencies_us
            .push(started.elapsed().as_micros() as u64);

        let counts = tally.per_operation.entry(operation.clone()).or_default();
        counts.calls += 1;
        if !output.success() {
            counts.failures += 1;
        }
    }
    tally
}

/// Computes percentile from sorted slice.
fn percentile(sorted: &[u64], p: usize) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let idx = (sorted.len() * p / 100).min(sorted.len() - 1);
    sorted.get(idx).copied().unwrap_or(0)
}

/// Load test report.
#[derive(Debug, Clone)]
pub struct InstrumentLoadReport {
    /// Total invocations issued.
    pub total_calls: u64,
    /// Invocations that failed.
    pub failed: u64,
    /// Issued tallies per operation.
    pub per_operation: BTreeMap<String, OperationTally>,
    /// P50 instrumented latency in microseconds.
    pub latency_p50_us: u64,
    /// P99 instrumented latency in microseconds.
    pub latency_p99_us: u64,
    /// Throughput in calls per second.
    pub throughput_cps: f64,
}

impl InstrumentLoadReport {
    /// Checks that every operation's aggregate matches what was issued.
    ///
    /// # Errors
    /// Returns [`TestError::Assertion`] naming the first mismatch.
    pub fn verify(&self, obs: &Observability) -> Result<()> {
        for (operation, issued) in &self.per_operation {
            let stat = obs.metrics().stat(operation);
            if stat.call_count != issued.calls {
                return Err(TestError::assertion(format!(
                    "{operation}: issued {} calls, collector counted {}",
                    issued.calls, stat.call_count
                )));
            }
            if stat.failure_count != issued.failures {
                return Err(TestError::assertion(format!(
                    "{operation}: issued {} failures, collector counted {}",
                    issued.failures, stat.failure_count
                )));
            }
            if stat.success_count + stat.failure_count != stat.call_count {
                return Err(TestError::assertion(format!(
                    "{operation}: success + failure != call_count"
                )));
            }
        }
        Ok(())
    }

    /// Fraction of calls that succeeded (0.0 to 1.0).
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total_calls > 0 {
            (self.total_calls - self.failed) as f64 / self.total_calls as f64
        } else {
            0.0
        }
    }
}
