//! Per-operation call counters and running duration statistics.
//!
//! Each operation owns its own accumulator behind its own mutex, so recording
//! `build` never waits on a concurrent `flash`. The map of operations is a
//! read-mostly `RwLock`; the write lock is taken only to insert a new
//! operation.
//!
//! Durations are aggregated with Welford's online algorithm
//! (`mean += (x - mean) / n`), which stays numerically stable for
//! arbitrarily long call sequences.
//!
//! Aggregates (never individual records) can be saved to a JSON
//! [`MetricsSnapshot`] and folded back in on the next run.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::Outcome;

/// One consumed measurement. Never persisted individually.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricRecord {
    /// Operation name.
    pub operation: String,
    /// Wall-clock duration.
    pub duration: Duration,
    /// Reported outcome.
    pub outcome: Outcome,
}

impl MetricRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(operation: impl Into<String>, duration: Duration, outcome: Outcome) -> Self {
        Self {
            operation: operation.into(),
            duration,
            outcome,
        }
    }
}

/// Running statistics for one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateStat {
    /// Operation name.
    pub operation: String,
    /// Total calls recorded.
    pub call_count: u64,
    /// Successful calls.
    pub success_count: u64,
    /// Failed calls.
    pub failure_count: u64,
    /// Mean duration.
    #[serde(with = "humantime_serde")]
    pub mean_duration: Duration,
    /// Shortest recorded duration.
    #[serde(with = "humantime_serde")]
    pub min_duration: Duration,
    /// Longest recorded duration.
    #[serde(with = "humantime_serde")]
    pub max_duration: Duration,
    /// Population standard deviation of the durations.
    #[serde(with = "humantime_serde")]
    pub stddev_duration: Duration,
    /// When the last call was recorded.
    pub last_called_at: Option<DateTime<Utc>>,
    /// Outcome of the last call.
    pub last_outcome: Option<Outcome>,
}

impl AggregateStat {
    /// A zeroed aggregate for an operation that was never recorded.
    #[must_use]
    pub fn empty(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            call_count: 0,
            success_count: 0,
            failure_count: 0,
            mean_duration: Duration::ZERO,
            min_duration: Duration::ZERO,
            max_duration: Duration::ZERO,
            stddev_duration: Duration::ZERO,
            last_called_at: None,
            last_outcome: None,
        }
    }

    /// Success rate in `[0.0, 1.0]`; zero when nothing was recorded.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.call_count > 0 {
            self.success_count as f64 / self.call_count as f64
        } else {
            0.0
        }
    }
}

/// Result of [`MetricsCollector::summary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricsSummary {
    /// A single operation's aggregate.
    One(AggregateStat),
    /// Every known operation, keyed by name.
    All(BTreeMap<String, AggregateStat>),
}

/// Aggregates saved between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// When the snapshot was taken.
    pub saved_at: DateTime<Utc>,
    /// Aggregates keyed by operation.
    pub operations: BTreeMap<String, AggregateStat>,
}

/// Welford accumulator, durations in nanoseconds.
#[derive(Debug, Clone)]
struct Accumulator {
    call_count: u64,
    success_count: u64,
    mean_ns: f64,
    m2: f64,
    min: Duration,
    max: Duration,
    last_called_at: Option<DateTime<Utc>>,
    last_outcome: Option<Outcome>,
}

impl Accumulator {
    const fn new() -> Self {
        Self {
            call_count: 0,
            success_count: 0,
            mean_ns: 0.0,
            m2: 0.0,
            min: Duration::ZERO,
            max: Duration::ZERO,
            last_called_at: None,
            last_outcome: None,
        }
    }

    fn push(&mut self, duration: Duration, outcome: Outcome, at: DateTime<Utc>) {
        let x = duration.as_nanos() as f64;
        self.call_count += 1;
        if outcome.is_success() {
            self.success_count += 1;
        }

        let delta = x - self.mean_ns;
        self.mean_ns += delta / self.call_count as f64;
        self.m2 += delta * (x - self.mean_ns);

        if self.call_count == 1 {
            self.min = duration;
            self.max = duration;
        } else {
            self.min = self.min.min(duration);
            self.max = self.max.max(duration);
        }
        self.last_called_at = Some(at);
        self.last_outcome = Some(outcome);
    }

    fn from_stat(stat: &AggregateStat) -> Self {
        let n = stat.call_count as f64;
        let stddev_ns = stat.stddev_duration.as_nanos() as f64;
        Self {
            call_count: stat.call_count,
            success_count: stat.success_count.min(stat.call_count),
            mean_ns: stat.mean_duration.as_nanos() as f64,
            m2: stddev_ns * stddev_ns * n,
            min: stat.min_duration,
            max: stat.max_duration,
            last_called_at: stat.last_called_at,
            last_outcome: stat.last_outcome,
        }
    }

    /// Folds `other` in with the pairwise (Chan et al.) update.
    fn merge(&mut self, other: &Self) {
        if other.call_count == 0 {
            return;
        }
        if self.call_count == 0 {
            *self = other.clone();
            return;
        }
        let na = self.call_count as f64;
        let nb = other.call_count as f64;
        let n = na + nb;
        let delta = other.mean_ns - self.mean_ns;
        self.mean_ns += delta * nb / n;
        self.m2 += other.m2 + delta * delta * na * nb / n;
        self.call_count += other.call_count;
        self.success_count += other.success_count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        if other.last_called_at > self.last_called_at {
            self.last_called_at = other.last_called_at;
            self.last_outcome = other.last_outcome;
        }
    }

    fn to_stat(&self, operation: &str) -> AggregateStat {
        let variance = if self.call_count > 0 {
            (self.m2 / self.call_count as f64).max(0.0)
        } else {
            0.0
        };
        AggregateStat {
            operation: operation.to_string(),
            call_count: self.call_count,
            success_count: self.success_count,
            failure_count: self.call_count - self.success_count,
            mean_duration: nanos_to_duration(self.mean_ns),
            min_duration: self.min,
            max_duration: self.max,
            stddev_duration: nanos_to_duration(variance.sqrt()),
            last_called_at: self.last_called_at,
            last_outcome: self.last_outcome,
        }
    }
}

fn nanos_to_duration(nanos: f64) -> Duration {
    if nanos.is_finite() && nanos > 0.0 {
        Duration::from_nanos(nanos.round() as u64)
    } else {
        Duration::ZERO
    }
}

/// Thread-safe per-operation metrics.
///
/// Cloning is cheap and clones share the same aggregates.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    inner: Arc<CollectorInner>,
}

#[derive(Debug)]
struct CollectorInner {
    operations: RwLock<HashMap<String, Arc<Mutex<Accumulator>>>>,
    start_time: Instant,
}

impl MetricsCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CollectorInner {
                operations: RwLock::new(HashMap::new()),
                start_time: Instant::now(),
            }),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Recording
    // ═══════════════════════════════════════════════════════════════════════════

    /// Folds one measurement into the operation's aggregate.
    pub fn record(&self, operation: &str, duration: Duration, outcome: Outcome) {
        let slot = self.slot(operation);
        slot.lock().push(duration, outcome, Utc::now());
    }

    /// Folds a [`MetricRecord`] into its operation's aggregate.
    pub fn record_metric(&self, record: &MetricRecord) {
        self.record(&record.operation, record.duration, record.outcome);
    }

    fn slot(&self, operation: &str) -> Arc<Mutex<Accumulator>> {
        if let Some(slot) = self.inner.operations.read().get(operation) {
            return Arc::clone(slot);
        }
        let mut operations = self.inner.operations.write();
        Arc::clone(operations.entry(operation.to_string()).or_insert_with(|| {
            tracing::debug!(operation, "tracking new operation");
            Arc::new(Mutex::new(Accumulator::new()))
        }))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Reading
    // ═══════════════════════════════════════════════════════════════════════════

    /// Returns the aggregate for one operation, zeroed if it was never recorded.
    #[must_use]
    pub fn stat(&self, operation: &str) -> AggregateStat {
        let slot = self.inner.operations.read().get(operation).cloned();
        slot.map_or_else(
            || AggregateStat::empty(operation),
            |slot| slot.lock().to_stat(operation),
        )
    }

    /// Returns every known aggregate, keyed by operation name.
    ///
    /// Each aggregate is copied under its own lock, so it is internally
    /// consistent even while other tasks keep recording.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, AggregateStat> {
        let slots: Vec<(String, Arc<Mutex<Accumulator>>)> = self
            .inner
            .operations
            .read()
            .iter()
            .map(|(name, slot)| (name.clone(), Arc::clone(slot)))
            .collect();

        slots
            .into_iter()
            .map(|(name, slot)| {
                let stat = slot.lock().to_stat(&name);
                (name, stat)
            })
            .collect()
    }

    /// Returns one aggregate when `operation` is given, otherwise all of them.
    #[must_use]
    pub fn summary(&self, operation: Option<&str>) -> MetricsSummary {
        match operation {
            Some(op) => MetricsSummary::One(self.stat(op)),
            None => MetricsSummary::All(self.snapshot()),
        }
    }

    /// Number of distinct operations recorded.
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.inner.operations.read().len()
    }

    /// Total calls across all operations.
    #[must_use]
    pub fn total_calls(&self) -> u64 {
        self.snapshot().values().map(|s| s.call_count).sum()
    }

    /// Operations ranked by mean duration, slowest first.
    #[must_use]
    pub fn bottlenecks(&self, limit: usize) -> Vec<AggregateStat> {
        let mut stats: Vec<AggregateStat> = self.snapshot().into_values().collect();
        stats.sort_by(|a, b| {
            b.mean_duration
                .cmp(&a.mean_duration)
                .then_with(|| a.operation.cmp(&b.operation))
        });
        stats.truncate(limit);
        stats
    }

    /// Operations with at least one failure, most failures first.
    #[must_use]
    pub fn failures(&self) -> Vec<AggregateStat> {
        let mut stats: Vec<AggregateStat> = self
            .snapshot()
            .into_values()
            .filter(|s| s.failure_count > 0)
            .collect();
        stats.sort_by(|a, b| {
            b.failure_count
                .cmp(&a.failure_count)
                .then_with(|| a.operation.cmp(&b.operation))
        });
        stats
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Persistence
    // ═══════════════════════════════════════════════════════════════════════════

    /// Folds previously saved aggregates into this collector.
    ///
    /// Counts add up and means combine weighted by call count, so restoring
    /// into a collector that already recorded calls loses nothing.
    pub fn restore<I>(&self, stats: I)
    where
        I: IntoIterator<Item = AggregateStat>,
    {
        for stat in stats {
            let saved = Accumulator::from_stat(&stat);
            self.slot(&stat.operation).lock().merge(&saved);
        }
    }

    /// Takes a [`MetricsSnapshot`] of every aggregate.
    #[must_use]
    pub fn to_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            saved_at: Utc::now(),
            operations: self.snapshot(),
        }
    }

    /// Writes a snapshot to `path` as pretty JSON.
    ///
    /// The file is written beside `path` and renamed into place, so a reader
    /// never sees a partial snapshot.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.to_snapshot())?;
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, json)?;
        fs::rename(&staging, path)?;
        tracing::debug!(path = %path.display(), "metrics saved");
        Ok(())
    }

    /// Restores the snapshot at `path`, if there is one. Returns the number
    /// of operations restored.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(&self, path: &Path) -> Result<usize> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let snapshot: MetricsSnapshot = serde_json::from_str(&text)?;
        let restored = snapshot.operations.len();
        self.restore(snapshot.operations.into_values());
        tracing::debug!(path = %path.display(), restored, "metrics restored");
        Ok(restored)
    }

    /// Time since the collector was created.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.inner.start_time.elapsed()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
