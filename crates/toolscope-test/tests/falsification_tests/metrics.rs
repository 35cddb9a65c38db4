//! Falsification Tests: Category A - Metrics (F001-F010)
//!
//! Claims about the per-operation aggregates kept by `MetricsCollector`.

use std::time::Duration;

use toolscope_core::{MetricsCollector, MetricsSummary, Outcome};
use toolscope_observe::{MachineRecord, Render, parse_machine_line, render_table};
use toolscope_test::{InstrumentLoadConfig, InstrumentLoadTester, ObservabilityHarness};

// =============================================================================
// F001-F004: Aggregation
// =============================================================================

/// F001: Three successful builds of 10, 20 and 30 ms average to 20 ms
///
/// # Falsification Attempt
/// Record the reference sequence and compare the summary exactly.
#[test]
fn f001_mean_of_reference_sequence() {
    let metrics = MetricsCollector::new();
    for ms in [10, 20, 30] {
        metrics.record("build", Duration::from_millis(ms), Outcome::Success);
    }

    let MetricsSummary::One(stat) = metrics.summary(Some("build")) else {
        panic!("F001 FALSIFIED: single-operation summary returned a map");
    };
    assert_eq!(stat.call_count, 3, "F001 FALSIFIED: call_count != 3");
    assert_eq!(stat.success_count, 3, "F001 FALSIFIED: success_count != 3");
    assert_eq!(
        stat.mean_duration,
        Duration::from_millis(20),
        "F001 FALSIFIED: mean is not 20ms"
    );
    assert_eq!(stat.min_duration, Duration::from_millis(10));
    assert_eq!(stat.max_duration, Duration::from_millis(30));
}

/// F002: An operation never recorded reads as an empty aggregate
///
/// # Falsification Attempt
/// Ask for an unknown operation and expect zero counts, not an error.
#[test]
fn f002_unknown_operation_is_empty() {
    let metrics = MetricsCollector::new();
    metrics.record("build", Duration::from_millis(5), Outcome::Success);

    let stat = metrics.stat("flash");
    assert_eq!(stat.operation, "flash");
    assert_eq!(stat.call_count, 0, "F002 FALSIFIED: phantom calls");
    assert!(stat.last_called_at.is_none(), "F002 FALSIFIED: phantom timestamp");
    assert_eq!(
        metrics.operation_count(),
        1,
        "F002 FALSIFIED: reading created an operation"
    );
}

/// F003: Success and failure counts always add up to the call count
///
/// # Falsification Attempt
/// Interleave outcomes and check the identity after every record.
#[test]
fn f003_outcome_counts_add_up() {
    let metrics = MetricsCollector::new();
    for i in 0..50u64 {
        let outcome = Outcome::from_success(i % 3 != 0);
        metrics.record("flash", Duration::from_millis(i + 1), outcome);
        let stat = metrics.stat("flash");
        assert_eq!(
            stat.success_count + stat.failure_count,
            stat.call_count,
            "F003 FALSIFIED: counts diverged at record {i}"
        );
        assert_eq!(stat.last_outcome, Some(outcome));
    }
    assert_eq!(metrics.stat("flash").failure_count, 17);
}

/// F004: The mean survives concurrent recording from many threads
///
/// # Falsification Attempt
/// Record from 8 threads at once and compare with the arithmetic mean.
#[test]
fn f004_concurrent_mean_within_tolerance() {
    let metrics = MetricsCollector::new();
    std::thread::scope(|scope| {
        for t in 0..8u64 {
            let metrics = &metrics;
            scope.spawn(move || {
                for i in 0..250u64 {
                    metrics.record(
                        "monitor",
                        Duration::from_micros(100 + (t * 250 + i) % 900),
                        Outcome::Success,
                    );
                }
            });
        }
    });

    let expected_us: f64 =
        (0..2000u64).map(|n| (100 + n % 900) as f64).sum::<f64>() / 2000.0;
    let stat = metrics.stat("monitor");
    assert_eq!(stat.call_count, 2000, "F004 FALSIFIED: lost records");
    let mean_us = stat.mean_duration.as_secs_f64() * 1_000_000.0;
    assert!(
        (mean_us - expected_us).abs() < 0.01,
        "F004 FALSIFIED: mean {mean_us}us != {expected_us}us"
    );
}

// =============================================================================
// F005-F006: Concurrent instrumentation
// =============================================================================

/// F005: Concurrent instrument calls on two operations never corrupt either
/// aggregate
///
/// # Falsification Attempt
/// Drive 16 workers across "build" and "flash" and compare the collector
/// with the issued tallies.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn f005_concurrent_instrument_counts_match() {
    let harness = ObservabilityHarness::new().unwrap();
    let config = InstrumentLoadConfig {
        workers: 16,
        calls_per_worker: 25,
        latency: Duration::from_micros(200),
        ..InstrumentLoadConfig::default()
    };
    let report = InstrumentLoadTester::new(config.clone())
        .run(harness.observability())
        .await
        .unwrap();

    assert_eq!(report.total_calls, config.total_calls());
    let metrics = harness.observability().metrics();
    assert_eq!(
        metrics.total_calls(),
        config.total_calls(),
        "F005 FALSIFIED: collector total differs from calls issued"
    );
    assert_eq!(metrics.operation_count(), 2);
    if let Err(e) = report.verify(harness.observability()) {
        panic!("F005 FALSIFIED: {e}");
    }
}

/// F006: Failures under load are diagnosed, not just counted
///
/// # Falsification Attempt
/// Every synthetic failure must leave a diagnosis in the history.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn f006_failures_under_load_are_diagnosed() {
    let harness = ObservabilityHarness::builder()
        .with_history_capacity(1000)
        .build()
        .unwrap();
    let report = InstrumentLoadTester::new(InstrumentLoadConfig::quick())
        .run(harness.observability())
        .await
        .unwrap();

    let history = harness.observability().error_history(Some(1000));
    assert_eq!(
        history.len() as u64,
        report.failed,
        "F006 FALSIFIED: diagnoses != failures"
    );
    assert!(
        history
            .iter()
            .all(|d| d.rule_name.as_deref() == Some("memory_overflow")),
        "F006 FALSIFIED: synthetic overflow misclassified"
    );
}

// =============================================================================
// F007-F010: Summaries and rendering
// =============================================================================

/// F007: The unfiltered summary covers every tracked operation
#[test]
fn f007_summary_all_covers_every_operation() {
    let metrics = MetricsCollector::new();
    for op in ["size", "build", "flash", "clean"] {
        metrics.record(op, Duration::from_millis(1), Outcome::Success);
    }
    let MetricsSummary::All(all) = metrics.summary(None) else {
        panic!("F007 FALSIFIED: unfiltered summary returned one aggregate");
    };
    let names: Vec<_> = all.keys().map(String::as_str).collect();
    assert_eq!(
        names,
        ["build", "clean", "flash", "size"],
        "F007 FALSIFIED: operations missing or unordered"
    );
}

/// F008: Aggregates survive the machine rendering unchanged
///
/// # Falsification Attempt
/// Render an aggregate with sub-millisecond durations and parse it back.
#[test]
fn f008_aggregate_machine_roundtrip() {
    let metrics = MetricsCollector::new();
    metrics.record("build", Duration::from_micros(12_345), Outcome::Success);
    metrics.record("build", Duration::from_micros(7_001), Outcome::Failure);
    let stat = metrics.stat("build");

    let line = stat.to_machine_line();
    match parse_machine_line(&line) {
        Ok(MachineRecord::Aggregate(parsed)) => {
            assert_eq!(parsed, stat, "F008 FALSIFIED: fields changed in transit");
        }
        other => panic!("F008 FALSIFIED: parsed as {other:?}"),
    }
}

/// F009: Bottlenecks are ranked slowest first
#[test]
fn f009_bottlenecks_slowest_first() {
    let metrics = MetricsCollector::new();
    metrics.record("size", Duration::from_millis(30), Outcome::Success);
    metrics.record("build", Duration::from_secs(40), Outcome::Success);
    metrics.record("flash", Duration::from_secs(9), Outcome::Success);

    let ranked: Vec<_> = metrics
        .bottlenecks(2)
        .into_iter()
        .map(|s| s.operation)
        .collect();
    assert_eq!(ranked, ["build", "flash"], "F009 FALSIFIED: wrong ranking");
}

/// F010: The human table lists every operation on its own row
#[test]
fn f010_table_has_row_per_operation() {
    let metrics = MetricsCollector::new();
    metrics.record("build", Duration::from_secs(1), Outcome::Success);
    metrics.record("flash", Duration::from_secs(2), Outcome::Failure);

    let table = render_table(&metrics.snapshot());
    let lines: Vec<_> = table.lines().collect();
    assert!(lines[0].starts_with("Operation"), "F010 FALSIFIED: no header");
    assert!(lines.iter().any(|l| l.starts_with("build")));
    assert!(lines.iter().any(|l| l.starts_with("flash")));
}
