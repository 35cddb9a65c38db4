//! Falsification Tests: Category E - Robustness (F061-F067)
//!
//! Claims about behaviour under hostile conditions: a broken log directory,
//! several writers on one directory, dropped invocations, restarts, and
//! large logs.

use std::fs;
use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;
use toolscope_core::{
    Context, ContextValue, HumanDuration, LogLayout, LogLevel, ObservabilityConfig, Outcome,
    ToolOutput,
};
use toolscope_observe::{EventLog, EventLogSettings, Observability, handle_query};
use toolscope_test::{ObservabilityHarness, ScriptedTool};

fn settings(root: &Path, max_file_bytes: u64) -> EventLogSettings {
    EventLogSettings {
        layout: LogLayout::new(root, "fw"),
        max_file_bytes,
        max_archives: 1000,
        echo_to_tracing: false,
    }
}

fn messages_on_disk(log: &EventLog) -> Vec<String> {
    let mut files = log.archives();
    files.push(log.layout().machine_path());
    files
        .iter()
        .filter_map(|p| fs::read_to_string(p).ok())
        .flat_map(|text| {
            text.lines()
                .filter(|l| !l.trim().is_empty())
                .map(|l| toolscope_observe::parse_log_entry(l).unwrap().message)
                .collect::<Vec<_>>()
        })
        .collect()
}

// =============================================================================
// F061-F064: Invocations
// =============================================================================

/// F061: A log that cannot be written never changes what the wrapped tool
/// returned, and metrics and diagnosis still happen
///
/// # Falsification Attempt
/// Block the log directory with a regular file, then instrument one failing
/// and one succeeding build.
#[tokio::test]
async fn f061_broken_log_leaves_results_untouched() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("logs"), b"blocked").unwrap();
    let obs = Observability::open(
        ObservabilityConfig::new(dir.path()).with_echo_to_tracing(false),
    )
    .unwrap();

    let failing = ToolOutput::failed(2, "region `dram0_0_seg' overflowed by 1024 bytes");
    let returned = obs
        .instrument("build", {
            let failing = failing.clone();
            async move { failing }
        })
        .await;
    assert_eq!(returned, failing, "F061 FALSIFIED: failing result altered");

    let succeeding = ToolOutput::ok("Project build complete.");
    let returned = obs
        .instrument("build", {
            let succeeding = succeeding.clone();
            async move { succeeding }
        })
        .await;
    assert_eq!(returned, succeeding, "F061 FALSIFIED: successful result altered");

    let stat = obs.metrics().stat("build");
    assert_eq!(stat.call_count, 2, "F061 FALSIFIED: calls not counted");
    assert_eq!(stat.success_count, 1);
    assert_eq!(stat.last_outcome, Some(Outcome::Success));

    let diagnosis = obs.diagnose_last().expect("F061 FALSIFIED: failure not diagnosed");
    assert_eq!(diagnosis.rule_name.as_deref(), Some("memory_overflow"));

    let status = obs.status();
    assert!(!status.log_writable, "F061 FALSIFIED: reported writable");
    assert!(status.write_failures > 0, "F061 FALSIFIED: failures not counted");
}

/// F062: An invocation dropped by its caller still ends as a failure with a
/// terminal entry
///
/// # Falsification Attempt
/// Wrap a 60 s invocation in the caller's own 1 s timeout.
#[tokio::test(start_paused = true)]
async fn f062_dropped_invocation_is_recorded() {
    let harness = ObservabilityHarness::new().unwrap();
    let tool = ScriptedTool::new("monitor").then_hang();

    let outer = tokio::time::timeout(Duration::from_secs(1), harness.run(&tool)).await;
    assert!(outer.is_err());

    let stat = harness.observability().metrics().stat("monitor");
    assert_eq!(stat.call_count, 1, "F062 FALSIFIED: call not counted");
    assert_eq!(stat.failure_count, 1, "F062 FALSIFIED: not a failure");

    let last = harness
        .machine_history()
        .unwrap()
        .into_iter()
        .rev()
        .find(|e| e.component == "monitor")
        .unwrap();
    assert_eq!(last.message, "operation cancelled", "F062 FALSIFIED");
    assert_eq!(last.context.get("cancelled"), Some(&ContextValue::Bool(true)));
}

/// F063: An exact per-operation timeout wins over the tool-prefix fallback
///
/// # Falsification Attempt
/// Configure `erase_flash = 5s` next to the default `flash = 10m` and run a
/// 30 s `erase_flash`.
#[tokio::test(start_paused = true)]
async fn f063_exact_timeout_entry_wins() {
    let dir = TempDir::new().unwrap();
    let mut config = ObservabilityConfig::new(dir.path()).with_echo_to_tracing(false);
    config
        .timeouts
        .operations
        .insert("erase_flash".into(), HumanDuration(Duration::from_secs(5)));
    let obs = Observability::open(config).unwrap();

    let err = obs
        .instrument_with_configured_timeout("erase_flash", async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            ToolOutput::ok("")
        })
        .await
        .unwrap_err();
    assert_eq!(
        err.timeout,
        Duration::from_secs(5),
        "F063 FALSIFIED: prefix fallback shadowed the exact entry"
    );
}

/// F064: The rules query lists the table in match order
#[test]
fn f064_rules_query_matches_table() {
    let harness = ObservabilityHarness::new().unwrap();
    let obs = harness.observability();
    let response: serde_json::Value =
        serde_json::from_str(&handle_query(obs, r#"{"query":"rules"}"#).unwrap()).unwrap();

    let names: Vec<&str> = response["rules"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|r| r["name"].as_str())
        .collect();
    let table: Vec<String> = obs
        .diagnostics()
        .rules()
        .iter()
        .map(|r| r.name().to_string())
        .collect();
    assert_eq!(names, table, "F064 FALSIFIED: order differs from the table");
}

// =============================================================================
// F065-F067: Lifecycle and shared directories
// =============================================================================

/// F065: Metric aggregates survive a restart
///
/// # Falsification Attempt
/// Record builds, restart on the same directory, record one more.
#[tokio::test]
async fn f065_metrics_survive_restart() {
    let mut harness = ObservabilityHarness::new().unwrap();
    for _ in 0..3 {
        harness.run(&ScriptedTool::new("build").then_succeed("")).await;
    }
    harness
        .run(&ScriptedTool::new("flash").then_fail(2, "Failed to connect to ESP32"))
        .await;

    harness.restart().unwrap();
    harness.run(&ScriptedTool::new("build").then_succeed("")).await;

    let metrics = harness.observability().metrics();
    assert_eq!(metrics.stat("build").call_count, 4, "F065 FALSIFIED: build lost");
    assert_eq!(metrics.stat("flash").failure_count, 1, "F065 FALSIFIED: flash lost");
}

/// F066: Two writers rotating one directory lose no entries
///
/// # Falsification Attempt
/// Two independent logs on the same directory, each writing 40 entries from
/// its own thread with a threshold small enough to rotate every few lines.
#[cfg(unix)]
#[test]
fn f066_two_writers_lose_nothing() {
    let dir = TempDir::new().unwrap();
    let handles: Vec<_> = ["a", "b"]
        .into_iter()
        .map(|name| {
            let log = EventLog::open(settings(dir.path(), 500));
            std::thread::spawn(move || {
                for i in 0..40 {
                    log.log(LogLevel::Info, "writer", &format!("{name}{i}"), Context::new());
                }
                log
            })
        })
        .collect();
    let logs: Vec<EventLog> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let mut on_disk = messages_on_disk(&logs[0]);
    assert_eq!(on_disk.len(), 80, "F066 FALSIFIED: {} of 80 on disk", on_disk.len());
    on_disk.sort();
    on_disk.dedup();
    assert_eq!(on_disk.len(), 80, "F066 FALSIFIED: duplicated entries");
}

/// F067: Tail of a multi-megabyte log returns the newest entries
#[test]
fn f067_tail_of_large_log() {
    let dir = TempDir::new().unwrap();
    let log = EventLog::open(settings(dir.path(), 64 << 20));
    let padding = "x".repeat(200);
    for i in 0..10_000 {
        log.log(LogLevel::Info, "writer", &format!("{i} {padding}"), Context::new());
    }
    log.log(LogLevel::Error, "writer", "final error", Context::new());
    assert!(log.active_size() > 2 << 20);

    let tail = log.tail(3, None).unwrap();
    let first: Vec<&str> = tail
        .iter()
        .map(|e| e.message.split(' ').next().unwrap_or_default())
        .collect();
    assert_eq!(first, ["9998", "9999", "final"], "F067 FALSIFIED");

    let errors = log.tail(5, Some(LogLevel::Error)).unwrap();
    assert_eq!(errors.len(), 1, "F067 FALSIFIED: level filter");
    assert_eq!(errors[0].message, "final error");
}
