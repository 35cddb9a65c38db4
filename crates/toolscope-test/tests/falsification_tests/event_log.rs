//! Falsification Tests: Category B - Event log (F011-F025)
//!
//! Claims about the dual-sink log: layout, rotation, retention, tail, and
//! behaviour when the log directory is unusable.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use toolscope_core::{Context, LogEntry, LogLayout, LogLevel, ObservabilityConfig};
use toolscope_observe::{EventLog, EventLogSettings, Observability, Render, parse_log_entry};
use toolscope_test::ObservabilityHarness;

const WRITER: &str = "writer";

fn settings(root: &Path, max_file_bytes: u64, max_archives: usize) -> EventLogSettings {
    EventLogSettings {
        layout: LogLayout::new(root, "fw"),
        max_file_bytes,
        max_archives,
        echo_to_tracing: false,
    }
}

fn sequence_of(path: &Path) -> u64 {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_suffix(".log"))
        .and_then(|n| n.rsplit('.').next())
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| panic!("not an archive name: {}", path.display()))
}

fn writer_messages(entries: &[LogEntry]) -> Vec<String> {
    entries
        .iter()
        .filter(|e| e.component == WRITER)
        .map(|e| e.message.clone())
        .collect()
}

// =============================================================================
// F011-F012: Layout
// =============================================================================

/// F011: Opening creates both active sinks under `<root>/logs`
#[test]
fn f011_layout_is_created() {
    let harness = ObservabilityHarness::new().unwrap();
    let logs = harness.root().join("logs");
    assert!(
        logs.join("toolscope.log").is_file(),
        "F011 FALSIFIED: human sink missing"
    );
    assert!(
        logs.join("structured").join("toolscope.jsonl").is_file(),
        "F011 FALSIFIED: machine sink missing"
    );
}

/// F012: Every entry lands in both sinks
#[test]
fn f012_entry_in_both_sinks() {
    let harness = ObservabilityHarness::new().unwrap();
    harness.observability().log(
        LogLevel::Error,
        "flash",
        "write failed at 0x10000",
        Context::new(),
    );

    let human = harness.human_lines().unwrap();
    let machine = harness.machine_history().unwrap();
    assert_eq!(human.len(), machine.len(), "F012 FALSIFIED: sinks diverged");
    assert!(human.last().unwrap().contains("ERROR flash: write failed at 0x10000"));
    assert_eq!(machine.last().unwrap().message, "write failed at 0x10000");
}

// =============================================================================
// F013-F018: Rotation
// =============================================================================

/// F013: At a 1 KiB threshold, 500 small entries rotate and tail still
/// returns the most recent entries of the active file
#[test]
fn f013_rotation_keeps_tail_recent() {
    let harness = ObservabilityHarness::builder()
        .with_max_file_bytes(1024)
        .with_max_archives(1000)
        .build()
        .unwrap();
    let obs = harness.observability();
    for i in 0..500 {
        obs.log(LogLevel::Info, WRITER, &format!("e{i:04}"), Context::new());
    }

    assert!(
        !obs.event_log().archives().is_empty(),
        "F013 FALSIFIED: no archive after 500 entries at 1 KiB"
    );

    let active = fs::read_to_string(obs.event_log().layout().machine_path()).unwrap();
    let active_count = active.lines().count();
    let tail = obs.event_log().tail(10, None).unwrap();
    assert_eq!(tail.len(), active_count.min(10), "F013 FALSIFIED: tail length");

    let expected: Vec<String> = (500 - tail.len()..500).map(|i| format!("e{i:04}")).collect();
    assert_eq!(
        writer_messages(&tail),
        expected,
        "F013 FALSIFIED: tail is not the most recent entries"
    );
}

/// F014: Archives plus the active file reproduce the write sequence
///
/// # Falsification Attempt
/// Rotate dozens of times and look for a lost, duplicated, or reordered
/// entry.
#[test]
fn f014_rotation_loses_nothing() {
    let harness = ObservabilityHarness::builder()
        .with_max_file_bytes(2048)
        .with_max_archives(1000)
        .build()
        .unwrap();
    for i in 0..800 {
        harness.observability().log(
            LogLevel::Debug,
            WRITER,
            &format!("line {i}"),
            Context::new(),
        );
    }

    let expected: Vec<String> = (0..800).map(|i| format!("line {i}")).collect();
    assert_eq!(
        writer_messages(&harness.machine_history().unwrap()),
        expected,
        "F014 FALSIFIED: reconstruction differs from writes"
    );
}

/// F015: Each threshold crossing produces exactly one new archive
#[test]
fn f015_one_archive_per_crossing() {
    let dir = TempDir::new().unwrap();
    let log = EventLog::open(settings(dir.path(), 600, 1000));

    let mut crossings = 0;
    for i in 0..200 {
        let before = log.archives().len();
        log.log(LogLevel::Info, WRITER, &format!("n{i}"), Context::new());
        // A write that crosses the threshold leaves a fresh, empty active file.
        let rotated = log.active_size() == 0;
        crossings += usize::from(rotated);
        assert_eq!(
            log.archives().len(),
            before + usize::from(rotated),
            "F015 FALSIFIED: archive count wrong after write {i}"
        );
        assert!(
            log.active_size() < 600,
            "F015 FALSIFIED: active file left above threshold"
        );
    }
    assert!(crossings > 0);
    assert_eq!(log.archives().len(), crossings);
}

/// F016: Archive sequence numbers strictly increase
#[test]
fn f016_archive_sequences_increase() {
    let dir = TempDir::new().unwrap();
    let log = EventLog::open(settings(dir.path(), 256, 1000));
    for i in 0..100 {
        log.log(LogLevel::Info, WRITER, &format!("s{i}"), Context::new());
    }

    let sequences: Vec<u64> = log.archives().iter().map(|p| sequence_of(p)).collect();
    assert!(sequences.len() > 1);
    assert!(
        sequences.windows(2).all(|w| w[0] < w[1]),
        "F016 FALSIFIED: sequences {sequences:?}"
    );
    assert_eq!(sequences[0], 1, "F016 FALSIFIED: first archive is not 1");
}

/// F017: Retention keeps only the newest archives of each family
#[test]
fn f017_retention_bounds_archives() {
    let dir = TempDir::new().unwrap();
    let log = EventLog::open(settings(dir.path(), 256, 3));
    for i in 0..200 {
        log.log(LogLevel::Info, WRITER, &format!("r{i}"), Context::new());
    }

    let archives: Vec<PathBuf> = log.archives();
    assert_eq!(archives.len(), 3, "F017 FALSIFIED: machine archives");
    assert_eq!(log.human_archives().len(), 3, "F017 FALSIFIED: human archives");

    let sequences: Vec<u64> = archives.iter().map(|p| sequence_of(p)).collect();
    let newest = sequences[2];
    assert_eq!(sequences, [newest - 2, newest - 1, newest]);
}

/// F018: Archive numbering continues after a restart
#[test]
fn f018_sequence_survives_restart() {
    let mut harness = ObservabilityHarness::builder()
        .with_max_file_bytes(512)
        .with_max_archives(100)
        .build()
        .unwrap();
    for i in 0..40 {
        harness
            .observability()
            .log(LogLevel::Info, WRITER, &format!("a{i}"), Context::new());
    }
    let before = harness.observability().event_log().archives();
    let last_before = sequence_of(before.last().unwrap());

    harness.restart().unwrap();
    for i in 0..40 {
        harness
            .observability()
            .log(LogLevel::Info, WRITER, &format!("b{i}"), Context::new());
    }
    let after = harness.observability().event_log().archives();
    let first_new = after
        .iter()
        .map(|p| sequence_of(p))
        .find(|s| *s > last_before);
    assert_eq!(
        first_new,
        Some(last_before + 1),
        "F018 FALSIFIED: restart reused or skipped sequence numbers"
    );
}

// =============================================================================
// F019-F021: Tail
// =============================================================================

/// F019: tail(n) never returns more than n entries, oldest first
#[test]
fn f019_tail_bounds() {
    let dir = TempDir::new().unwrap();
    let log = EventLog::open(settings(dir.path(), 1 << 20, 5));
    for i in 0..30 {
        log.log(LogLevel::Info, WRITER, &format!("t{i:02}"), Context::new());
    }

    for n in [0, 1, 7, 30, 31, 500] {
        let tail = log.tail(n, None).unwrap();
        assert_eq!(tail.len(), n.min(30), "F019 FALSIFIED: tail({n}) length");
        let expected: Vec<String> = (30 - tail.len()..30).map(|i| format!("t{i:02}")).collect();
        assert_eq!(writer_messages(&tail), expected, "F019 FALSIFIED: tail({n})");
    }
}

/// F020: A level filter returns only entries of exactly that level
#[test]
fn f020_tail_level_filter_is_exact() {
    let dir = TempDir::new().unwrap();
    let log = EventLog::open(settings(dir.path(), 1 << 20, 5));
    for (i, level) in LogLevel::ALL.iter().cycle().take(40).enumerate() {
        log.log(*level, WRITER, &format!("{level} {i}"), Context::new());
    }

    let warnings = log.tail(100, Some(LogLevel::Warning)).unwrap();
    assert_eq!(warnings.len(), 10);
    assert!(
        warnings.iter().all(|e| e.level == LogLevel::Warning),
        "F020 FALSIFIED: other levels leaked through"
    );
    assert_eq!(warnings.last().unwrap().message, "WARNING 38");
}

/// F021: Tail on an empty project is empty, not an error
#[test]
fn f021_tail_without_file() {
    let dir = TempDir::new().unwrap();
    let log = EventLog::open(settings(dir.path(), 1024, 5));
    fs::remove_file(log.layout().machine_path()).unwrap();
    assert!(log.tail(10, None).unwrap().is_empty(), "F021 FALSIFIED");
}

// =============================================================================
// F022-F025: Records and failure handling
// =============================================================================

/// F022: A log entry survives the machine rendering unchanged
#[test]
fn f022_log_entry_machine_roundtrip() {
    let entry = LogEntry::new(LogLevel::Warning, "monitor", "brownout detector was triggered")
        .with("port", "/dev/ttyUSB0")
        .with("baud", 115_200)
        .with("elapsed_ms", 1234.5)
        .with("reset", true);

    let parsed = parse_log_entry(&entry.to_machine_line()).unwrap();
    assert_eq!(parsed, entry, "F022 FALSIFIED: fields changed in transit");
}

/// F023: Control characters never reach the files
#[test]
fn f023_control_characters_are_stripped() {
    let harness = ObservabilityHarness::new().unwrap();
    harness.observability().log(
        LogLevel::Error,
        "build",
        "\u{1b}[31merror:\u{1b}[0m undefined\u{7}",
        Context::new(),
    );

    let last = harness.machine_history().unwrap().pop().unwrap();
    assert_eq!(last.message, "[31merror:[0m undefined");
    assert!(
        harness.human_lines().unwrap().iter().all(|l| !l.contains('\u{1b}')),
        "F023 FALSIFIED: escape byte in human sink"
    );
}

/// F024: An unusable log directory degrades status instead of failing
///
/// # Falsification Attempt
/// Put a regular file where the log directory belongs, then open and log.
#[test]
fn f024_unwritable_directory_degrades() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("logs"), b"blocked").unwrap();

    let obs = Observability::open(
        ObservabilityConfig::new(dir.path()).with_echo_to_tracing(false),
    )
    .unwrap();
    obs.log(LogLevel::Info, "build", "dropped", Context::new());

    let status = obs.status();
    assert!(!status.log_writable, "F024 FALSIFIED: reported writable");
    assert!(status.write_failures >= 2, "F024 FALSIFIED: failures not counted");
    assert!(!status.is_healthy());
    assert!(obs.logs_view(None, None).unwrap().is_empty());
}

/// F025: Both sinks rotate together
#[test]
fn f025_sinks_rotate_together() {
    let dir = TempDir::new().unwrap();
    let log = EventLog::open(settings(dir.path(), 300, 50));
    for i in 0..120 {
        log.log(LogLevel::Info, WRITER, &format!("p{i}"), Context::new());
        assert_eq!(
            log.archives().len(),
            log.human_archives().len(),
            "F025 FALSIFIED: families diverged at {i}"
        );
    }
}
