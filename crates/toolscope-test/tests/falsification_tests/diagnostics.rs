//! Falsification Tests: Category C - Diagnostics (F026-F040)
//!
//! Claims about rule matching, rule registration, and the bounded history.

use std::sync::Arc;

use toolscope_core::{RuleConfig, Severity};
use toolscope_diagnose::{
    DiagnoseError, DiagnosticEngine, DiagnosticRule, EXCERPT_MAX_CHARS, TIMEOUT_CATEGORY,
    UNKNOWN_CATEGORY,
};
use toolscope_observe::{MachineRecord, Render, parse_machine_line};

fn builtin(capacity: usize) -> DiagnosticEngine {
    DiagnosticEngine::with_builtin(capacity).unwrap()
}

// =============================================================================
// F026-F031: Classification
// =============================================================================

/// F026: A connection failure mentioning a timeout is a hardware problem
///
/// # Falsification Attempt
/// The text also contains "Timeout"; rule order must still pick the
/// hardware rule.
#[test]
fn f026_connection_failure_is_hardware() {
    let engine = builtin(10);
    let diagnosis = engine.diagnose("Failed to connect to device: Timeout");

    assert_eq!(
        diagnosis.matched_category, "hardware",
        "F026 FALSIFIED: category {}",
        diagnosis.matched_category
    );
    assert!(
        diagnosis.suggestion.to_lowercase().contains("physical"),
        "F026 FALSIFIED: suggestion does not mention the physical connection"
    );
    assert_eq!(diagnosis.severity, Severity::Critical);
}

/// F027: Unmatched text is diagnosed as unknown and still recorded
#[test]
fn f027_unmatched_text_is_unknown_and_recorded() {
    let engine = builtin(10);
    let diagnosis = engine.diagnose("the quick brown fox");

    assert_eq!(diagnosis.matched_category, UNKNOWN_CATEGORY);
    assert!(diagnosis.is_unknown(), "F027 FALSIFIED: fallback named a rule");
    assert_eq!(
        engine.history_len(),
        1,
        "F027 FALSIFIED: unknown diagnosis not recorded"
    );
    assert_eq!(engine.last().unwrap(), diagnosis);
}

/// F028: Diagnosis is deterministic for the same text and table
#[test]
fn f028_diagnosis_is_deterministic() {
    let engine = builtin(100);
    let texts = [
        "region `iram0_0_seg' overflowed by 42 bytes",
        "Failed to connect to ESP32: Wrong boot mode detected",
        "nothing to see here",
        "",
    ];
    for text in texts {
        let a = engine.diagnose(text);
        let b = engine.diagnose(text);
        assert_eq!(
            (a.matched_category, a.rule_name, a.suggestion),
            (b.matched_category, b.rule_name, b.suggestion),
            "F028 FALSIFIED: differing results for {text:?}"
        );
    }
}

/// F029: Matching ignores case
#[test]
fn f029_matching_ignores_case() {
    let engine = builtin(10);
    let lower = engine.diagnose("failed to connect to esp32");
    let upper = engine.diagnose("FAILED TO CONNECT TO ESP32");
    assert_eq!(lower.rule_name, upper.rule_name, "F029 FALSIFIED");
    assert_eq!(lower.rule_name.as_deref(), Some("device_connection_failed"));
}

/// F030: Synthesized timeout messages land in the timeout category
#[test]
fn f030_timeout_message_category() {
    let engine = builtin(10);
    let diagnosis = engine.diagnose("operation 'monitor' timed out after 20m");
    assert_eq!(diagnosis.matched_category, TIMEOUT_CATEGORY, "F030 FALSIFIED");
}

/// F031: The excerpt is bounded
#[test]
fn f031_excerpt_is_bounded() {
    let engine = builtin(10);
    let long = "é".repeat(EXCERPT_MAX_CHARS * 3);
    let diagnosis = engine.diagnose(&long);
    assert_eq!(
        diagnosis.raw_error_excerpt.chars().count(),
        EXCERPT_MAX_CHARS,
        "F031 FALSIFIED: excerpt not truncated on a char boundary"
    );
}

// =============================================================================
// F032-F036: Rule registration
// =============================================================================

/// F032: Only rule order decides between overlapping rules
///
/// # Falsification Attempt
/// Register two rules that both match, then swap their order.
#[test]
fn f032_rule_order_decides_overlap() {
    let first = || DiagnosticRule::new("a", "alpha", Severity::Warning, "a").substring("boom");
    let second = || DiagnosticRule::new("b", "beta", Severity::Warning, "b").substring("boom");

    let engine = DiagnosticEngine::new(10);
    engine.register_rule(first(), None).unwrap();
    engine.register_rule(second(), None).unwrap();
    assert_eq!(engine.diagnose("boom").matched_category, "alpha");

    let swapped = DiagnosticEngine::new(10);
    swapped.register_rule(second(), None).unwrap();
    swapped.register_rule(first(), None).unwrap();
    assert_eq!(
        swapped.diagnose("boom").matched_category,
        "beta",
        "F032 FALSIFIED: order did not decide"
    );
}

/// F033: A rule registered at position 0 overrides the built-ins
#[test]
fn f033_priority_registration_overrides_builtin() {
    let engine = builtin(10);
    let before = engine.rule_count();
    engine
        .register_rule(
            DiagnosticRule::new(
                "lab_usb_hub",
                "lab",
                Severity::Info,
                "Power-cycle the lab USB hub",
            )
            .pattern(r"failed to connect")
            .unwrap(),
            Some(0),
        )
        .unwrap();

    assert_eq!(engine.rule_count(), before + 1);
    assert_eq!(
        engine.diagnose("Failed to connect to ESP32").matched_category,
        "lab",
        "F033 FALSIFIED: priority rule not consulted first"
    );
    assert_eq!(engine.rules()[1].name(), "toolchain_env_missing");
}

/// F034: Invalid registrations leave the table unchanged
#[test]
fn f034_invalid_registration_rejected() {
    let engine = builtin(10);
    let before = engine.rules();

    let empty = DiagnosticRule::new("empty", "x", Severity::Info, "x");
    assert!(matches!(
        engine.register_rule(empty, None),
        Err(DiagnoseError::EmptyRule(_))
    ));

    let duplicate =
        DiagnosticRule::new("compile_error", "x", Severity::Info, "x").substring("x");
    assert!(matches!(
        engine.register_rule(duplicate, None),
        Err(DiagnoseError::DuplicateRule(_))
    ));

    let far = DiagnosticRule::new("far", "x", Severity::Info, "x").substring("x");
    assert!(matches!(
        engine.register_rule(far, Some(999)),
        Err(DiagnoseError::InvalidPosition { position: 999, .. })
    ));

    assert!(
        Arc::ptr_eq(&before, &engine.rules()),
        "F034 FALSIFIED: table replaced by a failed registration"
    );
}

/// F035: Invalid regex patterns are rejected when the rule is built
#[test]
fn f035_invalid_pattern_rejected() {
    let result = DiagnosticRule::new("bad", "x", Severity::Info, "x").pattern("(unclosed");
    assert!(
        matches!(result, Err(DiagnoseError::InvalidPattern { .. })),
        "F035 FALSIFIED: bad regex accepted"
    );
}

/// F036: Configured rules are placed where their position says
#[test]
fn f036_configured_rule_position() {
    let rule = RuleConfig {
        name: "custom_partition".into(),
        category: "partition".into(),
        severity: Severity::Warning,
        suggestion: "Regenerate partitions.csv".into(),
        patterns: vec![r"partition table .* invalid".into()],
        substrings: Vec::new(),
        position: Some(0),
    };
    let engine = DiagnosticEngine::from_config(10, &[rule]).unwrap();
    assert_eq!(engine.rules()[0].name(), "custom_partition", "F036 FALSIFIED");
    assert_eq!(
        engine
            .diagnose("Partition table binary is invalid")
            .matched_category,
        "partition"
    );
}

// =============================================================================
// F037-F040: History
// =============================================================================

/// F037: History never exceeds its capacity and evicts the oldest
///
/// # Falsification Attempt
/// Diagnose K+1 texts and check that exactly the first one is gone.
#[test]
fn f037_history_evicts_oldest() {
    const K: usize = 5;
    let engine = builtin(K);
    for i in 0..=K {
        engine.diagnose(&format!("mystery failure #{i}"));
        assert!(engine.history_len() <= K, "F037 FALSIFIED: over capacity");
    }

    let excerpts: Vec<String> = engine
        .history(K)
        .into_iter()
        .map(|d| d.raw_error_excerpt)
        .collect();
    let expected: Vec<String> = (1..=K).map(|i| format!("mystery failure #{i}")).collect();
    assert_eq!(excerpts, expected, "F037 FALSIFIED: wrong survivors or order");
}

/// F038: history(count) returns the most recent, oldest first
#[test]
fn f038_history_count_is_most_recent() {
    let engine = builtin(100);
    for i in 0..20 {
        engine.diagnose(&format!("e{i}"));
    }
    let last_three: Vec<String> = engine
        .history(3)
        .into_iter()
        .map(|d| d.raw_error_excerpt)
        .collect();
    assert_eq!(last_three, ["e17", "e18", "e19"], "F038 FALSIFIED");
    assert_eq!(engine.history(0).len(), 0);
    assert_eq!(engine.history(1000).len(), 20);
}

/// F039: Concurrent diagnoses never overfill the history
#[test]
fn f039_concurrent_history_bounded() {
    let engine = builtin(16);
    std::thread::scope(|scope| {
        for t in 0..8 {
            let engine = &engine;
            scope.spawn(move || {
                for i in 0..100 {
                    engine.diagnose(&format!("worker {t} failure {i}"));
                }
            });
        }
    });
    assert_eq!(engine.history_len(), 16, "F039 FALSIFIED");
}

/// F040: Diagnoses survive the machine rendering unchanged
#[test]
fn f040_diagnosis_machine_roundtrip() {
    let engine = builtin(10);
    let diagnosis = engine.diagnose("collect2: error: ld returned 1 exit status");

    match parse_machine_line(&diagnosis.to_machine_line()) {
        Ok(MachineRecord::Diagnosis(parsed)) => {
            assert_eq!(parsed, diagnosis, "F040 FALSIFIED: fields changed in transit");
        }
        other => panic!("F040 FALSIFIED: parsed as {other:?}"),
    }
}
