//! The diagnostic engine: ordered first-match rule evaluation plus a bounded
//! history of past diagnoses.
//!
//! Readers load an immutable snapshot of the rule table without locking.
//! Registrations build a new table and swap it in under a writer mutex, so
//! two concurrent registrations never lose each other's rule.

use std::collections::VecDeque;
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use toolscope_core::{RuleConfig, Severity, truncate_chars};

use crate::builtin::builtin_rules;
use crate::error::{DiagnoseError, Result};
use crate::rule::DiagnosticRule;

/// Default capacity of the diagnosis history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Maximum characters of error text kept in a [`Diagnosis`].
pub const EXCERPT_MAX_CHARS: usize = 500;

/// Category reported when no rule matches.
pub const UNKNOWN_CATEGORY: &str = "unknown";

const FALLBACK_SUGGESTION: &str =
    "No known failure pattern matched. Review the full tool output and the event log for details";

/// Immutable snapshot of the ordered rule table.
pub type RuleTable = Arc<Vec<Arc<DiagnosticRule>>>;

/// Result of classifying one failure text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    /// Category of the matching rule, or `"unknown"`.
    pub matched_category: String,
    /// Name of the matching rule; absent for the fallback.
    #[serde(default)]
    pub rule_name: Option<String>,
    /// Severity of the matching rule.
    pub severity: Severity,
    /// Corrective suggestion.
    pub suggestion: String,
    /// Leading part of the diagnosed text.
    pub raw_error_excerpt: String,
    /// When the diagnosis was made.
    pub timestamp: DateTime<Utc>,
}

impl Diagnosis {
    fn from_rule(rule: &DiagnosticRule, text: &str) -> Self {
        Self {
            matched_category: rule.category().to_string(),
            rule_name: Some(rule.name().to_string()),
            severity: rule.severity(),
            suggestion: rule.suggestion().to_string(),
            raw_error_excerpt: truncate_chars(text, EXCERPT_MAX_CHARS).to_string(),
            timestamp: Utc::now(),
        }
    }

    fn fallback(text: &str) -> Self {
        Self {
            matched_category: UNKNOWN_CATEGORY.to_string(),
            rule_name: None,
            severity: Severity::Info,
            suggestion: FALLBACK_SUGGESTION.to_string(),
            raw_error_excerpt: truncate_chars(text, EXCERPT_MAX_CHARS).to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Returns true if no rule matched.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.rule_name.is_none()
    }
}

/// Ordered rule table with a bounded diagnosis history.
#[derive(Debug)]
pub struct DiagnosticEngine {
    rules: ArcSwap<Vec<Arc<DiagnosticRule>>>,
    registration: Mutex<()>,
    history: Mutex<VecDeque<Diagnosis>>,
    capacity: usize,
}

impl DiagnosticEngine {
    /// Creates an engine with an empty rule table.
    ///
    /// A zero capacity is raised to one.
    #[must_use]
    pub fn new(history_capacity: usize) -> Self {
        let capacity = history_capacity.max(1);
        Self {
            rules: ArcSwap::from_pointee(Vec::new()),
            registration: Mutex::new(()),
            history: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Creates an engine loaded with the built-in rules.
    ///
    /// # Errors
    /// Only fails if a built-in pattern does not compile.
    pub fn with_builtin(history_capacity: usize) -> Result<Self> {
        let engine = Self::new(history_capacity);
        let rules = builtin_rules()?.into_iter().map(Arc::new).collect();
        engine.rules.store(Arc::new(rules));
        Ok(engine)
    }

    /// Creates an engine with the built-in rules followed by configured rules.
    ///
    /// Configured rules with a `position` are inserted there; the others are
    /// appended in declaration order.
    ///
    /// # Errors
    /// Returns an error if a configured rule is invalid, duplicated, or has a
    /// position past the end of the table.
    pub fn from_config(history_capacity: usize, rules: &[RuleConfig]) -> Result<Self> {
        let engine = Self::with_builtin(history_capacity)?;
        for config in rules {
            engine.register_rule(DiagnosticRule::from_config(config)?, config.position)?;
        }
        Ok(engine)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Diagnosis
    // ═══════════════════════════════════════════════════════════════════════════

    /// Classifies `error_text` with the first matching rule and records the
    /// result in the history. Unmatched text yields an `"unknown"` diagnosis.
    pub fn diagnose(&self, error_text: &str) -> Diagnosis {
        let table = self.rules.load();
        let lowered = error_text.to_lowercase();
        let diagnosis = table
            .iter()
            .find(|rule| rule.matches(error_text, &lowered))
            .map_or_else(
                || Diagnosis::fallback(error_text),
                |rule| Diagnosis::from_rule(rule, error_text),
            );

        let mut history = self.history.lock();
        if history.len() == self.capacity {
            history.pop_front();
        }
        history.push_back(diagnosis.clone());
        drop(history);

        tracing::debug!(
            category = %diagnosis.matched_category,
            rule = diagnosis.rule_name.as_deref().unwrap_or("-"),
            "diagnosed failure"
        );
        diagnosis
    }

    /// Most recent diagnosis, if any.
    #[must_use]
    pub fn last(&self) -> Option<Diagnosis> {
        self.history.lock().back().cloned()
    }

    /// Up to `count` most recent diagnoses, oldest first.
    #[must_use]
    pub fn history(&self, count: usize) -> Vec<Diagnosis> {
        let history = self.history.lock();
        let skip = history.len().saturating_sub(count);
        history.iter().skip(skip).cloned().collect()
    }

    /// Number of diagnoses currently held.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }

    /// History capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Rule table
    // ═══════════════════════════════════════════════════════════════════════════

    /// Adds a rule at `position` (default: append, lowest priority).
    ///
    /// Rules at and after `position` shift down one place and keep their
    /// relative order.
    ///
    /// # Errors
    /// Rejects empty rules, duplicate names, and positions past the end.
    pub fn register_rule(&self, rule: DiagnosticRule, position: Option<usize>) -> Result<()> {
        rule.validate()?;
        let _guard = self.registration.lock();

        let current = self.rules.load_full();
        if current.iter().any(|r| r.name() == rule.name()) {
            return Err(DiagnoseError::duplicate(rule.name()));
        }
        let len = current.len();
        let position = position.unwrap_or(len);
        if position > len {
            return Err(DiagnoseError::InvalidPosition { position, len });
        }

        let mut next: Vec<Arc<DiagnosticRule>> = Vec::with_capacity(len + 1);
        next.extend(current.iter().take(position).cloned());
        let name = rule.name().to_string();
        next.push(Arc::new(rule));
        next.extend(current.iter().skip(position).cloned());
        self.rules.store(Arc::new(next));

        tracing::info!(rule = %name, position, "registered diagnostic rule");
        Ok(())
    }

    /// Snapshot of the rule table, highest priority first.
    #[must_use]
    pub fn rules(&self) -> RuleTable {
        self.rules.load_full()
    }

    /// Rules reporting `category`, in table order.
    #[must_use]
    pub fn rules_by_category(&self, category: &str) -> Vec<Arc<DiagnosticRule>> {
        self.rules
            .load()
            .iter()
            .filter(|r| r.category() == category)
            .cloned()
            .collect()
    }

    /// Number of rules loaded.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.load().len()
    }
}

impl Default for DiagnosticEngine {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
