//! Diagnostic rules and their text matchers.

use std::fmt;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use toolscope_core::{RuleConfig, Severity};

use crate::error::{DiagnoseError, Result};

/// A case-insensitive text matcher.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Literal substring. Stored lower-cased.
    Substring(String),
    /// Regular expression search, compiled case-insensitive.
    Regex(Regex),
}

impl Matcher {
    /// Creates a substring matcher.
    #[must_use]
    pub fn substring(needle: &str) -> Self {
        Self::Substring(needle.to_lowercase())
    }

    /// Compiles a case-insensitive regex matcher.
    ///
    /// # Errors
    /// Returns the regex compiler error if `pattern` is invalid.
    pub fn regex(pattern: &str) -> std::result::Result<Self, regex::Error> {
        RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map(Self::Regex)
    }

    /// Tests the matcher. `lowered` must be `text.to_lowercase()`.
    #[must_use]
    pub fn is_match(&self, text: &str, lowered: &str) -> bool {
        match self {
            Self::Substring(needle) => lowered.contains(needle.as_str()),
            Self::Regex(re) => re.is_match(text),
        }
    }

    /// Source text of the matcher.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Substring(needle) => needle,
            Self::Regex(re) => re.as_str(),
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Substring(needle) => write!(f, "\"{needle}\""),
            Self::Regex(re) => write!(f, "/{}/i", re.as_str()),
        }
    }
}

/// One entry of the ordered rule table.
///
/// A rule matches when any of its matchers matches.
#[derive(Debug, Clone)]
pub struct DiagnosticRule {
    name: String,
    matchers: Vec<Matcher>,
    category: String,
    severity: Severity,
    suggestion: String,
}

impl DiagnosticRule {
    /// Starts a rule with no matchers.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        severity: Severity,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            matchers: Vec::new(),
            category: category.into(),
            severity,
            suggestion: suggestion.into(),
        }
    }

    /// Adds a literal substring matcher.
    #[must_use]
    pub fn substring(mut self, needle: &str) -> Self {
        self.matchers.push(Matcher::substring(needle));
        self
    }

    /// Adds a regex matcher.
    ///
    /// # Errors
    /// Returns [`DiagnoseError::InvalidPattern`] if `pattern` does not compile.
    pub fn pattern(mut self, pattern: &str) -> Result<Self> {
        let matcher = Matcher::regex(pattern).map_err(|source| DiagnoseError::InvalidPattern {
            rule: self.name.clone(),
            pattern: pattern.to_string(),
            source,
        })?;
        self.matchers.push(matcher);
        Ok(self)
    }

    /// Adds several regex matchers.
    ///
    /// # Errors
    /// Returns the first pattern that fails to compile.
    pub fn patterns(self, patterns: &[&str]) -> Result<Self> {
        patterns.iter().try_fold(self, |rule, p| rule.pattern(p))
    }

    /// Builds a rule from its configuration declaration.
    ///
    /// # Errors
    /// Returns an error if a pattern is invalid or no matcher is declared.
    pub fn from_config(config: &RuleConfig) -> Result<Self> {
        let mut rule = Self::new(
            &config.name,
            &config.category,
            config.severity,
            &config.suggestion,
        );
        for needle in &config.substrings {
            rule = rule.substring(needle);
        }
        for pattern in &config.patterns {
            rule = rule.pattern(pattern)?;
        }
        rule.validate()?;
        Ok(rule)
    }

    /// Rejects rules that can never match.
    ///
    /// # Errors
    /// Returns [`DiagnoseError::EmptyRule`] when the rule has no matchers.
    pub fn validate(&self) -> Result<()> {
        if self.matchers.is_empty() {
            return Err(DiagnoseError::EmptyRule(self.name.clone()));
        }
        Ok(())
    }

    /// Returns true if any matcher matches. `lowered` must be `text.to_lowercase()`.
    #[must_use]
    pub fn matches(&self, text: &str, lowered: &str) -> bool {
        self.matchers.iter().any(|m| m.is_match(text, lowered))
    }

    /// Rule name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reported category.
    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Reported severity.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        self.severity
    }

    /// Reported suggestion.
    #[must_use]
    pub fn suggestion(&self) -> &str {
        &self.suggestion
    }

    /// The rule's matchers, in declaration order.
    #[must_use]
    pub fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }

    /// Serializable description of the rule.
    #[must_use]
    pub fn summary(&self) -> RuleSummary {
        RuleSummary {
            name: self.name.clone(),
            category: self.category.clone(),
            severity: self.severity,
            suggestion: self.suggestion.clone(),
            matchers: self.matchers.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Serializable view of a [`DiagnosticRule`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSummary {
    /// Rule name.
    pub name: String,
    /// Reported category.
    pub category: String,
    /// Reported severity.
    pub severity: Severity,
    /// Reported suggestion.
    pub suggestion: String,
    /// Matchers rendered as `"substring"` or `/regex/i`.
    pub matchers: Vec<String>,
}
