//! Diagnostic engine error types.

/// Result type alias for rule-table operations.
pub type Result<T> = std::result::Result<T, DiagnoseError>;

/// Rule-table errors. Diagnosing text never fails; only building and
/// registering rules can.
#[derive(Debug, thiserror::Error)]
pub enum DiagnoseError {
    /// A rule pattern is not a valid regular expression.
    #[error("invalid pattern '{pattern}' in rule '{rule}': {source}")]
    InvalidPattern {
        /// Rule being built.
        rule: String,
        /// Offending pattern.
        pattern: String,
        /// Regex compiler error.
        source: regex::Error,
    },

    /// A rule has no pattern at all.
    #[error("rule '{0}' has no patterns")]
    EmptyRule(String),

    /// Insertion position is past the end of the table.
    #[error("invalid rule position {position} (table has {len} rules)")]
    InvalidPosition {
        /// Requested position.
        position: usize,
        /// Table length at the time of the request.
        len: usize,
    },

    /// A rule with the same name is already registered.
    #[error("duplicate rule name: {0}")]
    DuplicateRule(String),
}

impl DiagnoseError {
    /// Creates a duplicate rule error.
    #[must_use]
    pub fn duplicate(name: impl Into<String>) -> Self {
        Self::DuplicateRule(name.into())
    }
}
