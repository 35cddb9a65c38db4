//! Error types for toolscope-core.
//!
//! All errors are explicit values; nothing in this crate panics on bad input.

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Error type for configuration loading and value validation.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Configuration error (unreadable, unparseable, or invalid).
    #[error("configuration error: {0}")]
    Config(String),

    /// A caller-supplied value was rejected.
    #[error("validation error: {0}")]
    Validation(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl CoreError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Creates a serialization error.
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Returns true if the error was caused by caller input rather than the environment.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
