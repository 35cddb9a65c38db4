//! Observability error types.

use std::time::Duration;

use toolscope_core::CoreError;
use toolscope_diagnose::DiagnoseError;

/// Result type alias for observe operations.
pub type Result<T> = std::result::Result<T, ObserveError>;

/// Observability errors.
///
/// Writing to the event log never produces one of these; only construction,
/// queries, and explicit flushes do.
#[derive(Debug, thiserror::Error)]
pub enum ObserveError {
    /// Malformed query parameters.
    #[error("validation error: {0}")]
    Validation(String),

    /// I/O error while reading or flushing the log.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A machine record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration or core error.
    #[error(transparent)]
    Core(CoreError),

    /// Rule table error.
    #[error(transparent)]
    Diagnose(#[from] DiagnoseError),
}

impl ObserveError {
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

    /// Returns true if the caller supplied bad input.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<CoreError> for ObserveError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => Self::Validation(msg),
            CoreError::Io(err) => Self::Io(err),
            CoreError::Serialization(msg) => Self::Serialization(msg),
            other @ CoreError::Config(_) => Self::Core(other),
        }
    }
}

impl From<serde_json::Error> for ObserveError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// An instrumented invocation was cancelled because it ran past its timeout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("operation '{operation}' timed out after {}", humantime::format_duration(*.timeout))]
pub struct InvocationTimeout {
    /// Operation name.
    pub operation: String,
    /// The timeout that expired.
    pub timeout: Duration,
}
