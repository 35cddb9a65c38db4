//! Test error types.

use toolscope_observe::{InvocationTimeout, ObserveError};

/// Result type alias for test operations.
pub type Result<T> = std::result::Result<T, TestError>;

/// Testing errors.
#[derive(Debug, thiserror::Error)]
pub enum TestError {
    /// Harness error.
    #[error("harness error: {0}")]
    Harness(String),

    /// Load test error.
    #[error("load test error: {0}")]
    LoadTest(String),

    /// Assertion failed.
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// An instrumented invocation ran past its timeout.
    #[error(transparent)]
    Timeout(#[from] InvocationTimeout),

    /// Observability error.
    #[error("observability error: {0}")]
    Observe(#[from] ObserveError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TestError {
    /// Creates a harness error.
    #[must_use]
    pub fn harness(msg: impl Into<String>) -> Self {
        Self::Harness(msg.into())
    }

    /// Creates an assertion error.
    #[must_use]
    pub fn assertion(msg: impl Into<String>) -> Self {
        Self::Assertion(msg.into())
    }
}
