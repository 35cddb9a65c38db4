// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # toolscope-diagnose
//!
//! Classifies toolchain failure text into an actionable category.
//!
//! - [`DiagnosticRule`]: a named set of case-insensitive substring or regex
//!   matchers with a category, severity, and suggestion
//! - [`DiagnosticEngine`]: an ordered rule table (first match wins) and a
//!   bounded history of [`Diagnosis`] values
//! - [`builtin_rules`]: the default table for ESP-IDF style toolchains
//!
//! ## Example
//!
//! ```rust
//! use toolscope_diagnose::DiagnosticEngine;
//!
//! let engine = DiagnosticEngine::with_builtin(100)?;
//! let diagnosis = engine.diagnose("Failed to connect to device: Timeout");
//! assert_eq!(diagnosis.matched_category, "hardware");
//! # Ok::<(), toolscope_diagnose::DiagnoseError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod builtin;
pub mod engine;
pub mod error;
pub mod rule;

pub use builtin::{TIMEOUT_CATEGORY, builtin_rules};
pub use engine::{
    DEFAULT_HISTORY_CAPACITY, Diagnosis, DiagnosticEngine, EXCERPT_MAX_CHARS, RuleTable,
    UNKNOWN_CATEGORY,
};
pub use error::{DiagnoseError, Result};
pub use rule::{DiagnosticRule, Matcher, RuleSummary};
