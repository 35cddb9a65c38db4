// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # toolscope-core
//!
//! Shared foundation for the toolscope observability workspace:
//!
//! - [`LogEntry`], [`LogLevel`], [`Severity`] and [`Outcome`] value types
//! - [`ObservabilityConfig`] loaded from TOML with validation
//! - [`MetricsCollector`] for per-operation call counts and running durations
//! - [`InvocationRecord`], [`ToolOutput`] and [`ReportOutcome`] for talking to
//!   the toolchain wrapper
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use toolscope_core::{MetricsCollector, Outcome};
//!
//! let metrics = MetricsCollector::new();
//! metrics.record("build", Duration::from_millis(10), Outcome::Success);
//! metrics.record("build", Duration::from_millis(30), Outcome::Success);
//! assert_eq!(metrics.stat("build").mean_duration, Duration::from_millis(20));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::significant_drop_tightening)]

pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

pub use config::{HumanDuration, LogLayout, ObservabilityConfig, RuleConfig, TimeoutConfig};
pub use error::{CoreError, Result};
pub use metrics::{
    AggregateStat, MetricRecord, MetricsCollector, MetricsSnapshot, MetricsSummary,
};
pub use types::{
    Context, ContextValue, InvocationRecord, LogEntry, LogLevel, Outcome, ReportOutcome, Severity,
    ToolOutput, sanitize, truncate_chars,
};
