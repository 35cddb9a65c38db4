//! toolscope: structured observability for command-line embedded toolchains.
//!
//! Wraps each toolchain invocation (build, flash, monitor, ...) with a
//! rotating dual-sink event log, per-operation metrics, and rule-based
//! failure diagnosis.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use toolscope::prelude::*;
//!
//! # async fn run() -> Result<(), ObserveError> {
//! let obs = Observability::open(ObservabilityConfig::new("."))?;
//! let output = obs
//!     .instrument("build", async { ToolOutput::ok("Project build complete.") })
//!     .await;
//! assert!(output.success());
//! println!("{}", render_table(&obs.metrics().snapshot()));
//! obs.shutdown()?;
//! # Ok(())
//! # }
//! ```

pub use toolscope_core as core;
pub use toolscope_diagnose as diagnose;
pub use toolscope_observe as observe;

/// Prelude module for common imports.
pub mod prelude {
    pub use toolscope_core::{
        AggregateStat, Context, InvocationRecord, LogEntry, LogLevel, MetricsSummary,
        ObservabilityConfig, Outcome, Severity, ToolOutput,
    };
    pub use toolscope_diagnose::{Diagnosis, DiagnosticRule, RuleSummary};
    pub use toolscope_observe::{
        InvocationTimeout, Observability, ObservabilityStatus, ObserveError, QueryRequest, Render,
        handle_query, render_table,
    };
}
