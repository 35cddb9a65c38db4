// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # toolscope-observe
//!
//! Observability for command-line embedded toolchains.
//!
//! This crate provides:
//! - **Event log**: dual-sink (human + JSON lines) append log with
//!   size-bounded rotation and archive retention
//! - **Formatter**: deterministic human and machine renderings
//! - **Facade**: [`Observability`], which wraps each tool invocation with
//!   logging, metrics, and failure diagnosis
//! - **Queries**: metrics summary, log view, error history, last diagnosis,
//!   and status, also as JSON for a transport layer
//!
//! ## Example
//!
//! ```rust,no_run
//! use toolscope_core::{ObservabilityConfig, ToolOutput};
//! use toolscope_observe::Observability;
//!
//! # async fn run() -> Result<(), toolscope_observe::ObserveError> {
//! let obs = Observability::open(ObservabilityConfig::new("/work/blink"))?;
//!
//! let output = obs
//!     .instrument("build", async { ToolOutput::failed(1, "region `iram0_0_seg' overflowed") })
//!     .await;
//! assert!(!output.success());
//!
//! let diagnosis = obs.diagnose_last();
//! println!("{diagnosis:?}");
//! obs.shutdown()?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::significant_drop_tightening)]

pub mod error;
pub mod event_log;
pub mod facade;
pub mod formatter;
pub mod query;
pub mod status;

pub use error::{InvocationTimeout, ObserveError, Result};
pub use event_log::{EventLog, EventLogSettings};
pub use facade::{DEFAULT_HISTORY_COUNT, DEFAULT_TAIL_COUNT, Observability, SELF_COMPONENT};
pub use formatter::{
    MachineRecord, RECORD_FIELD, RecordKind, Render, parse_log_entry, parse_machine_line,
    render_table,
};
pub use query::{QueryRequest, handle_query};
pub use status::ObservabilityStatus;
