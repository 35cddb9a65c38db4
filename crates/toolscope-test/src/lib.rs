// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # toolscope-test
//!
//! Testing infrastructure for toolscope.
//!
//! This crate provides:
//! - **Test harness**: an [`Observability`](toolscope_observe::Observability)
//!   context in a temporary project directory, with restart and on-disk
//!   inspection helpers
//! - **Scripted tools**: fake toolchain invocations that replay a script of
//!   outputs, latencies, and hangs
//! - **Load testing**: concurrent `instrument` workers whose tallies are
//!   checked against the metrics collector
//! - **Falsification tests**: numbered integration tests under `tests/`
//!
//! ## Example
//!
//! ```rust,no_run
//! use toolscope_test::{ObservabilityHarness, ScriptedTool};
//!
//! # async fn run() -> toolscope_test::Result<()> {
//! let harness = ObservabilityHarness::builder()
//!     .with_max_file_bytes(1024)
//!     .build()?;
//!
//! let flash = ScriptedTool::new("flash")
//!     .then_fail(2, "A fatal error occurred: Failed to connect to ESP32")
//!     .then_succeed("Hash of data verified.");
//!
//! harness.run(&flash).await;
//! harness.run(&flash).await;
//! assert_eq!(harness.observability().metrics().stat("flash").call_count, 2);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod harness;
pub mod load;

pub use error::{Result, TestError};
pub use harness::{ObservabilityHarness, ObservabilityHarnessBuilder, ScriptedTool};
pub use load::{InstrumentLoadConfig, InstrumentLoadReport, InstrumentLoadTester, OperationTally};
