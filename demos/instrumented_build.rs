// Examples are allowed to use expect/unwrap for simplicity
#![allow(clippy::expect_used, clippy::unwrap_used)]

//! Instrumented Toolchain Example
//!
//! Runs a few simulated toolchain invocations through an observability
//! context: a clean, a build that overflows IRAM, a retried build, a flash
//! that loses the device, and a monitor session cancelled by its timeout.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example instrumented_build
//!
//! # Keep logs in a specific project directory
//! cargo run --example instrumented_build -- /tmp/blink
//!
//! # Show the crate's own diagnostics
//! RUST_LOG=toolscope=debug cargo run --example instrumented_build
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use toolscope::prelude::*;
use tracing_subscriber::EnvFilter;

async fn simulated(latency: Duration, output: ToolOutput) -> ToolOutput {
    tokio::time::sleep(latency).await;
    output
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let root = std::env::args()
        .nth(1)
        .map_or_else(|| std::env::temp_dir().join("toolscope-demo"), PathBuf::from);

    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║              TOOLSCOPE INSTRUMENTED BUILD                  ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();

    let config = ObservabilityConfig::new(&root)
        .with_log_name("blink")
        .with_heartbeat_interval(Duration::from_millis(200))
        .with_echo_to_tracing(false);
    let obs = Observability::open(config).context("opening observability context")?;
    println!("[INIT] Logs under {}", root.join("logs").display());

    // Clean
    obs.instrument(
        "clean",
        simulated(Duration::from_millis(50), ToolOutput::ok("Done")),
    )
    .await;

    // Build fails, then succeeds after the fix
    let failed = obs
        .instrument(
            "build",
            simulated(
                Duration::from_millis(300),
                ToolOutput::failed(
                    2,
                    "region `iram0_0_seg' overflowed by 1184 bytes\ncollect2: error: ld returned 1 exit status",
                ),
            ),
        )
        .await;
    println!("[BUILD] exit code {}", failed.exit_code);
    if let Some(diagnosis) = obs.diagnose_last() {
        println!("[DIAG]  {} ({})", diagnosis.matched_category, diagnosis.severity);
        println!("[DIAG]  {}", diagnosis.suggestion);
    }

    obs.instrument(
        "build",
        simulated(
            Duration::from_millis(250),
            ToolOutput::ok("Project build complete."),
        ),
    )
    .await;

    // Flash loses the device
    let result: Result<(), String> = obs
        .instrument("flash", async {
            tokio::time::sleep(Duration::from_millis(120)).await;
            Err("Lost connection to the device while writing at 0x00010000".to_string())
        })
        .await;
    println!("[FLASH] {result:?}");

    // Monitor runs until its timeout
    let monitor = obs
        .instrument_with_timeout(
            "monitor",
            Duration::from_millis(500),
            std::future::pending::<ToolOutput>(),
        )
        .await;
    if let Err(timeout) = monitor {
        println!("[MON]   {timeout}");
    }

    println!();
    println!("{}", render_table(&obs.metrics().snapshot()));

    println!("[LOG] Last errors:");
    for entry in obs.logs_view(Some(LogLevel::Error), Some(5))? {
        println!("  {}", entry.render_human(false));
    }

    println!();
    println!("{}", obs.status().render_human(false));
    obs.shutdown()?;
    Ok(())
}
