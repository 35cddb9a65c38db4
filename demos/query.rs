// Examples are allowed to use expect/unwrap for simplicity
#![allow(clippy::expect_used, clippy::unwrap_used)]

//! Query Example
//!
//! Answers JSON queries against an observability context, the way a
//! transport layer (stdio, socket, editor plugin) would.
//!
//! # Usage
//!
//! ```bash
//! # Built-in sample queries
//! cargo run --example query
//!
//! # Your own queries, one JSON object per line
//! echo '{"query":"logs_view","level":"ERROR","tail_count":5}' | cargo run --example query -- -
//! ```

use std::io::BufRead;
use std::time::Duration;

use toolscope::prelude::*;
use tracing_subscriber::EnvFilter;

const SAMPLE_QUERIES: [&str; 7] = [
    r#"{"query":"status"}"#,
    r#"{"query":"metrics_summary"}"#,
    r#"{"query":"metrics_summary","operation":"flash"}"#,
    r#"{"query":"error_history","count":2}"#,
    r#"{"query":"diagnose_last"}"#,
    r#"{"query":"rules","category":"hardware"}"#,
    r#"{"query":"logs_view","tail_count":-1}"#,
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let root = std::env::temp_dir().join("toolscope-query-demo");
    let obs = Observability::open(ObservabilityConfig::new(&root).with_echo_to_tracing(false))?;

    // Some history to query.
    for (operation, output) in [
        ("build", ToolOutput::ok("Project build complete.")),
        ("flash", ToolOutput::failed(2, "Failed to connect to ESP32: No serial data received.")),
        ("flash", ToolOutput::ok("Hash of data verified.")),
        ("size", ToolOutput::failed(1, "")),
    ] {
        obs.instrument(operation, async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            output
        })
        .await;
    }

    let from_stdin = std::env::args().nth(1).is_some_and(|a| a == "-");
    let queries: Vec<String> = if from_stdin {
        std::io::stdin().lock().lines().collect::<Result<_, _>>()?
    } else {
        SAMPLE_QUERIES.iter().map(ToString::to_string).collect()
    };

    for query in queries.iter().filter(|q| !q.trim().is_empty()) {
        println!("> {query}");
        match handle_query(&obs, query) {
            Ok(response) => println!("{response}"),
            Err(e) => println!("[ERROR] {e}"),
        }
        println!();
    }

    obs.shutdown()?;
    Ok(())
}
