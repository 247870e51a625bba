//! Paired daemon: reads JSON requests from stdin, one per line, and writes
//! one JSON response per line to stdout.
//!
//! Run with: cargo run -p paired-runtime --bin pairedd
//!
//! Logs go to stderr; filter with `RUST_LOG`.

use std::path::PathBuf;

use anyhow::Context;
use paired_runtime::{Coordinator, PairedConfig, Request, Response};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn config_path() -> PathBuf {
    std::env::var_os("PAIRED_CONFIG").map_or_else(
        || PairedConfig::default().home.join("config.toml"),
        PathBuf::from,
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let path = config_path();
    let config = PairedConfig::load(&path)
        .and_then(PairedConfig::from_env)
        .with_context(|| format!("loading configuration from {}", path.display()))?;
    tracing::info!(home = %config.home.display(), "Starting pairedd");

    let coordinator = Coordinator::new(config);
    let report = coordinator.start().await.context("starting coordinator")?;
    for outcome in &report.agents {
        tracing::info!(agent_id = %outcome.agent_id, status = ?outcome.status, "Agent initialized");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("reading stdin")?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        };
        let Some(line) = line else {
            tracing::info!("Input closed");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => coordinator.handle(request).await,
            Err(e) => Response::error("invalid_request", e.to_string(), false),
        };
        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }

    coordinator.shutdown().await;
    Ok(())
}
