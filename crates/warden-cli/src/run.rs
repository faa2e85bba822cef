//! Run command implementation for Warden CLI.
//!
//! Feeds JSON-lines method calls to a fresh orchestrator, one at a time, and
//! prints each response as a JSON line. The final status is printed last.

use std::path::Path;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use warden_core::config::timeout_from_millis;
use warden_core::{MethodCall, Orchestrator, OrchestratorConfig, ThreadEngineFactory};

use crate::entries;

/// Execute a script.
pub async fn execute(script: Option<&Path>, handshake_timeout_ms: u64) -> anyhow::Result<()> {
    let input: Box<dyn AsyncRead + Unpin + Send> = match script {
        Some(path) => Box::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to read script {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdin()),
    };

    let config = OrchestratorConfig::from_env()
        .with_handshake_timeout(timeout_from_millis(handshake_timeout_ms));
    let handle = Orchestrator::start(ThreadEngineFactory::new(), entries::registry(), config)
        .context("Failed to start orchestrator")?;

    let mut lines = BufReader::new(input).lines();
    let mut line_number = 0;
    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let call: MethodCall = serde_json::from_str(line)
            .with_context(|| format!("Invalid method call on line {}", line_number))?;
        tracing::debug!("Line {}: {}", line_number, call.method);

        let response = handle.invoke(call).await;
        println!("{}", serde_json::to_string(&response)?);
    }

    let status = handle.status().await?;
    println!("{}", serde_json::to_string(&status)?);

    handle.shutdown().await;
    Ok(())
}
