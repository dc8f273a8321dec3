/// Autoflow: flow execution engine
///
/// Main entry point for one engine invocation. Reads the operation input as
/// JSON, runs the operation and writes the `{status, response}` envelope.
///
/// Usage: `autoflow EXECUTE_FLOW --input input.json --output output.json`
/// (stdin and stdout are used when the files are omitted).

use anyhow::Result;
use autoflow::{
    config::EngineConfig,
    operations::{EngineOperationType, EngineResponse},
    runner::{init_tracing, run},
};
use clap::Parser;
use serde_json::{json, Value};
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[derive(Debug, Parser)]
#[command(name = "autoflow", version, about = "Run one flow engine operation")]
struct Cli {
    /// Operation to run (e.g. EXECUTE_FLOW, EXECUTE_STEP, EXTRACT_PIECE_METADATA)
    operation: EngineOperationType,

    /// Read the operation input from this file instead of stdin
    #[arg(long)]
    input: Option<PathBuf>,

    /// Write the response envelope to this file instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

/// Application entry point
///
/// The process exits successfully whenever an envelope was written, even if
/// the envelope reports an ERROR status.
#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration (defaults to local SQLite storage under ./data)
    let config = EngineConfig::default();
    init_tracing(&config.log_filter);

    let cli = Cli::parse();

    let raw = match &cli.input {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read input file '{}': {}", path.display(), e))?,
        None => {
            let mut buffer = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buffer)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to read stdin: {}", e))?;
            buffer
        }
    };

    let response = match serde_json::from_str::<Value>(&raw) {
        Ok(input) => run(&config, cli.operation, input).await,
        Err(e) => {
            tracing::error!("❌ Operation input is not valid JSON: {}", e);
            EngineResponse::error(json!(format!("Invalid input: {}", e)))
        }
    };

    let body = serde_json::to_string(&response)?;
    match &cli.output {
        Some(path) => tokio::fs::write(path, body)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to write output file '{}': {}", path.display(), e))?,
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(body.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }

    Ok(())
}
