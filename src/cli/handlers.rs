//! Command handlers
//!
//! Thin glue between parsed arguments and the library: builds configuration,
//! wires the real engine and fixer into the orchestrator, and maps results to
//! exit codes. Library errors carry context via `anyhow` here; the structured
//! error types live at the module seams below.

use super::commands::RunArgs;
use crate::catalog;
use crate::config::ReprodockConfig;
use crate::engine::DockerEngine;
use crate::harness::BuildRepairOrchestrator;
use crate::results::OutcomeSink;
use anyhow::{Context, Result};
use tracing::{error, info};

/// Handles `reprodock run`. Returns the process exit code.
pub async fn handle_run(args: &RunArgs) -> i32 {
    match run_matrix(args).await {
        Ok(()) => 0,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            1
        }
    }
}

async fn run_matrix(args: &RunArgs) -> Result<()> {
    let mut config = ReprodockConfig::default();
    if let Some(max_retries) = args.max_retries {
        config.max_repair_retries = max_retries;
    }
    if let Some(base_image) = &args.base_image {
        config.base_image = base_image.clone();
    }
    if !args.versions.is_empty() {
        config.versions = args.versions.clone();
    }
    if let Some(results) = &args.results {
        config.results_path = results.clone();
    }
    config.validate()?;

    let ids = catalog::resolve(&args.directory, args.artifact.as_deref())
        .context("Failed to resolve artifacts")?;
    if ids.is_empty() {
        println!("No artifacts found in {}", args.directory.display());
        return Ok(());
    }

    let engine = DockerEngine::connect().context("Failed to connect to Docker")?;
    let fixer = config.create_fixer()?;
    let sink = OutcomeSink::new(config.results_path.clone());

    let orchestrator = BuildRepairOrchestrator::new(&engine, &engine, &fixer, &config);
    let summary = orchestrator
        .run_matrix(&args.directory, &ids, &sink)
        .await;

    info!(
        processed = summary.artifacts_processed,
        skipped = summary.artifacts_skipped,
        records = summary.records_written,
        "Matrix run complete"
    );
    println!(
        "Processed {} artifact(s) ({} skipped), wrote {} record(s) to {}",
        summary.artifacts_processed,
        summary.artifacts_skipped,
        summary.records_written,
        sink.path().display()
    );

    Ok(())
}

/// Handles `reprodock health`. Returns the process exit code.
pub async fn handle_health() -> i32 {
    let config = ReprodockConfig::default();
    let mut healthy = true;

    match DockerEngine::connect() {
        Ok(engine) => {
            if engine.ping().await {
                println!("Docker daemon: ok");
            } else {
                println!("Docker daemon: not responding");
                healthy = false;
            }
        }
        Err(e) => {
            println!("Docker daemon: unavailable ({})", e);
            healthy = false;
        }
    }

    if config.has_repair_token() {
        println!("Repair service: token configured ({})", config.repair_endpoint);
    } else {
        println!("Repair service: no token (set HUGGINGFACE_API_TOKEN)");
        healthy = false;
    }

    if healthy {
        0
    } else {
        1
    }
}
