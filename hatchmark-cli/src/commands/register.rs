//! Register command implementation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::info;

use hatchmark_core::{
    JsonlLedger, NotarizationPipeline, PipelineConfig, TrailerEmbedder, WatermarkStatus,
};

use crate::exit_codes;
use crate::utils;

/// Execute the register command: run the pipeline against the journal, wait
/// for the watermark outcome, write the marked copy.
pub async fn execute(
    file: PathBuf,
    creator: String,
    output: Option<PathBuf>,
    ledger_path: PathBuf,
) -> Result<i32> {
    let content = utils::read_file(&file)?;
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let ledger = Arc::new(
        JsonlLedger::open(&ledger_path)
            .with_context(|| format!("Failed to open ledger: {}", ledger_path.display()))?,
    );

    let (pipeline, worker, mut events) = NotarizationPipeline::new(
        ledger,
        Arc::new(TrailerEmbedder),
        PipelineConfig::default(),
    );
    let worker_handle = tokio::spawn(worker.run());

    let receipt = pipeline.register(&content, &creator, &filename).await?;
    info!(id = %receipt.record.id, "registration committed");

    println!("{} {}", "Registered:".green().bold(), receipt.record.id);
    println!("   {} {}", "digest:".dimmed(), receipt.record.content_digest);
    println!("   {} {}", "code:".dimmed(), receipt.record.perceptual_code);
    println!("   {} {}", "creator:".dimmed(), receipt.record.creator);
    if let Some(prior) = receipt.duplicate_of {
        println!(
            "{} identical content already registered as {}",
            "Duplicate:".yellow().bold(),
            prior
        );
    }

    // Close the job channel so the worker drains this submission and stops.
    drop(pipeline);

    while let Some(event) = events.recv().await {
        match event.status {
            WatermarkStatus::Embedded => {
                let marked = event.watermarked.unwrap_or_default();
                let out_path = output
                    .clone()
                    .unwrap_or_else(|| utils::build_marked_path(&file));
                std::fs::write(&out_path, &marked).with_context(|| {
                    format!("Failed to write watermarked copy: {}", out_path.display())
                })?;
                println!(
                    "{} {}",
                    "Watermarked:".green().bold(),
                    out_path.display()
                );
            }
            status => {
                println!(
                    "{} watermark ended as `{status}`; the registration stands",
                    "Warning:".yellow().bold()
                );
            }
        }
    }
    worker_handle.await.context("watermark worker crashed")?;

    Ok(exit_codes::SUCCESS)
}
