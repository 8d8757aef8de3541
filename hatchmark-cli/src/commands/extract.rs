//! Extract command implementation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;

use hatchmark_core::{JsonlLedger, MatchPolicy, TrailerExtractor, VerificationEngine};

use crate::exit_codes;
use crate::utils;

/// Execute the extract command: recover an embedded watermark payload and
/// resolve it against the ledger.
pub async fn execute(file: PathBuf, ledger_path: PathBuf) -> Result<i32> {
    let content = utils::read_file(&file)?;

    let ledger = Arc::new(
        JsonlLedger::open(&ledger_path)
            .with_context(|| format!("Failed to open ledger: {}", ledger_path.display()))?,
    );
    let engine = VerificationEngine::new(ledger, MatchPolicy::default());

    match engine.verify_watermark(&content, &TrailerExtractor).await? {
        Some(record) => {
            println!("{} {}", "Watermark found:".green().bold(), record.id);
            println!("   {} {}", "creator:".dimmed(), record.creator);
            println!("   {} {}", "filename:".dimmed(), record.original_filename);
            println!(
                "   {} {}",
                "registered:".dimmed(),
                record.registered_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            Ok(exit_codes::SUCCESS)
        }
        None => {
            println!("{}", "No watermark payload found".red());
            Ok(exit_codes::GENERAL_ERROR)
        }
    }
}
