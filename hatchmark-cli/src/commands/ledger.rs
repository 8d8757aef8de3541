//! Ledger inspection commands.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;

use hatchmark_core::{JsonlLedger, Ledger, RecordId};

use crate::exit_codes;

fn open(ledger_path: &PathBuf) -> Result<Arc<JsonlLedger>> {
    Ok(Arc::new(JsonlLedger::open(ledger_path).with_context(
        || format!("Failed to open ledger: {}", ledger_path.display()),
    )?))
}

/// List every registration, one line each, in commit order.
pub async fn list(ledger_path: PathBuf) -> Result<i32> {
    let ledger = open(&ledger_path)?;
    let records = ledger.scan_all().await?;

    if records.is_empty() {
        println!("ledger is empty: {}", ledger_path.display());
        return Ok(exit_codes::SUCCESS);
    }

    for record in &records {
        println!(
            "{}  {}  {:8}  {}  {}",
            record.id,
            record.registered_at.format("%Y-%m-%d %H:%M:%S"),
            record.watermark_status.to_string(),
            record.creator,
            record.original_filename
        );
    }
    println!("{} record(s)", records.len());
    Ok(exit_codes::SUCCESS)
}

/// Show one record in full.
pub async fn show(id: String, ledger_path: PathBuf) -> Result<i32> {
    let id = RecordId::parse(&id)?;
    let ledger = open(&ledger_path)?;

    match ledger.get(id).await? {
        Some(record) => {
            println!("{} {}", "Record:".bold(), record.id);
            println!("   {} {}", "digest:".dimmed(), record.content_digest);
            println!("   {} {}", "code:".dimmed(), record.perceptual_code);
            println!("   {} {}", "creator:".dimmed(), record.creator);
            println!("   {} {}", "filename:".dimmed(), record.original_filename);
            println!(
                "   {} {}",
                "registered:".dimmed(),
                record.registered_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            println!("   {} {}", "watermark:".dimmed(), record.watermark_status);
            println!("   {} {}", "version:".dimmed(), record.state_version);
            Ok(exit_codes::SUCCESS)
        }
        None => {
            eprintln!("no record with id {id}");
            Ok(exit_codes::GENERAL_ERROR)
        }
    }
}
