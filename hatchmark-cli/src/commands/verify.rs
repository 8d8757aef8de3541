//! Verify command implementation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;

use hatchmark_core::{JsonlLedger, MatchPolicy, VerificationEngine, Verdict};

use crate::exit_codes;
use crate::utils;

/// Execute the verify command and map the verdict to an exit code.
pub async fn execute(
    file: PathBuf,
    threshold: Option<u32>,
    json: bool,
    ledger_path: PathBuf,
) -> Result<i32> {
    let content = utils::read_file(&file)?;

    let ledger = Arc::new(
        JsonlLedger::open(&ledger_path)
            .with_context(|| format!("Failed to open ledger: {}", ledger_path.display()))?,
    );
    let policy = MatchPolicy::new(utils::resolve_threshold(threshold));
    let engine = VerificationEngine::new(ledger, policy);

    let verdict = engine.verify(&content).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
    } else {
        print_verdict(&verdict);
    }

    Ok(match verdict {
        Verdict::Verified { .. } => exit_codes::SUCCESS,
        Verdict::PotentiallyAltered { .. } => exit_codes::POTENTIALLY_ALTERED,
        Verdict::NotRegistered => exit_codes::GENERAL_ERROR,
    })
}

fn print_verdict(verdict: &Verdict) {
    match verdict {
        Verdict::Verified { record } => {
            println!("{}", "VERIFIED".green().bold());
            println!("   {} {}", "record:".dimmed(), record.id);
            println!("   {} {}", "creator:".dimmed(), record.creator);
            println!(
                "   {} {}",
                "registered:".dimmed(),
                record.registered_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
        Verdict::PotentiallyAltered { record, distance } => {
            println!("{}", "POTENTIALLY ALTERED".yellow().bold());
            println!(
                "   {} {} of {} bits differ from the closest registration",
                "distance:".dimmed(),
                distance,
                hatchmark_core::PerceptualCode::BITS
            );
            println!("   {} {}", "record:".dimmed(), record.id);
            println!("   {} {}", "creator:".dimmed(), record.creator);
            println!(
                "   {} {}",
                "registered:".dimmed(),
                record.registered_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
        Verdict::NotRegistered => {
            println!("{}", "NOT REGISTERED".red().bold());
            println!("   no registration resembles this content");
        }
    }
}
