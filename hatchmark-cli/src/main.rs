//! Hatchmark CLI - content registration and verification tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod exit_codes;
mod utils;

#[derive(Parser)]
#[command(name = "hatchmark")]
#[command(author, version, about = "Register and verify digital content fingerprints", long_about = None)]
struct Cli {
    /// Path to the ledger journal (env: HATCHMARK_LEDGER)
    #[arg(long, global = true, value_name = "PATH")]
    ledger: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a file in the ledger and write a watermarked copy
    Register {
        /// Path to the file to register
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Attribution recorded with the registration
        #[arg(short, long, default_value = "anonymous")]
        creator: String,

        /// Where to write the watermarked copy (defaults to <FILE> with a
        /// `marked` extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Verify a file against the ledger
    Verify {
        /// Path to the file to verify
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Maximum Hamming distance still reported as a near match
        /// (env: HATCHMARK_MATCH_THRESHOLD)
        #[arg(short, long)]
        threshold: Option<u32>,

        /// Emit the verdict as JSON
        #[arg(long)]
        json: bool,
    },

    /// Recover the watermark payload embedded in a file
    Extract {
        /// Path to the file to inspect
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Inspect the ledger
    Ledger {
        #[command(subcommand)]
        command: LedgerCommands,
    },
}

#[derive(Subcommand)]
enum LedgerCommands {
    /// List every registration
    List,
    /// Show one record in full
    Show {
        /// Record id
        #[arg(value_name = "ID")]
        id: String,
    },
}

#[tokio::main]
async fn main() {
    utils::init_tracing();

    let cli = Cli::parse();
    let ledger_path = utils::resolve_ledger_path(cli.ledger);

    let result = match cli.command {
        Commands::Register {
            file,
            creator,
            output,
        } => commands::register::execute(file, creator, output, ledger_path).await,
        Commands::Verify {
            file,
            threshold,
            json,
        } => commands::verify::execute(file, threshold, json, ledger_path).await,
        Commands::Extract { file } => commands::extract::execute(file, ledger_path).await,
        Commands::Ledger { command } => match command {
            LedgerCommands::List => commands::ledger::list(ledger_path).await,
            LedgerCommands::Show { id } => commands::ledger::show(id, ledger_path).await,
        },
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            let exit = exit_codes::ExitCode::from_anyhow(&err);
            eprintln!("Error: {err:#}");
            std::process::exit(exit.code);
        }
    }
}
