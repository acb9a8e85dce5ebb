//! Validate the stored linear ledger.

use super::ledger_store;
use crate::config::LedgerConfig;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use powledger_chain::ChainStatus;
use std::path::Path;

#[derive(Args)]
pub struct ValidateArgs {
    /// Also require every block to meet the configured difficulty
    #[arg(long)]
    work: bool,
}

/// Returns whether the ledger is intact.
pub fn run(args: ValidateArgs, data_dir: &Path) -> Result<bool> {
    let config = LedgerConfig::load(data_dir)?;
    let store = ledger_store(data_dir)?;

    if !store.is_initialized()? {
        println!("No blocks found in ledger");
        return Ok(true);
    }

    let chain = store
        .load_chain(config.algorithm, config.chain_config()?)
        .context("Failed to load ledger")?;

    match store.validate(&chain, args.work)? {
        ChainStatus::Valid => {
            println!(
                "{}  Ledger is valid ({} blocks)",
                "✓".green().bold(),
                chain.len().to_string().bright_cyan()
            );
            Ok(true)
        }
        ChainStatus::Invalid { index, reason } => {
            println!(
                "{}  Ledger is corrupted at block {}",
                "✗".red().bold(),
                index.to_string().bright_cyan()
            );
            println!("    Reason: {}", reason.to_string().bright_black());
            Ok(false)
        }
    }
}
