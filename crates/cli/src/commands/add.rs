//! Mine a block of transactions onto the linear ledger.

use super::{cancel_token, collect_payload, ledger_store, print_block};
use crate::config::LedgerConfig;
use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use powledger_chain::{Chain, ChainStatus};
use std::path::Path;

#[derive(Args)]
pub struct AddArgs {
    /// Transactions to include, in order
    #[arg(required = true)]
    transactions: Vec<String>,

    /// Give up mining after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
}

pub fn run(args: AddArgs, data_dir: &Path) -> Result<()> {
    let config = LedgerConfig::load(data_dir)?;
    let store = ledger_store(data_dir)?;

    let mut chain = if store.is_initialized()? {
        let chain = store
            .load_chain(config.algorithm, config.chain_config()?)
            .context("Failed to load ledger")?;

        if let ChainStatus::Invalid { index, reason } = store.validate(&chain, false)? {
            println!(
                "{}  Ledger is corrupted at block {}: {}",
                "✗".red().bold(),
                index.to_string().bright_cyan(),
                reason
            );
            bail!("New block will not be added to preserve ledger integrity");
        }
        println!("{}  Ledger integrity verified", "✓".green().bold());
        chain
    } else {
        println!("{}", "Creating new ledger...".bold().cyan());
        Chain::new(config.algorithm, config.chain_config()?)
            .context("Failed to create genesis block")?
    };

    let payload = collect_payload(args.transactions);
    let cancel = cancel_token(args.timeout_secs);

    println!(
        "   Mining block {} (difficulty {})...",
        chain.len().to_string().bright_cyan(),
        config.difficulty.to_string().bright_cyan()
    );
    let block = chain
        .mine_and_append(payload, &cancel)
        .context("Failed to mine block")?
        .clone();

    store
        .save_new_blocks(&chain)
        .context("Failed to save block")?;

    println!();
    println!("{}  Block added", "✓".green().bold());
    print_block(&block);
    for tx in &block.payload {
        println!("    {}", tx);
    }

    println!();
    println!("{}", "Ledger:".bold().cyan());
    print!("{}", store.render_linear()?);

    Ok(())
}
