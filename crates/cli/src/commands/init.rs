//! Initialize ledger command.

use super::{ledger_store, print_block};
use crate::config::LedgerConfig;
use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use powledger_chain::Chain;
use powledger_core::HashAlgorithm;
use std::path::Path;

#[derive(Args)]
pub struct InitArgs {
    /// Leading zero hex characters required of every block hash
    #[arg(long, default_value = "3")]
    difficulty: u32,

    /// Digest used for blocks and Merkle roots (sha256 or blake3)
    #[arg(long, default_value = "sha256")]
    algorithm: HashAlgorithm,

    /// Worker threads used while mining
    #[arg(long, default_value = "1")]
    threads: usize,
}

pub fn run(args: InitArgs, data_dir: &Path) -> Result<()> {
    println!("{}", "Initializing powledger...".bold().cyan());
    println!();

    let store = ledger_store(data_dir)?;
    if store.is_initialized()? {
        bail!(
            "Ledger already initialized in {}",
            store.dir().path().display()
        );
    }

    let config = LedgerConfig {
        difficulty: args.difficulty,
        algorithm: args.algorithm,
        mining_threads: args.threads,
    };
    let chain_config = config.chain_config()?;

    println!("{}  Created data directory", "✓".green().bold());

    println!(
        "   Mining genesis block (difficulty {})...",
        config.difficulty.to_string().bright_cyan()
    );
    let chain = Chain::new(config.algorithm, chain_config)
        .context("Failed to create genesis block")?;
    store
        .save_new_blocks(&chain)
        .context("Failed to save genesis block")?;

    println!();
    println!("{}  Created genesis block", "✓".green().bold());
    print_block(chain.genesis());

    let config_file = config.save(data_dir)?;
    println!();
    println!(
        "{}  Saved config to: {}",
        "✓".green().bold(),
        config_file.display().to_string().bright_black()
    );

    println!();
    println!("{}", "Ledger initialized successfully!".green().bold());
    println!();
    println!("Next steps:");
    println!(
        "  • Use {} to mine a block",
        "powledger add <TX>...".bright_cyan()
    );
    println!(
        "  • Use {} to check for tampering",
        "powledger validate".bright_cyan()
    );

    Ok(())
}
