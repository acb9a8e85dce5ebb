//! Block inspection commands.

use super::{ledger_store, print_block};
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::Path;

#[derive(Args)]
pub struct ShowArgs {
    /// Number of blocks to show
    #[arg(short, long, default_value = "10")]
    count: usize,
}

#[derive(Args)]
pub struct InfoArgs {
    /// Block index
    index: u64,
}

pub fn show(args: ShowArgs, data_dir: &Path) -> Result<()> {
    let store = ledger_store(data_dir)?;
    let blocks = store.recent_blocks(args.count)?;

    if blocks.is_empty() {
        println!("No blocks found in ledger. Did you run 'powledger init'?");
        return Ok(());
    }

    println!();
    println!("{}", "Recent Blocks:".bold().cyan());
    println!();

    for block in &blocks {
        println!(
            "  {} {} {} {}",
            format!("#{}", block.index).bright_black(),
            block.hash.to_hex()[..16].bright_yellow(),
            format!("<- {}", block.prev_hash.short_hex()).bright_black(),
            format!("({} txs)", block.tx_count()).bright_black()
        );
    }

    println!();
    print!("{}", store.render_linear()?);
    Ok(())
}

pub fn info(args: InfoArgs, data_dir: &Path) -> Result<()> {
    let store = ledger_store(data_dir)?;
    let block = store
        .get_block(args.index)?
        .with_context(|| format!("Block {} not found", args.index))?;

    println!();
    println!("{}", "Block Information:".bold().cyan());
    println!();
    print_block(&block);
    println!();

    if !block.payload.is_empty() {
        println!("{}", "Transactions:".bold());
        println!();
        for (i, tx) in block.payload.iter().enumerate() {
            println!("  {} {}", format!("{}.", i + 1).bright_black(), tx);
        }
        println!();
    }

    Ok(())
}
