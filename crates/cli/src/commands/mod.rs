//! CLI commands module.

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::Subcommand;
use colored::Colorize;
use powledger_chain::Mempool;
use powledger_consensus::CancelToken;
use powledger_core::{Block, Transaction};
use powledger_storage::{LedgerStore, TreeStore};
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;
use tracing::warn;

mod add;
mod block;
mod init;
mod tree;
mod validate;

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new ledger
    Init(init::InitArgs),
    /// Mine a block of transactions onto the ledger
    Add(add::AddArgs),
    /// Check the stored ledger for tampering
    Validate(validate::ValidateArgs),
    /// List recent blocks
    Show(block::ShowArgs),
    /// Show detailed block information
    Info(block::InfoArgs),
    /// Tree-shaped ledger operations
    Tree(tree::TreeArgs),
}

pub fn run(cmd: Commands, data_dir: &Path) -> Result<ExitCode> {
    match cmd {
        Commands::Init(args) => init::run(args, data_dir)?,
        Commands::Add(args) => add::run(args, data_dir)?,
        Commands::Validate(args) => return Ok(exit_code(validate::run(args, data_dir)?)),
        Commands::Show(args) => block::show(args, data_dir)?,
        Commands::Info(args) => block::info(args, data_dir)?,
        Commands::Tree(args) => return Ok(exit_code(tree::run(args, data_dir)?)),
    }
    Ok(ExitCode::SUCCESS)
}

fn exit_code(valid: bool) -> ExitCode {
    if valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

// Helper function to open the linear ledger
fn ledger_store(data_dir: &Path) -> Result<LedgerStore> {
    LedgerStore::open(data_dir.join(LedgerStore::DEFAULT_DIR))
        .with_context(|| format!("Failed to open ledger in {:?}", data_dir))
}

// Helper function to open the tree ledger
fn tree_store(data_dir: &Path) -> Result<TreeStore> {
    TreeStore::open(data_dir.join(TreeStore::DEFAULT_DIR))
        .with_context(|| format!("Failed to open tree ledger in {:?}", data_dir))
}

/// A cancel token that expires after `timeout_secs`, if given.
fn cancel_token(timeout_secs: Option<u64>) -> CancelToken {
    match timeout_secs {
        Some(secs) => CancelToken::new().with_timeout(Duration::from_secs(secs)),
        None => CancelToken::new(),
    }
}

/// Queue the given transactions in arrival order, dropping repeats.
fn collect_payload(transactions: Vec<String>) -> Vec<Transaction> {
    let mut mempool = Mempool::new();
    for tx in transactions {
        let tx = Transaction::new(tx);
        if let Err(e) = mempool.add(tx.clone()) {
            warn!(tx = %tx, "skipping transaction: {}", e);
        }
    }
    let count = mempool.len();
    mempool.take(count)
}

fn format_timestamp(millis: u64) -> String {
    i64::try_from(millis)
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| millis.to_string())
}

fn print_block(block: &Block) {
    println!("  Index:         {}", block.index.to_string().bright_cyan());
    println!("  Hash:          {}", block.hash.to_hex().bright_yellow());
    println!(
        "  Previous Hash: {}",
        block.prev_hash.to_hex().bright_black()
    );
    println!(
        "  Timestamp:     {} {}",
        block.timestamp.to_string().bright_black(),
        format!("({})", format_timestamp(block.timestamp)).bright_black()
    );
    println!("  Nonce:         {}", block.nonce.to_string().bright_black());
    println!(
        "  Merkle Root:   {}",
        block.merkle_root.to_hex().bright_black()
    );
    println!(
        "  Transactions:  {}",
        block.tx_count().to_string().bright_cyan()
    );
}
