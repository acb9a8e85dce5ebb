//! Tree-shaped ledger commands.

use super::{cancel_token, collect_payload, print_block, tree_store};
use crate::config::LedgerConfig;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use powledger_consensus::ProofOfWork;
use powledger_storage::{StorageError, TreeStatus};
use std::path::Path;

#[derive(Args)]
pub struct TreeArgs {
    #[command(subcommand)]
    command: TreeCommand,
}

#[derive(Subcommand)]
enum TreeCommand {
    /// Mine a block under the next block with a free child slot
    Add {
        /// Transactions to include, in order
        #[arg(required = true)]
        transactions: Vec<String>,

        /// Give up mining after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Draw the tree
    Show,
    /// Check the tree for tampering
    Validate,
}

/// Returns false only when validation finds a corrupted tree.
pub fn run(args: TreeArgs, data_dir: &Path) -> Result<bool> {
    match args.command {
        TreeCommand::Add {
            transactions,
            timeout_secs,
        } => add(data_dir, transactions, timeout_secs),
        TreeCommand::Show => show(data_dir).map(|_| true),
        TreeCommand::Validate => validate(data_dir),
    }
}

fn add(data_dir: &Path, transactions: Vec<String>, timeout_secs: Option<u64>) -> Result<bool> {
    let config = LedgerConfig::load(data_dir)?;
    let store = tree_store(data_dir)?;
    let pow = ProofOfWork::new(config.difficulty()?);
    let threads = config.mining_threads()?;

    let payload = collect_payload(transactions);
    let cancel = cancel_token(timeout_secs);

    println!(
        "   Mining tree block (difficulty {})...",
        config.difficulty.to_string().bright_cyan()
    );
    let record = match store.add(&config.algorithm, &pow, payload, threads, &cancel) {
        Ok(record) => record,
        Err(StorageError::Corrupted { index }) => {
            println!(
                "{}  Tree is corrupted at block {}",
                "✗".red().bold(),
                index.to_string().bright_cyan()
            );
            println!("    New block will not be added to preserve ledger integrity");
            return Ok(false);
        }
        Err(e) => return Err(e).context("Failed to add block to tree"),
    };

    println!();
    println!("{}  Block added to tree", "✓".green().bold());
    print_block(&record.block());
    if let Some(parent) = record.parent_hash {
        println!("  Parent:        {}", parent.to_hex().bright_black());
    }

    println!();
    show(data_dir)?;
    Ok(true)
}

fn show(data_dir: &Path) -> Result<()> {
    let store = tree_store(data_dir)?;
    if !store.is_initialized()? {
        println!("No blocks found in tree");
        return Ok(());
    }

    println!("{}", "Ledger Tree:".bold().cyan());
    print!("{}", store.render()?);
    Ok(())
}

fn validate(data_dir: &Path) -> Result<bool> {
    let config = LedgerConfig::load(data_dir)?;
    let store = tree_store(data_dir)?;

    match store.validate(&config.algorithm)? {
        TreeStatus::Valid => {
            println!("{}  Tree is valid", "✓".green().bold());
            Ok(true)
        }
        TreeStatus::Invalid { index, reason } => {
            println!(
                "{}  Tree is corrupted at block {}",
                "✗".red().bold(),
                index.to_string().bright_cyan()
            );
            println!("    Reason: {}", reason.to_string().bright_black());
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use powledger_consensus::MAX_MINING_THREADS;
    use powledger_core::HashAlgorithm;
    use tempfile::TempDir;

    fn setup_with_threads(mining_threads: usize) -> TempDir {
        let tmp = TempDir::new().unwrap();
        LedgerConfig {
            difficulty: 1,
            algorithm: HashAlgorithm::Sha256,
            mining_threads,
        }
        .save(tmp.path())
        .unwrap();
        tmp
    }

    fn setup() -> TempDir {
        setup_with_threads(1)
    }

    #[test]
    fn test_tree_add_and_validate() {
        let tmp = setup();
        for tx in ["a", "b", "c"] {
            assert!(add(tmp.path(), vec![tx.to_string()], None).unwrap());
        }

        let store = tree_store(tmp.path()).unwrap();
        assert_eq!(store.highest_index().unwrap(), Some(3));
        assert!(validate(tmp.path()).unwrap());
    }

    #[test]
    fn test_tree_add_uses_configured_threads() {
        let tmp = setup_with_threads(4);
        for tx in ["a", "b"] {
            assert!(add(tmp.path(), vec![tx.to_string()], None).unwrap());
        }
        assert!(validate(tmp.path()).unwrap());

        let tmp = setup_with_threads(MAX_MINING_THREADS + 1);
        assert!(add(tmp.path(), vec!["a".to_string()], None).is_err());
        assert!(!tree_store(tmp.path()).unwrap().is_initialized().unwrap());
    }

    #[test]
    fn test_tree_add_refuses_corrupted_tree() {
        let tmp = setup();
        add(tmp.path(), vec!["a".to_string()], None).unwrap();

        let store = tree_store(tmp.path()).unwrap();
        let mut record = store.records().unwrap().pop().unwrap();
        let path = store.dir().block_path(record.index, &record.hash);
        record.timestamp += 1;
        store.dir().overwrite(&path, &record).unwrap();

        assert!(!validate(tmp.path()).unwrap());
        assert!(!add(tmp.path(), vec!["b".to_string()], None).unwrap());
        assert_eq!(store.highest_index().unwrap(), Some(1));
    }
}
