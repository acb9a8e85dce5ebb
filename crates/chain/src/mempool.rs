//! Pending transaction pool.
//!
//! Transactions wait here, in arrival order, until they are drained into the
//! payload of the next block.

use powledger_core::{Hash, HashFunction, Sha256, Transaction};
use std::collections::{HashSet, VecDeque};
use thiserror::Error;

/// Errors that can occur during mempool operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MempoolError {
    #[error("transaction already in mempool")]
    DuplicateTransaction,

    #[error("mempool is full (capacity: {0})")]
    MempoolFull(usize),
}

pub type Result<T> = std::result::Result<T, MempoolError>;

/// Configuration for the mempool.
#[derive(Debug, Clone)]
pub struct MempoolConfig {
    /// Maximum number of transactions in the mempool.
    pub max_transactions: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_transactions: 10_000,
        }
    }
}

/// FIFO transaction pool, deduplicated by transaction digest.
#[derive(Debug)]
pub struct Mempool<H: HashFunction = Sha256> {
    hasher: H,
    config: MempoolConfig,
    /// Transactions in arrival order.
    queue: VecDeque<(Hash, Transaction)>,
    /// Digests of queued transactions for fast lookup.
    tx_hashes: HashSet<Hash>,
}

impl Mempool {
    /// Create a new mempool with default configuration.
    pub fn new() -> Self {
        Self::with_config(Sha256, MempoolConfig::default())
    }
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: HashFunction> Mempool<H> {
    /// Create a new mempool with the given digest and configuration.
    pub fn with_config(hasher: H, config: MempoolConfig) -> Self {
        Self {
            hasher,
            config,
            queue: VecDeque::new(),
            tx_hashes: HashSet::new(),
        }
    }

    /// Get the number of transactions in the mempool.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if the mempool is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Check if a transaction is in the mempool.
    pub fn contains(&self, tx: &Transaction) -> bool {
        self.tx_hashes.contains(&tx.digest(&self.hasher))
    }

    /// Add a transaction to the back of the queue.
    pub fn add(&mut self, tx: Transaction) -> Result<()> {
        let tx_hash = tx.digest(&self.hasher);

        if self.tx_hashes.contains(&tx_hash) {
            return Err(MempoolError::DuplicateTransaction);
        }

        if self.queue.len() >= self.config.max_transactions {
            return Err(MempoolError::MempoolFull(self.config.max_transactions));
        }

        self.tx_hashes.insert(tx_hash);
        self.queue.push_back((tx_hash, tx));
        Ok(())
    }

    /// Look at up to `limit` transactions without removing them.
    pub fn peek(&self, limit: usize) -> Vec<Transaction> {
        self.queue
            .iter()
            .take(limit)
            .map(|(_, tx)| tx.clone())
            .collect()
    }

    /// Remove and return up to `limit` transactions, oldest first.
    pub fn take(&mut self, limit: usize) -> Vec<Transaction> {
        let count = limit.min(self.queue.len());
        self.queue
            .drain(..count)
            .map(|(hash, tx)| {
                self.tx_hashes.remove(&hash);
                tx
            })
            .collect()
    }

    /// Clear all transactions from the mempool.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.tx_hashes.clear();
    }
}
