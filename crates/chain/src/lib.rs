//! Ledger orchestration for powledger.
//!
//! This crate brings the pieces together into an append-only ledger:
//! - **Chain**: genesis creation, linking, mining and full validation
//! - **Mempool**: FIFO pool of pending transactions
//!
//! # Example
//!
//! ```rust
//! use powledger_chain::{Chain, ChainConfig, Mempool};
//! use powledger_consensus::{CancelToken, Difficulty};
//! use powledger_core::{Sha256, Transaction};
//!
//! let config = ChainConfig::with_difficulty(Difficulty::new(1).unwrap());
//! let mut chain = Chain::new(Sha256, config).unwrap();
//!
//! let mut mempool = Mempool::new();
//! mempool.add(Transaction::from("alice pays bob 5")).unwrap();
//! mempool.add(Transaction::from("bob pays carol 2")).unwrap();
//!
//! let payload = mempool.take(10);
//! chain.mine_and_append(payload, &CancelToken::new()).unwrap();
//!
//! assert_eq!(chain.len(), 2);
//! assert!(chain.validate().is_valid());
//! ```

pub mod blockchain;
pub mod mempool;

// Re-export commonly used types
pub use blockchain::{Chain, ChainConfig, ChainError, ChainStats, ChainStatus};
pub use mempool::{Mempool, MempoolConfig, MempoolError};
