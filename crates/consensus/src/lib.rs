//! Proof of Work consensus for powledger.
//!
//! This crate provides:
//! - Difficulty targets and the nonce-searching miner
//! - Cancellation and deadlines for unbounded searches
//! - Block validation (structure, merkle roots, parent links, work)
//!
//! # Example
//!
//! ```rust
//! use powledger_consensus::{BlockValidator, CancelToken, Difficulty, ProofOfWork};
//! use powledger_core::{Block, Sha256, Transaction};
//! use std::time::Duration;
//!
//! let difficulty = Difficulty::new(2).unwrap();
//! let pow = ProofOfWork::new(difficulty);
//!
//! let mut block = Block::genesis(&Sha256, 0, vec![Transaction::from("hello")]);
//! let cancel = CancelToken::new().with_timeout(Duration::from_secs(30));
//! let proof = pow.mine_with_cancel(&Sha256, &mut block, &cancel).unwrap();
//!
//! assert!(block.hash.to_hex().starts_with("00"));
//! assert_eq!(block.nonce, proof.nonce);
//! BlockValidator::validate_work(&Sha256, &block, difficulty).unwrap();
//! ```

pub mod cancel;
pub mod pow;
pub mod validator;

// Re-export commonly used types
pub use cancel::{CancelReason, CancelToken};
pub use pow::{
    Difficulty, MiningError, Proof, ProofOfWork, SearchOutcome, DEFAULT_DIFFICULTY,
    MAX_DIFFICULTY, MAX_MINING_THREADS,
};
pub use validator::{BlockValidator, ValidationError};
