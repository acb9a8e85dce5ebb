//! Core ledger primitives for powledger.
//!
//! This crate provides the fundamental types used throughout the ledger:
//! - Digests and the pluggable hash function
//! - Transaction payloads
//! - Merkle trees
//! - Blocks

pub mod block;
pub mod hash;
pub mod merkle;
pub mod transaction;

// Re-export commonly used types at the crate root
pub use block::{current_timestamp, Block, GENESIS_PREV_HASH};
pub use hash::{hash, hash_concat, Blake3, Hash, HashAlgorithm, HashFunction, Sha256, H256};
pub use merkle::{merkle_root, verify_proof, MerkleProof, MerkleTree, EMPTY_ROOT};
pub use transaction::{Transaction, TransactionError};
