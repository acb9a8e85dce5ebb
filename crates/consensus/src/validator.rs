//! Block validation rules.
//!
//! Every check recomputes from the block's own fields; a stored hash is never
//! taken on trust.

use crate::pow::Difficulty;
use powledger_core::{Block, HashFunction, GENESIS_PREV_HASH};
use thiserror::Error;

/// Errors that can occur during validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("block hash does not match its contents")]
    InvalidHash,

    #[error("block merkle root verification failed")]
    InvalidMerkleRoot,

    #[error("block index mismatch (expected {expected}, got {got})")]
    InvalidIndex { expected: u64, got: u64 },

    #[error("block prev_hash does not match the previous block's hash")]
    InvalidPrevHash,

    #[error("genesis block must carry the zero previous hash")]
    InvalidGenesisPrevHash,

    #[error("block timestamp {got} is earlier than its parent's {parent}")]
    TimestampRegression { parent: u64, got: u64 },

    #[error("block contains no transactions and is not genesis")]
    EmptyPayload,

    #[error("insufficient proof of work (required {required} leading zeros, got {got})")]
    InsufficientWork { required: u32, got: u32 },
}

pub type Result<T> = std::result::Result<T, ValidationError>;

/// Block validator.
pub struct BlockValidator;

impl BlockValidator {
    /// Hash and merkle root both re-derive from the block's fields.
    pub fn validate_structure<H: HashFunction>(hasher: &H, block: &Block) -> Result<()> {
        if !block.verify_hash(hasher) {
            return Err(ValidationError::InvalidHash);
        }

        if !block.verify_merkle_root(hasher) {
            return Err(ValidationError::InvalidMerkleRoot);
        }

        Ok(())
    }

    /// Validate a genesis block: index 0, sentinel prev hash, sound structure.
    pub fn validate_genesis<H: HashFunction>(hasher: &H, block: &Block) -> Result<()> {
        if block.index != 0 {
            return Err(ValidationError::InvalidIndex {
                expected: 0,
                got: block.index,
            });
        }

        if block.prev_hash != GENESIS_PREV_HASH {
            return Err(ValidationError::InvalidGenesisPrevHash);
        }

        Self::validate_structure(hasher, block)
    }

    /// Validate block extends the parent correctly.
    pub fn validate_extends_parent(block: &Block, parent: &Block) -> Result<()> {
        // Check index
        if block.index != parent.index + 1 {
            return Err(ValidationError::InvalidIndex {
                expected: parent.index + 1,
                got: block.index,
            });
        }

        // Check linkage against the parent's stored hash
        if block.prev_hash != parent.hash {
            return Err(ValidationError::InvalidPrevHash);
        }

        if block.timestamp < parent.timestamp {
            return Err(ValidationError::TimestampRegression {
                parent: parent.timestamp,
                got: block.timestamp,
            });
        }

        if block.payload.is_empty() {
            return Err(ValidationError::EmptyPayload);
        }

        Ok(())
    }

    /// Full validation of a non-genesis block against its parent.
    pub fn validate_full<H: HashFunction>(hasher: &H, block: &Block, parent: &Block) -> Result<()> {
        Self::validate_structure(hasher, block)?;
        Self::validate_extends_parent(block, parent)?;
        Ok(())
    }

    /// Structure plus the proof-of-work target.
    pub fn validate_work<H: HashFunction>(
        hasher: &H,
        block: &Block,
        difficulty: Difficulty,
    ) -> Result<()> {
        Self::validate_structure(hasher, block)?;

        let got = block.hash.leading_zero_nibbles();
        if got < difficulty.zeros() {
            return Err(ValidationError::InsufficientWork {
                required: difficulty.zeros(),
                got,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pow::ProofOfWork;
    use powledger_core::{Hash, Sha256, Transaction};

    fn txs(items: &[&str]) -> Vec<Transaction> {
        items.iter().map(|s| Transaction::from(*s)).collect()
    }

    fn genesis() -> Block {
        Block::genesis(&Sha256, 100, vec![])
    }

    fn child(parent: &Block) -> Block {
        Block::new(&Sha256, parent.index + 1, parent.timestamp + 1, txs(&["tx1"]), parent.hash)
    }

    #[test]
    fn test_valid_genesis() {
        assert_eq!(BlockValidator::validate_genesis(&Sha256, &genesis()), Ok(()));
    }

    #[test]
    fn test_genesis_wrong_prev_hash() {
        let block = Block::new(&Sha256, 0, 100, vec![], Hash([1u8; 32]));
        assert_eq!(
            BlockValidator::validate_genesis(&Sha256, &block),
            Err(ValidationError::InvalidGenesisPrevHash)
        );
    }

    #[test]
    fn test_genesis_wrong_index() {
        let block = Block::new(&Sha256, 3, 100, vec![], Hash::ZERO);
        assert!(matches!(
            BlockValidator::validate_genesis(&Sha256, &block),
            Err(ValidationError::InvalidIndex { expected: 0, got: 3 })
        ));
    }

    #[test]
    fn test_valid_child() {
        let parent = genesis();
        let block = child(&parent);
        assert_eq!(BlockValidator::validate_full(&Sha256, &block, &parent), Ok(()));
    }

    #[test]
    fn test_tampered_field_detected() {
        let parent = genesis();
        let mut block = child(&parent);
        block.payload = txs(&["forged"]);
        assert_eq!(
            BlockValidator::validate_full(&Sha256, &block, &parent),
            Err(ValidationError::InvalidHash)
        );
    }

    #[test]
    fn test_rehashed_forgery_caught_by_merkle_root() {
        let parent = genesis();
        let mut block = child(&parent);
        block.payload = txs(&["forged"]);
        block.refresh_hash(&Sha256);
        assert_eq!(
            BlockValidator::validate_structure(&Sha256, &block),
            Err(ValidationError::InvalidMerkleRoot)
        );
    }

    #[test]
    fn test_wrong_index() {
        let parent = genesis();
        let block = Block::new(&Sha256, 2, 101, txs(&["tx1"]), parent.hash);
        assert_eq!(
            BlockValidator::validate_extends_parent(&block, &parent),
            Err(ValidationError::InvalidIndex {
                expected: 1,
                got: 2
            })
        );
    }

    #[test]
    fn test_wrong_prev_hash() {
        let parent = genesis();
        let block = Block::new(&Sha256, 1, 101, txs(&["tx1"]), Hash([5u8; 32]));
        assert_eq!(
            BlockValidator::validate_full(&Sha256, &block, &parent),
            Err(ValidationError::InvalidPrevHash)
        );
    }

    #[test]
    fn test_timestamp_regression() {
        let parent = genesis();
        let block = Block::new(&Sha256, 1, 99, txs(&["tx1"]), parent.hash);
        assert_eq!(
            BlockValidator::validate_extends_parent(&block, &parent),
            Err(ValidationError::TimestampRegression {
                parent: 100,
                got: 99
            })
        );

        let same = Block::new(&Sha256, 1, 100, txs(&["tx1"]), parent.hash);
        assert_eq!(BlockValidator::validate_extends_parent(&same, &parent), Ok(()));
    }

    #[test]
    fn test_empty_non_genesis_rejected() {
        let parent = genesis();
        let block = Block::new(&Sha256, 1, 101, vec![], parent.hash);
        assert_eq!(
            BlockValidator::validate_extends_parent(&block, &parent),
            Err(ValidationError::EmptyPayload)
        );
    }

    #[test]
    fn test_validate_work() {
        let difficulty = Difficulty::new(2).unwrap();
        let mut block = genesis();
        ProofOfWork::new(difficulty)
            .mine(&Sha256, &mut block)
            .unwrap();
        assert_eq!(BlockValidator::validate_work(&Sha256, &block, difficulty), Ok(()));

        let harder = Difficulty::new(20).unwrap();
        assert!(matches!(
            BlockValidator::validate_work(&Sha256, &block, harder),
            Err(ValidationError::InsufficientWork { required: 20, .. })
        ));
    }
}
