//! End-to-end ledger scenarios.

use powledger_chain::{Chain, ChainConfig, ChainStatus};
use powledger_consensus::{CancelToken, Difficulty, ValidationError};
use powledger_core::{merkle_root, Hash, HashFunction, Sha256, Transaction, EMPTY_ROOT};

fn txs(items: &[&str]) -> Vec<Transaction> {
    items.iter().map(|s| Transaction::from(*s)).collect()
}

fn difficulty_three() -> ChainConfig {
    ChainConfig::with_difficulty(Difficulty::new(3).unwrap())
}

#[test]
fn test_mined_chain_meets_target() {
    let mut chain = Chain::new(Sha256, difficulty_three()).unwrap();
    chain
        .mine_and_append(txs(&["tx1"]), &CancelToken::new())
        .unwrap();

    assert_eq!(chain.len(), 2);
    assert!(chain.genesis().hash.to_hex().starts_with("000"));
    assert!(chain.tip().hash.to_hex().starts_with("000"));
    assert_eq!(chain.tip().prev_hash, chain.genesis().hash);
    assert_eq!(chain.validate(), ChainStatus::Valid);
    assert_eq!(chain.validate_work(), ChainStatus::Valid);
}

#[test]
fn test_append_then_mine_meets_target() {
    let mut chain = Chain::new(Sha256, difficulty_three()).unwrap();
    let pow = chain.config().pow();

    let block = chain.append(txs(&["tx1"])).unwrap();
    pow.mine(&Sha256, block).unwrap();

    assert!(chain.tip().hash.to_hex().starts_with("000"));
    assert!(chain.validate().is_valid());
}

#[test]
fn test_tampered_link_reported_at_its_position() {
    let mut chain = Chain::new(Sha256, difficulty_three()).unwrap();
    chain
        .mine_and_append(txs(&["tx1"]), &CancelToken::new())
        .unwrap();

    let mut blocks = chain.into_blocks();
    blocks[1].prev_hash = Hash([0x11; 32]);
    let tampered = Chain::from_blocks(Sha256, difficulty_three(), blocks).unwrap();

    let status = tampered.validate();
    assert!(!status.is_valid());
    assert_eq!(status.first_invalid_index(), Some(1));
}

#[test]
fn test_rehashed_link_tampering_still_detected() {
    let mut chain = Chain::new(Sha256, difficulty_three()).unwrap();
    let cancel = CancelToken::new();
    chain.mine_and_append(txs(&["tx1"]), &cancel).unwrap();
    chain.mine_and_append(txs(&["tx2"]), &cancel).unwrap();

    // Re-hashing a forged block does not repair the link its successor holds.
    let mut blocks = chain.into_blocks();
    blocks[1].payload = txs(&["forged"]);
    blocks[1].merkle_root = merkle_root(&Sha256, &blocks[1].payload);
    blocks[1].refresh_hash(&Sha256);
    let tampered = Chain::from_blocks(Sha256, difficulty_three(), blocks).unwrap();

    assert_eq!(
        tampered.validate(),
        ChainStatus::Invalid {
            index: 2,
            reason: ValidationError::InvalidPrevHash
        }
    );
}

#[test]
fn test_empty_merkle_root_is_sentinel() {
    let empty: Vec<Transaction> = Vec::new();
    assert_eq!(merkle_root(&Sha256, &empty), EMPTY_ROOT);
    assert_eq!(EMPTY_ROOT, Hash::ZERO);
}

#[test]
fn test_single_leaf_root_pairs_with_itself() {
    let leaf = Sha256.digest(b"x");
    let expected = Sha256.digest_concat(&[leaf.as_ref(), leaf.as_ref()]);
    assert_eq!(merkle_root(&Sha256, &[b"x"]), expected);
}

#[test]
fn test_merkle_root_is_order_sensitive() {
    let forward = merkle_root(&Sha256, &txs(&["a", "b", "c"]));
    let reversed = merkle_root(&Sha256, &txs(&["c", "b", "a"]));
    assert_ne!(forward, reversed);
}

#[test]
fn test_cancelled_mining_leaves_chain_untouched() {
    let mut chain = Chain::new(
        Sha256,
        ChainConfig {
            difficulty: Difficulty::new(64).unwrap(),
            genesis_difficulty: None,
            mining_threads: 2,
        },
    )
    .unwrap();

    let cancel = CancelToken::new();
    cancel.cancel();
    assert!(chain.mine_and_append(txs(&["tx1"]), &cancel).is_err());
    assert_eq!(chain.len(), 1);
    assert!(chain.validate().is_valid());
}
