//! Block structure and digest computation.

use crate::hash::{Hash, HashFunction};
use crate::merkle::{merkle_root, MerkleTree};
use crate::transaction::Transaction;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Previous-hash sentinel carried by every genesis block.
pub const GENESIS_PREV_HASH: Hash = Hash::ZERO;

/// A block: an indexed, timestamped batch of transactions linked to its
/// predecessor by hash.
///
/// `hash` always covers every other field. The only field expected to change
/// after construction is `nonce`, and every change goes through
/// [`Block::commit`] or [`Block::refresh_hash`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Position in the chain (0 for genesis).
    pub index: u64,
    /// Digest of this block.
    pub hash: Hash,
    /// Digest of the previous block.
    #[serde(rename = "previous_hash")]
    pub prev_hash: Hash,
    /// Creation time, milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Ordered transactions in this block.
    #[serde(rename = "data")]
    pub payload: Vec<Transaction>,
    /// Proof-of-work nonce.
    pub nonce: u64,
    /// Merkle root of `payload`.
    pub merkle_root: Hash,
}

/// Canonical field order for the block digest. Bincode writes fixed-width
/// little-endian integers, length-prefixed strings and raw digest bytes.
#[derive(Serialize)]
struct Preimage<'a> {
    index: u64,
    timestamp: u64,
    payload: &'a [Transaction],
    prev_hash: &'a Hash,
    nonce: u64,
    merkle_root: &'a Hash,
}

impl Block {
    /// Create a new unmined block (nonce 0).
    pub fn new<H: HashFunction>(
        hasher: &H,
        index: u64,
        timestamp: u64,
        payload: Vec<Transaction>,
        prev_hash: Hash,
    ) -> Self {
        Self::with_nonce(hasher, index, timestamp, payload, prev_hash, 0)
    }

    /// Create a block with an explicit starting nonce.
    pub fn with_nonce<H: HashFunction>(
        hasher: &H,
        index: u64,
        timestamp: u64,
        payload: Vec<Transaction>,
        prev_hash: Hash,
        nonce: u64,
    ) -> Self {
        let merkle_root = merkle_root(hasher, &payload);
        let mut block = Self {
            index,
            hash: Hash::ZERO,
            prev_hash,
            timestamp,
            payload,
            nonce,
            merkle_root,
        };
        block.refresh_hash(hasher);
        block
    }

    /// Create the genesis block.
    pub fn genesis<H: HashFunction>(hasher: &H, timestamp: u64, payload: Vec<Transaction>) -> Self {
        Self::new(hasher, 0, timestamp, payload, GENESIS_PREV_HASH)
    }

    /// Canonical bytes hashed for the given nonce.
    pub fn preimage(&self, nonce: u64) -> Vec<u8> {
        let preimage = Preimage {
            index: self.index,
            timestamp: self.timestamp,
            payload: &self.payload,
            prev_hash: &self.prev_hash,
            nonce,
            merkle_root: &self.merkle_root,
        };
        bincode::serialize(&preimage).expect("serialization should not fail")
    }

    /// Digest this block would have with `nonce`, without touching it.
    pub fn attempt<H: HashFunction>(&self, hasher: &H, nonce: u64) -> Hash {
        hasher.digest(&self.preimage(nonce))
    }

    /// Recompute the digest from the stored fields.
    pub fn compute_hash<H: HashFunction>(&self, hasher: &H) -> Hash {
        self.attempt(hasher, self.nonce)
    }

    /// Recompute and store the digest.
    pub fn refresh_hash<H: HashFunction>(&mut self, hasher: &H) {
        self.hash = self.compute_hash(hasher);
    }

    /// Install an accepted nonce together with the digest it produced.
    pub fn commit(&mut self, nonce: u64, hash: Hash) {
        self.nonce = nonce;
        self.hash = hash;
    }

    /// Check that the stored digest matches the fields.
    pub fn verify_hash<H: HashFunction>(&self, hasher: &H) -> bool {
        self.compute_hash(hasher) == self.hash
    }

    /// Verify the merkle root matches the transactions.
    pub fn verify_merkle_root<H: HashFunction>(&self, hasher: &H) -> bool {
        merkle_root(hasher, &self.payload) == self.merkle_root
    }

    /// Full merkle tree over the payload, for inclusion proofs.
    pub fn merkle_tree<H: HashFunction>(&self, hasher: &H) -> MerkleTree {
        MerkleTree::new(hasher, &self.payload)
    }

    /// Check if this is the genesis block.
    pub fn is_genesis(&self) -> bool {
        self.index == 0 && self.prev_hash == GENESIS_PREV_HASH
    }

    /// Get the number of transactions in this block.
    pub fn tx_count(&self) -> usize {
        self.payload.len()
    }

    /// Whether the stored digest meets a leading-zero target.
    pub fn meets_difficulty(&self, zeros: u32) -> bool {
        self.hash.meets_difficulty(zeros)
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn current_timestamp() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}
