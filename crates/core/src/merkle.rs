//! Merkle tree implementation for transaction roots.
//!
//! Leaves are hashed individually, then every level is reduced pairwise
//! until one digest remains. An odd level has its last element duplicated
//! before pairing, and at least one pairing round always runs, so a single
//! leaf `x` yields `H(H(x) || H(x))` rather than `H(x)`.

use crate::hash::{Hash, HashFunction};

/// Root of an empty leaf set.
pub const EMPTY_ROOT: Hash = Hash::ZERO;

/// Compute the merkle root of an ordered list of leaves.
///
/// Returns [`EMPTY_ROOT`] if the list is empty. Leaf order is significant.
pub fn merkle_root<H, L>(hasher: &H, leaves: &[L]) -> Hash
where
    H: HashFunction,
    L: AsRef<[u8]>,
{
    if leaves.is_empty() {
        return EMPTY_ROOT;
    }

    let mut current_level: Vec<Hash> = leaves
        .iter()
        .map(|leaf| hasher.digest(leaf.as_ref()))
        .collect();

    loop {
        pad_odd(&mut current_level);
        current_level = pair_up(hasher, &current_level);
        if current_level.len() == 1 {
            return current_level[0];
        }
    }
}

/// Duplicate the last element of an odd-length level.
fn pad_odd(level: &mut Vec<Hash>) {
    if level.len() % 2 == 1 {
        if let Some(&last) = level.last() {
            level.push(last);
        }
    }
}

/// Hash adjacent pairs left-to-right. `level` must have even length.
fn pair_up<H: HashFunction>(hasher: &H, level: &[Hash]) -> Vec<Hash> {
    level
        .chunks_exact(2)
        .map(|pair| hasher.digest_concat(&[pair[0].as_ref(), pair[1].as_ref()]))
        .collect()
}

/// A merkle tree for efficient proofs.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// All nodes in the tree, level by level (leaves first). Every level
    /// below the root is stored already padded to even length.
    levels: Vec<Vec<Hash>>,
    /// Number of leaves before padding.
    leaf_count: usize,
}

/// A merkle proof for a single leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    /// Digest of the leaf being proven.
    pub leaf: Hash,
    /// Sibling hashes from leaf to root.
    pub siblings: Vec<Hash>,
    /// Direction for each sibling (true = right, false = left).
    pub directions: Vec<bool>,
}

impl MerkleTree {
    /// Build a merkle tree from a list of leaves.
    pub fn new<H, L>(hasher: &H, leaves: &[L]) -> Self
    where
        H: HashFunction,
        L: AsRef<[u8]>,
    {
        if leaves.is_empty() {
            return Self {
                levels: vec![vec![EMPTY_ROOT]],
                leaf_count: 0,
            };
        }

        let mut levels = Vec::new();
        let mut current: Vec<Hash> = leaves
            .iter()
            .map(|leaf| hasher.digest(leaf.as_ref()))
            .collect();

        loop {
            pad_odd(&mut current);
            let next = pair_up(hasher, &current);
            levels.push(current);
            if next.len() == 1 {
                levels.push(next);
                break;
            }
            current = next;
        }

        Self {
            levels,
            leaf_count: leaves.len(),
        }
    }

    /// Get the root of the merkle tree.
    pub fn root(&self) -> Hash {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or(EMPTY_ROOT)
    }

    /// Get the number of leaves in the tree.
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Number of levels including the leaf level and the root.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// The hashed (and padded) leaf level.
    pub fn leaves(&self) -> &[Hash] {
        if self.leaf_count == 0 {
            return &[];
        }
        &self.levels[0]
    }

    /// Generate a proof for the leaf at the given index.
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        if index >= self.leaf_count {
            return None;
        }

        let leaf = self.levels[0][index];
        let mut siblings = Vec::new();
        let mut directions = Vec::new();
        let mut idx = index;

        for level in &self.levels[..self.levels.len() - 1] {
            let is_right = idx % 2 == 0;
            let sibling_idx = if is_right { idx + 1 } else { idx - 1 };

            siblings.push(level[sibling_idx]);
            directions.push(is_right);
            idx /= 2;
        }

        Some(MerkleProof {
            leaf,
            siblings,
            directions,
        })
    }

    /// Verify a merkle proof against this tree's root.
    pub fn verify_proof<H: HashFunction>(&self, hasher: &H, proof: &MerkleProof) -> bool {
        verify_proof(hasher, &self.root(), proof)
    }
}

/// Verify a merkle proof against a given root.
pub fn verify_proof<H: HashFunction>(hasher: &H, root: &Hash, proof: &MerkleProof) -> bool {
    if proof.siblings.len() != proof.directions.len() || proof.siblings.is_empty() {
        return false;
    }

    let mut current = proof.leaf;

    for (sibling, is_right) in proof.siblings.iter().zip(proof.directions.iter()) {
        current = if *is_right {
            hasher.digest_concat(&[current.as_ref(), sibling.as_ref()])
        } else {
            hasher.digest_concat(&[sibling.as_ref(), current.as_ref()])
        };
    }

    current == *root
}
