//! Binary-tree ledger storage.
//!
//! Each block records the parent it extends and up to two children. New
//! blocks are attached breadth-first: the lowest-index block with a free
//! child slot becomes the parent. A block's `previous_hash` is its parent's
//! hash, so every root-to-leaf path is an ordinary hash-linked chain.

use crate::db::{BlockDir, Result, StorageError};
use powledger_consensus::{BlockValidator, CancelToken, ProofOfWork, ValidationError};
use powledger_core::{current_timestamp, Block, Hash, HashFunction, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// A block plus its position in the tree, as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeRecord {
    pub index: u64,
    pub hash: Hash,
    pub previous_hash: Hash,
    pub timestamp: u64,
    pub data: Vec<Transaction>,
    pub nonce: u64,
    pub merkle_root: Hash,
    /// `None` only for genesis.
    pub parent_hash: Option<Hash>,
    pub left_child: Option<Hash>,
    pub right_child: Option<Hash>,
}

impl TreeRecord {
    pub fn new(block: Block, parent_hash: Option<Hash>) -> Self {
        Self {
            index: block.index,
            hash: block.hash,
            previous_hash: block.prev_hash,
            timestamp: block.timestamp,
            data: block.payload,
            nonce: block.nonce,
            merkle_root: block.merkle_root,
            parent_hash,
            left_child: None,
            right_child: None,
        }
    }

    /// The block fields alone.
    pub fn block(&self) -> Block {
        Block {
            index: self.index,
            hash: self.hash,
            prev_hash: self.previous_hash,
            timestamp: self.timestamp,
            payload: self.data.clone(),
            nonce: self.nonce,
            merkle_root: self.merkle_root,
        }
    }

    pub fn has_free_slot(&self) -> bool {
        self.left_child.is_none() || self.right_child.is_none()
    }

    /// Whether `hash` is listed as one of this block's children.
    pub fn lists_child(&self, hash: &Hash) -> bool {
        self.left_child.as_ref() == Some(hash) || self.right_child.as_ref() == Some(hash)
    }

    /// Children in left, right order.
    pub fn children(&self) -> impl Iterator<Item = Hash> + '_ {
        self.left_child.iter().chain(self.right_child.iter()).copied()
    }

    /// Put `child` in the first free slot.
    fn adopt(&mut self, child: Hash) -> bool {
        if self.left_child.is_none() {
            self.left_child = Some(child);
        } else if self.right_child.is_none() {
            self.right_child = Some(child);
        } else {
            return false;
        }
        true
    }
}

/// Why a tree failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeFault {
    #[error("{0}")]
    Block(#[from] ValidationError),

    #[error("genesis block must not have a parent")]
    GenesisHasParent,

    #[error("block has no parent")]
    MissingParentLink,

    #[error("parent hash does not match previous hash")]
    ParentMismatch,

    #[error("parent block does not exist")]
    ParentNotFound,

    #[error("parent block does not list this block as a child")]
    NotListedByParent,

    #[error("child block does not point back to this block")]
    ChildMismatch,

    #[error("block is stored in a file named for index {file}")]
    FileIndexMismatch { file: u64 },

    #[error("block is stored in more than one file")]
    DuplicateBlock,
}

/// Outcome of a full tree check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeStatus {
    Valid,
    Invalid { index: u64, reason: TreeFault },
}

impl TreeStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, TreeStatus::Valid)
    }

    pub fn first_invalid_index(&self) -> Option<u64> {
        match self {
            TreeStatus::Valid => None,
            TreeStatus::Invalid { index, .. } => Some(*index),
        }
    }
}

/// Manages the block files of a tree-shaped ledger.
#[derive(Debug, Clone)]
pub struct TreeStore {
    dir: BlockDir,
}

impl TreeStore {
    /// Directory name used under a data directory.
    pub const DEFAULT_DIR: &'static str = "dlt_tree";

    /// Open (or create) a tree directory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            dir: BlockDir::open(path)?,
        })
    }

    pub fn dir(&self) -> &BlockDir {
        &self.dir
    }

    /// All records with their file paths, sorted by index.
    fn entries(&self) -> Result<Vec<(PathBuf, TreeRecord)>> {
        self.dir
            .entries()?
            .into_iter()
            .map(|file| {
                let record = self.dir.read(&file.path)?;
                Ok((file.path, record))
            })
            .collect()
    }

    /// All records, sorted by index.
    pub fn records(&self) -> Result<Vec<TreeRecord>> {
        self.dir.list()
    }

    pub fn is_initialized(&self) -> Result<bool> {
        Ok(!self.dir.is_empty()?)
    }

    pub fn highest_index(&self) -> Result<Option<u64>> {
        self.dir.highest_index()
    }

    // =========================================================================
    // Building the Tree
    // =========================================================================

    /// Store the root of an empty tree.
    pub fn init_genesis(&self, genesis: &Block) -> Result<TreeRecord> {
        if genesis.index != 0 {
            return Err(ValidationError::InvalidIndex {
                expected: 0,
                got: genesis.index,
            }
            .into());
        }
        if self.is_initialized()? {
            return Err(StorageError::AlreadyInitialized);
        }

        let record = TreeRecord::new(genesis.clone(), None);
        self.dir.write(record.index, &record.hash, &record)?;
        info!(hash = %genesis.hash.short_hex(), "saved tree genesis");
        Ok(record)
    }

    /// The block the next child attaches to: lowest index with a free slot.
    pub fn next_parent(&self) -> Result<Option<TreeRecord>> {
        Ok(self
            .records()?
            .into_iter()
            .find(TreeRecord::has_free_slot))
    }

    /// Store `block` as a child of `parent` and fill the parent's first free
    /// slot.
    pub fn attach(&self, block: &Block, parent: &Hash) -> Result<TreeRecord> {
        if block.prev_hash != *parent {
            return Err(ValidationError::InvalidPrevHash.into());
        }

        let (parent_path, mut parent_record) = self
            .entries()?
            .into_iter()
            .find(|(_, record)| record.hash == *parent)
            .ok_or(StorageError::ParentNotFound(*parent))?;

        if !parent_record.adopt(block.hash) {
            return Err(StorageError::ParentFull(*parent));
        }

        let record = TreeRecord::new(block.clone(), Some(*parent));
        self.dir.write(record.index, &record.hash, &record)?;
        self.dir.overwrite(&parent_path, &parent_record)?;

        info!(
            index = record.index,
            parent = parent_record.index,
            "attached block to tree"
        );
        Ok(record)
    }

    /// Validate, pick a parent, then mine and attach a block holding
    /// `payload` on `threads` workers. An empty store gets a mined genesis
    /// block first.
    pub fn add<H: HashFunction>(
        &self,
        hasher: &H,
        pow: &ProofOfWork,
        payload: Vec<Transaction>,
        threads: usize,
        cancel: &CancelToken,
    ) -> Result<TreeRecord> {
        if payload.is_empty() {
            return Err(ValidationError::EmptyPayload.into());
        }

        if let TreeStatus::Invalid { index, reason } = self.validate(hasher)? {
            warn!(index, %reason, "refusing to extend corrupted tree");
            return Err(StorageError::Corrupted { index });
        }

        if !self.is_initialized()? {
            let mut genesis = Block::genesis(hasher, current_timestamp(), Vec::new());
            pow.mine_parallel(hasher, &mut genesis, threads, cancel)?;
            self.init_genesis(&genesis)?;
        }

        let parent = self.next_parent()?.ok_or(StorageError::NoParentAvailable)?;
        let index = match self.highest_index()? {
            Some(highest) => highest
                .checked_add(1)
                .ok_or(StorageError::IndexOverflow(highest))?,
            None => 0,
        };

        let mut block = Block::new(
            hasher,
            index,
            current_timestamp().max(parent.timestamp),
            payload,
            parent.hash,
        );
        pow.mine_parallel(hasher, &mut block, threads, cancel)?;

        self.attach(&block, &parent.hash)
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Re-derive every block and check parent and child links both ways.
    /// Blocks are checked in index order. Each file name must carry the
    /// index stored inside it, and no block may be stored twice.
    pub fn validate<H: HashFunction>(&self, hasher: &H) -> Result<TreeStatus> {
        let files = self.dir.entries()?;
        let records = files
            .iter()
            .map(|file| self.dir.read::<TreeRecord>(&file.path))
            .collect::<Result<Vec<_>>>()?;

        let invalid = |record: &TreeRecord, reason: TreeFault| -> Result<TreeStatus> {
            warn!(index = record.index, %reason, "tree validation failed");
            Ok(TreeStatus::Invalid {
                index: record.index,
                reason,
            })
        };

        let mut by_hash: HashMap<Hash, &TreeRecord> = HashMap::with_capacity(records.len());
        for (file, record) in files.iter().zip(&records) {
            if file.index != record.index {
                return invalid(record, TreeFault::FileIndexMismatch { file: file.index });
            }
            if by_hash.insert(record.hash, record).is_some() {
                return invalid(record, TreeFault::DuplicateBlock);
            }
        }

        for record in &records {
            if let Err(reason) = BlockValidator::validate_structure(hasher, &record.block()) {
                return invalid(record, reason.into());
            }

            match record.parent_hash {
                None if record.index == 0 => {
                    if let Err(reason) = BlockValidator::validate_genesis(hasher, &record.block())
                    {
                        return invalid(record, reason.into());
                    }
                }
                None => return invalid(record, TreeFault::MissingParentLink),
                Some(_) if record.index == 0 => {
                    return invalid(record, TreeFault::GenesisHasParent)
                }
                Some(parent_hash) => {
                    if parent_hash != record.previous_hash {
                        return invalid(record, TreeFault::ParentMismatch);
                    }
                    let Some(parent) = by_hash.get(&parent_hash) else {
                        return invalid(record, TreeFault::ParentNotFound);
                    };
                    if !parent.lists_child(&record.hash) {
                        return invalid(record, TreeFault::NotListedByParent);
                    }
                }
            }
        }

        for record in &records {
            for child in record.children() {
                if let Some(child) = by_hash.get(&child) {
                    if child.parent_hash != Some(record.hash) {
                        return invalid(record, TreeFault::ChildMismatch);
                    }
                }
            }
        }

        Ok(TreeStatus::Valid)
    }

    // =========================================================================
    // Display
    // =========================================================================

    /// Draw the tree from genesis down.
    pub fn render(&self) -> Result<String> {
        let records = self.records()?;
        let genesis = records
            .iter()
            .find(|record| record.index == 0)
            .ok_or(StorageError::NotInitialized)?;
        let by_hash: HashMap<Hash, &TreeRecord> =
            records.iter().map(|record| (record.hash, record)).collect();

        let mut out = String::new();
        let mut seen = HashSet::new();
        render_subtree(&by_hash, genesis, "", true, &mut seen, &mut out);
        Ok(out)
    }
}

fn render_subtree(
    by_hash: &HashMap<Hash, &TreeRecord>,
    record: &TreeRecord,
    prefix: &str,
    is_last: bool,
    seen: &mut HashSet<Hash>,
    out: &mut String,
) {
    // Tampered links can form cycles.
    if !seen.insert(record.hash) {
        return;
    }

    let connector = if is_last { "└── " } else { "├── " };
    let _ = writeln!(
        out,
        "{}{}Block ({}) [{}...]",
        prefix,
        connector,
        record.index,
        record.hash.short_hex()
    );

    let child_prefix = format!("{}{}", prefix, if is_last { "    " } else { "│   " });
    let children: Vec<&TreeRecord> = record
        .children()
        .filter_map(|hash| by_hash.get(&hash).copied())
        .collect();
    for (i, child) in children.iter().enumerate() {
        let last = i + 1 == children.len();
        render_subtree(by_hash, child, &child_prefix, last, seen, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use powledger_consensus::Difficulty;
    use powledger_core::Sha256;
    use std::fs;
    use tempfile::TempDir;

    fn pow() -> ProofOfWork {
        ProofOfWork::new(Difficulty::new(1).unwrap())
    }

    fn tx(s: &str) -> Vec<Transaction> {
        vec![Transaction::from(s)]
    }

    fn store() -> (TempDir, TreeStore) {
        let tmp = TempDir::new().unwrap();
        let store = TreeStore::open(tmp.path().join(TreeStore::DEFAULT_DIR)).unwrap();
        (tmp, store)
    }

    fn grow(store: &TreeStore, count: usize) -> Vec<TreeRecord> {
        let cancel = CancelToken::new();
        (0..count)
            .map(|i| {
                store
                    .add(&Sha256, &pow(), tx(&format!("tx{}", i)), 1, &cancel)
                    .unwrap()
            })
            .collect()
    }

    fn record_at(store: &TreeStore, index: u64) -> TreeRecord {
        store
            .records()
            .unwrap()
            .into_iter()
            .find(|r| r.index == index)
            .unwrap()
    }

    #[test]
    fn test_first_add_creates_genesis() {
        let (_tmp, store) = store();
        let added = grow(&store, 1);

        let genesis = record_at(&store, 0);
        assert_eq!(genesis.parent_hash, None);
        assert_eq!(genesis.left_child, Some(added[0].hash));
        assert_eq!(added[0].index, 1);
        assert_eq!(added[0].parent_hash, Some(genesis.hash));
        assert_eq!(added[0].previous_hash, genesis.hash);
        assert!(store.validate(&Sha256).unwrap().is_valid());
    }

    #[test]
    fn test_breadth_first_attachment() {
        let (_tmp, store) = store();
        grow(&store, 4);

        let genesis = record_at(&store, 0);
        let one = record_at(&store, 1);
        let two = record_at(&store, 2);
        let three = record_at(&store, 3);
        let four = record_at(&store, 4);

        assert_eq!(genesis.left_child, Some(one.hash));
        assert_eq!(genesis.right_child, Some(two.hash));
        assert_eq!(three.parent_hash, Some(one.hash));
        assert_eq!(four.parent_hash, Some(one.hash));
        assert_eq!(store.next_parent().unwrap().unwrap().index, 2);
        assert!(store.validate(&Sha256).unwrap().is_valid());
    }

    #[test]
    fn test_init_genesis_twice_fails() {
        let (_tmp, store) = store();
        let genesis = Block::genesis(&Sha256, 1, vec![]);
        store.init_genesis(&genesis).unwrap();
        assert!(matches!(
            store.init_genesis(&genesis),
            Err(StorageError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_attach_to_full_parent() {
        let (_tmp, store) = store();
        let genesis = Block::genesis(&Sha256, 1, vec![]);
        store.init_genesis(&genesis).unwrap();

        for index in 1..=2 {
            let child = Block::new(&Sha256, index, 2, tx("c"), genesis.hash);
            store.attach(&child, &genesis.hash).unwrap();
        }
        let third = Block::new(&Sha256, 3, 2, tx("c"), genesis.hash);
        assert!(matches!(
            store.attach(&third, &genesis.hash),
            Err(StorageError::ParentFull(_))
        ));
    }

    #[test]
    fn test_attach_unknown_parent() {
        let (_tmp, store) = store();
        store.init_genesis(&Block::genesis(&Sha256, 1, vec![])).unwrap();

        let orphan_parent = Hash([9u8; 32]);
        let block = Block::new(&Sha256, 1, 2, tx("x"), orphan_parent);
        assert!(matches!(
            store.attach(&block, &orphan_parent),
            Err(StorageError::ParentNotFound(_))
        ));
    }

    #[test]
    fn test_tampered_block_detected_and_blocks_add() {
        let (_tmp, store) = store();
        grow(&store, 2);

        let mut record = record_at(&store, 2);
        record.data = tx("forged");
        let path = store.dir().block_path(record.index, &record.hash);
        store.dir().overwrite(&path, &record).unwrap();

        assert_eq!(
            store.validate(&Sha256).unwrap(),
            TreeStatus::Invalid {
                index: 2,
                reason: TreeFault::Block(ValidationError::InvalidHash)
            }
        );
        assert!(matches!(
            store.add(&Sha256, &pow(), tx("next"), 1, &CancelToken::new()),
            Err(StorageError::Corrupted { index: 2 })
        ));
    }

    #[test]
    fn test_parent_not_listing_child_detected() {
        let (_tmp, store) = store();
        grow(&store, 1);

        let mut genesis = record_at(&store, 0);
        genesis.left_child = None;
        let path = store.dir().block_path(0, &genesis.hash);
        store.dir().overwrite(&path, &genesis).unwrap();

        assert_eq!(
            store.validate(&Sha256).unwrap(),
            TreeStatus::Invalid {
                index: 1,
                reason: TreeFault::NotListedByParent
            }
        );
    }

    #[test]
    fn test_child_not_pointing_back_detected() {
        let (_tmp, store) = store();
        grow(&store, 2);

        // Block 1 claims block 2, which belongs to genesis.
        let two = record_at(&store, 2);
        let mut one = record_at(&store, 1);
        one.left_child = Some(two.hash);
        let path = store.dir().block_path(1, &one.hash);
        store.dir().overwrite(&path, &one).unwrap();

        assert_eq!(
            store.validate(&Sha256).unwrap(),
            TreeStatus::Invalid {
                index: 1,
                reason: TreeFault::ChildMismatch
            }
        );
    }

    #[test]
    fn test_copy_under_wrong_index_detected() {
        let (_tmp, store) = store();
        let leaf = grow(&store, 1).remove(0);

        let original = store.dir().block_path(leaf.index, &leaf.hash);
        fs::copy(&original, store.dir().block_path(u64::MAX, &leaf.hash)).unwrap();

        assert_eq!(
            store.validate(&Sha256).unwrap(),
            TreeStatus::Invalid {
                index: 1,
                reason: TreeFault::FileIndexMismatch { file: u64::MAX }
            }
        );
        assert!(matches!(
            store.add(&Sha256, &pow(), tx("next"), 1, &CancelToken::new()),
            Err(StorageError::Corrupted { index: 1 })
        ));
        assert_eq!(store.highest_index().unwrap(), Some(u64::MAX));
    }

    #[test]
    fn test_copy_under_same_index_detected() {
        let (_tmp, store) = store();
        let leaf = grow(&store, 1).remove(0);

        let original = store.dir().block_path(leaf.index, &leaf.hash);
        // Mined hashes start with '0', so this prefix never collides.
        fs::copy(&original, store.dir().path().join("block_1_ffffffff.json")).unwrap();

        assert_eq!(
            store.validate(&Sha256).unwrap(),
            TreeStatus::Invalid {
                index: 1,
                reason: TreeFault::DuplicateBlock
            }
        );
    }

    #[test]
    fn test_add_after_last_index_fails() {
        let (_tmp, store) = store();
        let genesis = Block::genesis(&Sha256, 1, vec![]);
        store.init_genesis(&genesis).unwrap();
        let last = Block::new(&Sha256, u64::MAX, 2, tx("last"), genesis.hash);
        store.attach(&last, &genesis.hash).unwrap();
        assert!(store.validate(&Sha256).unwrap().is_valid());

        assert!(matches!(
            store.add(&Sha256, &pow(), tx("next"), 1, &CancelToken::new()),
            Err(StorageError::IndexOverflow(u64::MAX))
        ));
        assert_eq!(store.records().unwrap().len(), 2);
    }

    #[test]
    fn test_add_with_worker_threads() {
        let (_tmp, store) = store();
        let cancel = CancelToken::new();
        for i in 0..3 {
            let record = store
                .add(&Sha256, &pow(), tx(&format!("tx{}", i)), 3, &cancel)
                .unwrap();
            assert!(record.hash.to_hex().starts_with('0'));
        }

        assert_eq!(store.highest_index().unwrap(), Some(3));
        assert!(record_at(&store, 0).hash.to_hex().starts_with('0'));
        assert!(store.validate(&Sha256).unwrap().is_valid());
    }

    #[test]
    fn test_empty_payload_rejected() {
        let (_tmp, store) = store();
        assert!(matches!(
            store.add(&Sha256, &pow(), vec![], 1, &CancelToken::new()),
            Err(StorageError::Validation(ValidationError::EmptyPayload))
        ));
        assert!(!store.is_initialized().unwrap());
    }

    #[test]
    fn test_render() {
        let (_tmp, store) = store();
        let added = grow(&store, 3);
        let genesis = record_at(&store, 0);

        let text = store.render().unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[0],
            format!("└── Block (0) [{}...]", genesis.hash.short_hex())
        );
        assert_eq!(
            lines[1],
            format!("    ├── Block (1) [{}...]", added[0].hash.short_hex())
        );
        assert_eq!(
            lines[2],
            format!("    │   └── Block (3) [{}...]", added[2].hash.short_hex())
        );
        assert_eq!(
            lines[3],
            format!("    └── Block (2) [{}...]", added[1].hash.short_hex())
        );
    }

    #[test]
    fn test_render_empty() {
        let (_tmp, store) = store();
        assert!(matches!(store.render(), Err(StorageError::NotInitialized)));
    }
}
