//! Directory of JSON block files with naming and serialization helpers.

use powledger_chain::ChainError;
use powledger_consensus::{MiningError, ValidationError};
use powledger_core::Hash;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupted block file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("block file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("invalid block file name: {0}")]
    InvalidFileName(String),

    #[error("parent block {0} not found")]
    ParentNotFound(Hash),

    #[error("parent block {0} already has two children")]
    ParentFull(Hash),

    #[error("no block can accept another child")]
    NoParentAvailable,

    #[error("ledger has no genesis block")]
    NotInitialized,

    #[error("ledger is already initialized")]
    AlreadyInitialized,

    #[error("stored ledger is corrupted at block {index}")]
    Corrupted { index: u64 },

    #[error("block index space exhausted after block {0}")]
    IndexOverflow(u64),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Mining error: {0}")]
    Mining(#[from] MiningError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// A block file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockFile {
    /// Index parsed from the file name.
    pub index: u64,
    /// Hash prefix parsed from the file name.
    pub short_hash: String,
    pub path: PathBuf,
}

/// A directory holding one pretty-printed JSON file per block.
#[derive(Debug, Clone)]
pub struct BlockDir {
    root: PathBuf,
}

impl BlockDir {
    /// Open a block directory, creating it if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    // =========================================================================
    // File Naming
    // =========================================================================

    /// Format: "block_" + index + "_" + first 8 hex chars of the hash + ".json"
    pub fn file_name(index: u64, hash: &Hash) -> String {
        format!("block_{}_{}.json", index, hash.short_hex())
    }

    /// Split a block file name into its index and hash prefix.
    pub fn parse_file_name(name: &str) -> Result<(u64, String)> {
        let invalid = || StorageError::InvalidFileName(name.to_string());

        let stem = name
            .strip_prefix("block_")
            .and_then(|rest| rest.strip_suffix(".json"))
            .ok_or_else(invalid)?;
        let (index, short_hash) = stem.split_once('_').ok_or_else(invalid)?;
        let index = index.parse::<u64>().map_err(|_| invalid())?;

        Ok((index, short_hash.to_string()))
    }

    pub fn block_path(&self, index: u64, hash: &Hash) -> PathBuf {
        self.root.join(Self::file_name(index, hash))
    }

    // =========================================================================
    // Reading and Writing
    // =========================================================================

    /// Write a new block file. Existing files are never replaced.
    pub fn write<V: Serialize>(&self, index: u64, hash: &Hash, value: &V) -> Result<PathBuf> {
        let path = self.block_path(index, hash);
        if path.exists() {
            return Err(StorageError::AlreadyExists(path));
        }
        self.write_json(&path, value)?;
        debug!(path = %path.display(), "wrote block file");
        Ok(path)
    }

    /// Replace the contents of an existing block file.
    pub fn overwrite<V: Serialize>(&self, path: &Path, value: &V) -> Result<()> {
        self.write_json(path, value)?;
        debug!(path = %path.display(), "rewrote block file");
        Ok(())
    }

    fn write_json<V: Serialize>(&self, path: &Path, value: &V) -> Result<()> {
        let encoded = serde_json::to_string_pretty(value)?;
        fs::write(path, encoded)?;
        Ok(())
    }

    /// Read and deserialize one block file.
    pub fn read<V: DeserializeOwned>(&self, path: &Path) -> Result<V> {
        let contents = fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|source| StorageError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Every block file, sorted by index. Names that do not parse are skipped.
    pub fn entries(&self) -> Result<Vec<BlockFile>> {
        let mut files = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };

            match Self::parse_file_name(name) {
                Ok((index, short_hash)) => files.push(BlockFile {
                    index,
                    short_hash,
                    path: entry.path(),
                }),
                Err(_) => debug!(name, "skipping unrecognised file"),
            }
        }

        files.sort_by(|a, b| a.index.cmp(&b.index).then_with(|| a.path.cmp(&b.path)));
        Ok(files)
    }

    /// Read every block file, sorted by index.
    pub fn list<V: DeserializeOwned>(&self) -> Result<Vec<V>> {
        self.entries()?
            .iter()
            .map(|file| self.read(&file.path))
            .collect()
    }

    /// The first file carrying `index` in its name.
    pub fn find(&self, index: u64) -> Result<Option<BlockFile>> {
        Ok(self.entries()?.into_iter().find(|file| file.index == index))
    }

    /// Highest index among the file names, `None` for an empty directory.
    pub fn highest_index(&self) -> Result<Option<u64>> {
        Ok(self.entries()?.last().map(|file| file.index))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.entries()?.is_empty())
    }
}
