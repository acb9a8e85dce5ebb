//! Linear ledger storage: one JSON file per block in index order.

use crate::db::{BlockDir, Result, StorageError};
use powledger_chain::{Chain, ChainConfig, ChainStatus};
use powledger_consensus::ValidationError;
use powledger_core::{Block, HashFunction};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Manages the block files of a linear chain.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    dir: BlockDir,
}

impl LedgerStore {
    /// Directory name used under a data directory.
    pub const DEFAULT_DIR: &'static str = "dlt";

    /// Open (or create) a ledger directory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            dir: BlockDir::open(path)?,
        })
    }

    pub fn dir(&self) -> &BlockDir {
        &self.dir
    }

    // =========================================================================
    // Block Storage
    // =========================================================================

    /// Write a block file. An existing file for the same block is left alone
    /// and reported as `AlreadyExists`.
    pub fn save_block(&self, block: &Block) -> Result<PathBuf> {
        let path = self.dir.write(block.index, &block.hash, block)?;
        info!(index = block.index, path = %path.display(), "saved block");
        Ok(path)
    }

    /// Write every block of `chain` that has no file of its own yet.
    pub fn save_new_blocks<H: HashFunction>(&self, chain: &Chain<H>) -> Result<Vec<PathBuf>> {
        chain
            .blocks()
            .iter()
            .filter(|block| !self.dir.block_path(block.index, &block.hash).exists())
            .map(|block| self.save_block(block))
            .collect()
    }

    /// All stored blocks, sorted by the index in their file names.
    pub fn load_blocks(&self) -> Result<Vec<Block>> {
        self.dir.list()
    }

    /// Rebuild a chain from disk. The blocks are not checked; pass the
    /// result to `validate`.
    pub fn load_chain<H: HashFunction>(&self, hasher: H, config: ChainConfig) -> Result<Chain<H>> {
        let blocks = self.load_blocks()?;
        if blocks.is_empty() {
            return Err(StorageError::NotInitialized);
        }
        Ok(Chain::from_blocks(hasher, config, blocks)?)
    }

    /// Compare the index in every file name with the index stored in the
    /// file. The first disagreement is reported at the stored index.
    pub fn check_file_names(&self) -> Result<ChainStatus> {
        for file in self.dir.entries()? {
            let block: Block = self.dir.read(&file.path)?;
            if block.index != file.index {
                let reason = ValidationError::InvalidIndex {
                    expected: file.index,
                    got: block.index,
                };
                warn!(
                    index = block.index,
                    path = %file.path.display(),
                    %reason,
                    "misnamed block file"
                );
                return Ok(ChainStatus::Invalid {
                    index: block.index,
                    reason,
                });
            }
        }
        Ok(ChainStatus::Valid)
    }

    /// Check the files behind `chain`, then the chain itself. With
    /// `require_work` every block must also meet the configured difficulty.
    pub fn validate<H: HashFunction>(
        &self,
        chain: &Chain<H>,
        require_work: bool,
    ) -> Result<ChainStatus> {
        let names = self.check_file_names()?;
        if !names.is_valid() {
            return Ok(names);
        }

        Ok(if require_work {
            chain.validate_work()
        } else {
            chain.validate()
        })
    }

    /// Get a block by the index in its file name.
    pub fn get_block(&self, index: u64) -> Result<Option<Block>> {
        match self.dir.find(index)? {
            Some(file) => Ok(Some(self.dir.read(&file.path)?)),
            None => Ok(None),
        }
    }

    /// Get the block with the highest index.
    pub fn latest_block(&self) -> Result<Option<Block>> {
        match self.dir.entries()?.last() {
            Some(file) => Ok(Some(self.dir.read(&file.path)?)),
            None => Ok(None),
        }
    }

    pub fn highest_index(&self) -> Result<Option<u64>> {
        self.dir.highest_index()
    }

    /// Check if the ledger has any blocks.
    pub fn is_initialized(&self) -> Result<bool> {
        Ok(!self.dir.is_empty()?)
    }

    /// Get the last `count` blocks (most recent first).
    pub fn recent_blocks(&self, count: usize) -> Result<Vec<Block>> {
        let mut blocks = self.load_blocks()?;
        blocks.reverse();
        blocks.truncate(count);
        Ok(blocks)
    }

    // =========================================================================
    // Display
    // =========================================================================

    /// Draw the chain with each block pointing back at its predecessor.
    pub fn render_linear(&self) -> Result<String> {
        let blocks = self.load_blocks()?;
        Ok(render_linear(&blocks))
    }
}

/// Text drawing of a linear chain.
pub fn render_linear(blocks: &[Block]) -> String {
    let Some((genesis, rest)) = blocks.split_first() else {
        return "No blocks found in ledger\n".to_string();
    };

    let mut out = String::new();
    let _ = writeln!(
        out,
        "Genesis Block ({}) [{}...]",
        genesis.index,
        genesis.hash.short_hex()
    );
    for block in rest {
        let _ = writeln!(out, "   ↑");
        let _ = writeln!(
            out,
            "   └── Block ({}) [{}...] points to [{}...]",
            block.index,
            block.hash.short_hex(),
            block.prev_hash.short_hex()
        );
    }
    out
}
