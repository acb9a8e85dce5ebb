//! Ledger settings persisted as `config.json` in the data directory.

use anyhow::{bail, Context, Result};
use powledger_chain::ChainConfig;
use powledger_consensus::{Difficulty, MAX_MINING_THREADS};
use powledger_core::HashAlgorithm;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_FILE: &str = "config.json";

/// Settings written by `init` and read by every other command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Leading zero hex characters required of every block hash.
    pub difficulty: u32,
    /// Digest used for blocks and Merkle roots.
    pub algorithm: HashAlgorithm,
    /// Worker threads used while mining.
    pub mining_threads: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: 3,
            algorithm: HashAlgorithm::Sha256,
            mining_threads: 1,
        }
    }
}

impl LedgerConfig {
    /// Read `config.json`, falling back to defaults when the file is absent.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn save(&self, data_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;
        let path = data_dir.join(CONFIG_FILE);
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }

    pub fn difficulty(&self) -> Result<Difficulty> {
        Difficulty::new(self.difficulty).context("Invalid difficulty in config")
    }

    /// Worker threads to mine with. Zero means one.
    pub fn mining_threads(&self) -> Result<usize> {
        if self.mining_threads > MAX_MINING_THREADS {
            bail!(
                "Invalid mining_threads in config: {} exceeds the maximum of {}",
                self.mining_threads,
                MAX_MINING_THREADS
            );
        }
        Ok(self.mining_threads.max(1))
    }

    /// Runtime chain settings; genesis is mined to the same target.
    pub fn chain_config(&self) -> Result<ChainConfig> {
        Ok(ChainConfig {
            mining_threads: self.mining_threads()?,
            ..ChainConfig::with_difficulty(self.difficulty()?)
        })
    }
}
