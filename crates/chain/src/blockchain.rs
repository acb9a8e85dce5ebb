//! The append-only chain.
//!
//! A `Chain` always holds its genesis block. New blocks are linked to the tip
//! by `append`, which stores the block unmined so the caller can mine it in
//! place, or by `mine_and_append`, which mines a candidate before storing it.
//! `validate` re-derives every block's hash from its fields and checks the
//! links between neighbours.

use powledger_consensus::{
    BlockValidator, CancelToken, Difficulty, MiningError, Proof, ProofOfWork, ValidationError,
    DEFAULT_DIFFICULTY,
};
use powledger_core::{current_timestamp, Block, Hash, HashFunction, Sha256, Transaction};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur during chain operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("mining error: {0}")]
    Mining(#[from] MiningError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("a chain needs at least a genesis block")]
    EmptyChain,
}

pub type Result<T> = std::result::Result<T, ChainError>;

/// Chain configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    /// Target for every appended block.
    pub difficulty: Difficulty,
    /// Target for the genesis block; `None` leaves genesis unmined.
    pub genesis_difficulty: Option<Difficulty>,
    /// Worker threads used when the chain mines a block itself.
    pub mining_threads: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            genesis_difficulty: Some(DEFAULT_DIFFICULTY),
            mining_threads: 1,
        }
    }
}

impl ChainConfig {
    /// Same difficulty for genesis and every later block.
    pub fn with_difficulty(difficulty: Difficulty) -> Self {
        Self {
            difficulty,
            genesis_difficulty: Some(difficulty),
            ..Self::default()
        }
    }

    /// The miner for appended blocks.
    pub fn pow(&self) -> ProofOfWork {
        ProofOfWork::new(self.difficulty)
    }
}

/// Outcome of a full chain check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainStatus {
    Valid,
    /// The first block that failed, by position in the chain.
    Invalid { index: u64, reason: ValidationError },
}

impl ChainStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, ChainStatus::Valid)
    }

    pub fn first_invalid_index(&self) -> Option<u64> {
        match self {
            ChainStatus::Valid => None,
            ChainStatus::Invalid { index, .. } => Some(*index),
        }
    }

    pub fn reason(&self) -> Option<&ValidationError> {
        match self {
            ChainStatus::Valid => None,
            ChainStatus::Invalid { reason, .. } => Some(reason),
        }
    }
}

/// Chain statistics.
#[derive(Debug, Clone)]
pub struct ChainStats {
    /// Number of blocks, genesis included.
    pub length: usize,
    /// Hash of the latest block.
    pub tip_hash: Hash,
    /// Timestamp of the latest block.
    pub tip_timestamp: u64,
    /// Transactions across all blocks.
    pub total_transactions: usize,
    /// Target for appended blocks.
    pub difficulty: Difficulty,
}

/// An ordered, append-only sequence of blocks starting at genesis.
///
/// There is one writer. Share a chain between threads behind a `Mutex` or
/// `RwLock` so appends cannot interleave.
#[derive(Debug, Clone)]
pub struct Chain<H: HashFunction = Sha256> {
    hasher: H,
    config: ChainConfig,
    blocks: Vec<Block>,
}

impl<H: HashFunction> Chain<H> {
    /// Create a chain with a fresh genesis block, mined to
    /// `config.genesis_difficulty` when set.
    pub fn new(hasher: H, config: ChainConfig) -> Result<Self> {
        Self::new_with_cancel(hasher, config, &CancelToken::new())
    }

    /// Like [`Chain::new`], with a way to abort genesis mining.
    pub fn new_with_cancel(hasher: H, config: ChainConfig, cancel: &CancelToken) -> Result<Self> {
        let mut genesis = Block::genesis(&hasher, current_timestamp(), Vec::new());

        if let Some(difficulty) = config.genesis_difficulty {
            ProofOfWork::new(difficulty).mine_parallel(
                &hasher,
                &mut genesis,
                config.mining_threads,
                cancel,
            )?;
        }

        info!(hash = %genesis.hash.to_hex(), "created genesis block");

        Ok(Self {
            hasher,
            config,
            blocks: vec![genesis],
        })
    }

    /// Create a chain from a prepared genesis block.
    pub fn with_genesis(hasher: H, config: ChainConfig, genesis: Block) -> Result<Self> {
        BlockValidator::validate_genesis(&hasher, &genesis)?;
        Ok(Self {
            hasher,
            config,
            blocks: vec![genesis],
        })
    }

    /// Load blocks as stored, without checking them. Run
    /// [`validate`](Self::validate) before trusting the result.
    pub fn from_blocks(hasher: H, config: ChainConfig, blocks: Vec<Block>) -> Result<Self> {
        if blocks.is_empty() {
            return Err(ChainError::EmptyChain);
        }
        Ok(Self {
            hasher,
            config,
            blocks,
        })
    }

    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Number of blocks, genesis included.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false: a chain is never without its genesis block.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn genesis(&self) -> &Block {
        &self.blocks[0]
    }

    /// The latest block.
    pub fn tip(&self) -> &Block {
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn get(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }

    /// Build the next block on top of the tip without storing it.
    pub fn next_block(&self, payload: Vec<Transaction>) -> Result<Block> {
        let timestamp = current_timestamp().max(self.tip().timestamp);
        self.next_block_at(payload, timestamp)
    }

    /// Build the next block with an explicit timestamp.
    pub fn next_block_at(&self, payload: Vec<Transaction>, timestamp: u64) -> Result<Block> {
        let tip = self.tip();

        if payload.is_empty() {
            return Err(ValidationError::EmptyPayload.into());
        }
        if timestamp < tip.timestamp {
            return Err(ValidationError::TimestampRegression {
                parent: tip.timestamp,
                got: timestamp,
            }
            .into());
        }

        Ok(Block::new(
            &self.hasher,
            self.blocks.len() as u64,
            timestamp,
            payload,
            tip.hash,
        ))
    }

    /// Store an unmined block linked to the tip and return it for mining.
    ///
    /// The returned block is the new tip, so mining it in place keeps every
    /// link intact.
    pub fn append(&mut self, payload: Vec<Transaction>) -> Result<&mut Block> {
        let block = self.next_block(payload)?;
        Ok(self.store(block))
    }

    /// [`append`](Self::append) with an explicit timestamp.
    pub fn append_with_timestamp(
        &mut self,
        payload: Vec<Transaction>,
        timestamp: u64,
    ) -> Result<&mut Block> {
        let block = self.next_block_at(payload, timestamp)?;
        Ok(self.store(block))
    }

    /// Append a block built elsewhere, after checking it against the tip.
    pub fn push(&mut self, block: Block) -> Result<&Block> {
        BlockValidator::validate_full(&self.hasher, &block, self.tip())?;
        Ok(&*self.store(block))
    }

    fn store(&mut self, block: Block) -> &mut Block {
        debug!(
            index = block.index,
            txs = block.tx_count(),
            prev = %block.prev_hash.short_hex(),
            "appending block"
        );
        self.blocks.push(block);
        let last = self.blocks.len() - 1;
        &mut self.blocks[last]
    }

    /// Mine the current tip to the configured difficulty.
    pub fn mine_tip(&mut self, cancel: &CancelToken) -> Result<Proof> {
        let pow = self.config.pow();
        let threads = self.config.mining_threads;
        let Self { hasher, blocks, .. } = self;
        let tip = blocks.last_mut().ok_or(ChainError::EmptyChain)?;
        Ok(pow.mine_parallel(&*hasher, tip, threads, cancel)?)
    }

    /// Build, mine and store a block in one step. Nothing is stored if
    /// mining is cancelled.
    pub fn mine_and_append(
        &mut self,
        payload: Vec<Transaction>,
        cancel: &CancelToken,
    ) -> Result<&Block> {
        let mut block = self.next_block(payload)?;
        self.config.pow().mine_parallel(
            &self.hasher,
            &mut block,
            self.config.mining_threads,
            cancel,
        )?;
        Ok(&*self.store(block))
    }

    /// Re-derive every block and check every link.
    ///
    /// Reports the first failing position; integrity failures are data, not
    /// errors.
    pub fn validate(&self) -> ChainStatus {
        for (position, block) in self.blocks.iter().enumerate() {
            let result = if position == 0 {
                BlockValidator::validate_genesis(&self.hasher, block)
            } else {
                BlockValidator::validate_full(&self.hasher, block, &self.blocks[position - 1])
            };

            if let Err(reason) = result {
                warn!(index = position, %reason, "chain validation failed");
                return ChainStatus::Invalid {
                    index: position as u64,
                    reason,
                };
            }
        }

        ChainStatus::Valid
    }

    /// [`validate`](Self::validate) plus the proof-of-work target on every
    /// block. Genesis is only checked when a genesis difficulty is set.
    pub fn validate_work(&self) -> ChainStatus {
        let status = self.validate();
        if !status.is_valid() {
            return status;
        }

        for (position, block) in self.blocks.iter().enumerate() {
            let difficulty = if position == 0 {
                match self.config.genesis_difficulty {
                    Some(d) => d,
                    None => continue,
                }
            } else {
                self.config.difficulty
            };

            if let Err(reason) = BlockValidator::validate_work(&self.hasher, block, difficulty) {
                warn!(index = position, %reason, "proof of work check failed");
                return ChainStatus::Invalid {
                    index: position as u64,
                    reason,
                };
            }
        }

        ChainStatus::Valid
    }

    /// Get chain statistics.
    pub fn stats(&self) -> ChainStats {
        let tip = self.tip();
        ChainStats {
            length: self.blocks.len(),
            tip_hash: tip.hash,
            tip_timestamp: tip.timestamp,
            total_transactions: self.blocks.iter().map(Block::tx_count).sum(),
            difficulty: self.config.difficulty,
        }
    }
}
