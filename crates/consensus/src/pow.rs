//! Proof of Work (PoW) mining.
//!
//! A block satisfies difficulty `d` when the hex encoding of its hash starts
//! with `d` zero characters. Mining scans nonces upward from the block's
//! current nonce, digesting each candidate without touching the block, and
//! commits only the first nonce that meets the target.

use crate::cancel::{CancelReason, CancelToken};
use powledger_core::{Block, Hash, HashFunction};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use thiserror::Error;
use tracing::{debug, info};

/// A 32-byte digest has 64 hex characters.
pub const MAX_DIFFICULTY: u32 = 64;

/// Difficulty used when none is configured.
pub const DEFAULT_DIFFICULTY: Difficulty = Difficulty(3);

/// Upper bound on mining worker threads.
pub const MAX_MINING_THREADS: usize = 256;

/// How many attempts pass between deadline checks.
const DEADLINE_POLL_INTERVAL: u64 = 1024;

/// Errors that can occur while mining.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MiningError {
    #[error("difficulty {0} exceeds the maximum of {MAX_DIFFICULTY}")]
    DifficultyTooHigh(u32),

    #[error("mining cancelled after {attempts} attempts")]
    Cancelled { attempts: u64 },

    #[error("mining deadline exceeded after {attempts} attempts")]
    DeadlineExceeded { attempts: u64 },

    #[error("nonce space exhausted after {attempts} attempts")]
    NonceSpaceExhausted { attempts: u64 },

    #[error("at least one mining thread is required")]
    NoThreads,

    #[error("{0} mining threads exceeds the maximum of {MAX_MINING_THREADS}")]
    TooManyThreads(usize),

    #[error("failed to start mining worker: {0}")]
    SpawnFailed(String),

    #[error("mining worker panicked")]
    WorkerPanicked,
}

pub type Result<T> = std::result::Result<T, MiningError>;

/// Required number of leading zero hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Difficulty(u32);

impl Difficulty {
    /// Accepts every digest.
    pub const ZERO: Self = Self(0);

    pub fn new(zeros: u32) -> Result<Self> {
        if zeros > MAX_DIFFICULTY {
            return Err(MiningError::DifficultyTooHigh(zeros));
        }
        Ok(Self(zeros))
    }

    pub fn zeros(&self) -> u32 {
        self.0
    }

    /// Whether `hash` meets this target.
    pub fn is_met_by(&self, hash: &Hash) -> bool {
        hash.meets_difficulty(self.0)
    }

    /// The hex prefix a satisfying digest starts with.
    pub fn prefix(&self) -> String {
        "0".repeat(self.0 as usize)
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for Difficulty {
    type Error = MiningError;

    fn try_from(zeros: u32) -> Result<Self> {
        Self::new(zeros)
    }
}

/// An accepted nonce and the digest it produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Proof {
    pub nonce: u64,
    pub hash: Hash,
    /// Digests computed to find this proof.
    pub attempts: u64,
}

/// Result of a side-effect-free nonce scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    Found(Proof),
    /// The scan ran past `u64::MAX`.
    Exhausted { attempts: u64 },
    Cancelled { reason: CancelReason, attempts: u64 },
}

impl SearchOutcome {
    fn attempts(&self) -> u64 {
        match self {
            SearchOutcome::Found(proof) => proof.attempts,
            SearchOutcome::Exhausted { attempts } | SearchOutcome::Cancelled { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// The proof-of-work miner for a fixed difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProofOfWork {
    difficulty: Difficulty,
}

impl ProofOfWork {
    pub fn new(difficulty: Difficulty) -> Self {
        Self { difficulty }
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    /// Whether the block's stored hash re-derives from its fields and meets
    /// the target.
    pub fn is_valid<H: HashFunction>(&self, hasher: &H, block: &Block) -> bool {
        block.verify_hash(hasher) && self.difficulty.is_met_by(&block.hash)
    }

    /// Scan `start, start + step, start + 2*step, ...` for a satisfying nonce.
    ///
    /// The block is only read; nothing is committed.
    pub fn search<H: HashFunction>(
        &self,
        hasher: &H,
        block: &Block,
        start: u64,
        step: u64,
        cancel: &CancelToken,
    ) -> SearchOutcome {
        self.scan(hasher, block, start, step.max(1), cancel, None)
    }

    fn scan<H: HashFunction>(
        &self,
        hasher: &H,
        block: &Block,
        start: u64,
        step: u64,
        cancel: &CancelToken,
        stop: Option<&AtomicBool>,
    ) -> SearchOutcome {
        let mut nonce = start;
        let mut attempts = 0u64;

        loop {
            let interrupted = if attempts % DEADLINE_POLL_INTERVAL == 0 {
                cancel.check()
            } else if cancel.is_cancelled() {
                Some(CancelReason::Cancelled)
            } else {
                None
            };
            let interrupted = interrupted.or_else(|| {
                stop.filter(|s| s.load(Ordering::Acquire))
                    .map(|_| CancelReason::Cancelled)
            });
            if let Some(reason) = interrupted {
                return SearchOutcome::Cancelled { reason, attempts };
            }

            let hash = block.attempt(hasher, nonce);
            attempts += 1;
            if self.difficulty.is_met_by(&hash) {
                return SearchOutcome::Found(Proof {
                    nonce,
                    hash,
                    attempts,
                });
            }

            nonce = match nonce.checked_add(step) {
                Some(next) => next,
                None => return SearchOutcome::Exhausted { attempts },
            };
        }
    }

    /// Mine the block with no bound other than the nonce space.
    pub fn mine<H: HashFunction>(&self, hasher: &H, block: &mut Block) -> Result<Proof> {
        self.mine_with_cancel(hasher, block, &CancelToken::new())
    }

    /// Mine the block until a proof is found or `cancel` fires.
    ///
    /// On failure the block is left exactly as it was.
    pub fn mine_with_cancel<H: HashFunction>(
        &self,
        hasher: &H,
        block: &mut Block,
        cancel: &CancelToken,
    ) -> Result<Proof> {
        debug!(
            index = block.index,
            difficulty = self.difficulty.zeros(),
            start_nonce = block.nonce,
            "mining block"
        );

        let outcome = self.search(hasher, block, block.nonce, 1, cancel);
        self.finish(block, outcome)
    }

    /// Mine on `threads` scoped workers, each scanning a disjoint strided
    /// nonce range. The first success stops the other workers; the lowest
    /// nonce among the finds is committed.
    pub fn mine_parallel<H: HashFunction>(
        &self,
        hasher: &H,
        block: &mut Block,
        threads: usize,
        cancel: &CancelToken,
    ) -> Result<Proof> {
        match threads {
            0 => return Err(MiningError::NoThreads),
            1 => return self.mine_with_cancel(hasher, block, cancel),
            n if n > MAX_MINING_THREADS => return Err(MiningError::TooManyThreads(n)),
            _ => {}
        }

        debug!(
            index = block.index,
            difficulty = self.difficulty.zeros(),
            threads,
            "mining block in parallel"
        );

        let stop = AtomicBool::new(false);
        let start = block.nonce;
        let step = threads as u64;
        let candidate: &Block = block;

        let joined = thread::scope(|s| {
            let mut handles = Vec::with_capacity(threads);
            for offset in 0..step {
                let stop = &stop;
                let spawned = thread::Builder::new()
                    .name(format!("miner-{offset}"))
                    .spawn_scoped(s, move || {
                        let Some(first) = start.checked_add(offset) else {
                            return SearchOutcome::Exhausted { attempts: 0 };
                        };
                        let outcome = self.scan(hasher, candidate, first, step, cancel, Some(stop));
                        if matches!(outcome, SearchOutcome::Found(_)) {
                            stop.store(true, Ordering::Release);
                        }
                        outcome
                    });

                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        // Workers already running exit once they see the flag.
                        stop.store(true, Ordering::Release);
                        for handle in handles {
                            let _ = handle.join();
                        }
                        return Err(MiningError::SpawnFailed(e.to_string()));
                    }
                }
            }
            Ok(handles
                .into_iter()
                .map(|h| h.join())
                .collect::<Vec<thread::Result<SearchOutcome>>>())
        })?;

        let outcomes = joined
            .into_iter()
            .collect::<thread::Result<Vec<_>>>()
            .map_err(|_| MiningError::WorkerPanicked)?;
        let attempts: u64 = outcomes.iter().map(SearchOutcome::attempts).sum();

        let best = outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                SearchOutcome::Found(proof) => Some(*proof),
                _ => None,
            })
            .min_by_key(|proof| proof.nonce);

        let outcome = match best {
            Some(proof) => SearchOutcome::Found(Proof { attempts, ..proof }),
            None => match cancel.check() {
                Some(reason) => SearchOutcome::Cancelled { reason, attempts },
                None => SearchOutcome::Exhausted { attempts },
            },
        };
        self.finish(block, outcome)
    }

    fn finish(&self, block: &mut Block, outcome: SearchOutcome) -> Result<Proof> {
        match outcome {
            SearchOutcome::Found(proof) => {
                block.commit(proof.nonce, proof.hash);
                info!(
                    index = block.index,
                    nonce = proof.nonce,
                    attempts = proof.attempts,
                    hash = %proof.hash.to_hex(),
                    "mined block"
                );
                Ok(proof)
            }
            SearchOutcome::Cancelled {
                reason: CancelReason::Cancelled,
                attempts,
            } => {
                debug!(index = block.index, attempts, "mining cancelled");
                Err(MiningError::Cancelled { attempts })
            }
            SearchOutcome::Cancelled {
                reason: CancelReason::DeadlineExceeded,
                attempts,
            } => {
                debug!(index = block.index, attempts, "mining deadline exceeded");
                Err(MiningError::DeadlineExceeded { attempts })
            }
            SearchOutcome::Exhausted { attempts } => {
                Err(MiningError::NonceSpaceExhausted { attempts })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use powledger_core::{Blake3, Sha256, Transaction};
    use std::time::Instant;

    fn pow(zeros: u32) -> ProofOfWork {
        ProofOfWork::new(Difficulty::new(zeros).unwrap())
    }

    fn block() -> Block {
        Block::new(&Sha256, 1, 1_000, vec![Transaction::from("tx1")], Hash([3u8; 32]))
    }

    #[test]
    fn test_difficulty_bounds() {
        assert!(Difficulty::new(0).is_ok());
        assert!(Difficulty::new(64).is_ok());
        assert_eq!(
            Difficulty::new(65),
            Err(MiningError::DifficultyTooHigh(65))
        );
        assert_eq!(Difficulty::try_from(3).unwrap().prefix(), "000");
    }

    #[test]
    fn test_mine_meets_target() {
        let mut b = block();
        let proof = pow(2).mine(&Sha256, &mut b).unwrap();

        assert!(b.hash.to_hex().starts_with("00"));
        assert_eq!(b.nonce, proof.nonce);
        assert_eq!(b.hash, proof.hash);
        assert!(b.verify_hash(&Sha256));
        assert!(pow(2).is_valid(&Sha256, &b));
        assert_eq!(proof.attempts, proof.nonce + 1);
    }

    #[test]
    fn test_mine_finds_first_nonce() {
        let mut b = block();
        let proof = pow(2).mine(&Sha256, &mut b).unwrap();
        for nonce in 0..proof.nonce {
            assert!(!b.attempt(&Sha256, nonce).meets_difficulty(2));
        }
    }

    #[test]
    fn test_mine_with_blake3() {
        let mut b = Block::new(&Blake3, 1, 1_000, vec![Transaction::from("tx1")], Hash::ZERO);
        pow(2).mine(&Blake3, &mut b).unwrap();
        assert!(pow(2).is_valid(&Blake3, &b));
        assert!(!b.verify_hash(&Sha256));
    }

    #[test]
    fn test_zero_difficulty_keeps_nonce() {
        let mut b = block();
        let proof = pow(0).mine(&Sha256, &mut b).unwrap();
        assert_eq!(proof.nonce, 0);
        assert_eq!(proof.attempts, 1);
    }

    #[test]
    fn test_search_does_not_mutate() {
        let b = block();
        let before = b.clone();
        let outcome = pow(1).search(&Sha256, &b, 0, 1, &CancelToken::new());
        assert!(matches!(outcome, SearchOutcome::Found(_)));
        assert_eq!(b, before);
    }

    #[test]
    fn test_search_exhausts_at_end_of_nonce_space() {
        let b = block();
        let outcome = pow(64).search(&Sha256, &b, u64::MAX - 2, 1, &CancelToken::new());
        assert_eq!(outcome, SearchOutcome::Exhausted { attempts: 3 });
    }

    #[test]
    fn test_cancelled_token_stops_immediately() {
        let mut b = block();
        let before = b.clone();
        let token = CancelToken::new();
        token.cancel();

        let err = pow(64).mine_with_cancel(&Sha256, &mut b, &token).unwrap_err();
        assert_eq!(err, MiningError::Cancelled { attempts: 0 });
        assert_eq!(b, before);
    }

    #[test]
    fn test_deadline_stops_unbounded_search() {
        let mut b = block();
        let before = b.clone();
        let token = CancelToken::new().with_deadline(Instant::now());

        let err = pow(64).mine_with_cancel(&Sha256, &mut b, &token).unwrap_err();
        assert!(matches!(err, MiningError::DeadlineExceeded { .. }));
        assert_eq!(b, before);
    }

    #[test]
    fn test_cancel_from_another_thread() {
        let mut b = block();
        let token = CancelToken::new();
        let remote = token.clone();

        let canceller = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            remote.cancel();
        });
        let err = pow(64).mine_with_cancel(&Sha256, &mut b, &token).unwrap_err();
        canceller.join().unwrap();

        assert!(matches!(err, MiningError::Cancelled { attempts } if attempts > 0));
    }

    #[test]
    fn test_mine_parallel() {
        let mut b = block();
        let proof = pow(3)
            .mine_parallel(&Sha256, &mut b, 4, &CancelToken::new())
            .unwrap();

        assert!(b.hash.to_hex().starts_with("000"));
        assert_eq!(b.nonce, proof.nonce);
        assert!(pow(3).is_valid(&Sha256, &b));
    }

    #[test]
    fn test_mine_parallel_single_thread_matches_sequential() {
        let mut a = block();
        let mut b = block();
        let pa = pow(2).mine(&Sha256, &mut a).unwrap();
        let pb = pow(2)
            .mine_parallel(&Sha256, &mut b, 1, &CancelToken::new())
            .unwrap();
        assert_eq!(pa, pb);
    }

    #[test]
    fn test_mine_parallel_requires_threads() {
        let mut b = block();
        assert_eq!(
            pow(1).mine_parallel(&Sha256, &mut b, 0, &CancelToken::new()),
            Err(MiningError::NoThreads)
        );
    }

    #[test]
    fn test_mine_parallel_thread_limit() {
        let mut b = block();
        let before = b.clone();
        assert_eq!(
            pow(1).mine_parallel(&Sha256, &mut b, MAX_MINING_THREADS + 1, &CancelToken::new()),
            Err(MiningError::TooManyThreads(MAX_MINING_THREADS + 1))
        );
        assert_eq!(b, before);
    }

    #[test]
    fn test_mine_parallel_cancelled() {
        let mut b = block();
        let before = b.clone();
        let token = CancelToken::new();
        token.cancel();
        let err = pow(64)
            .mine_parallel(&Sha256, &mut b, 3, &token)
            .unwrap_err();
        assert!(matches!(err, MiningError::Cancelled { .. }));
        assert_eq!(b, before);
    }

    #[test]
    fn test_is_valid_rejects_stale_hash() {
        let mut b = block();
        pow(1).mine(&Sha256, &mut b).unwrap();
        b.timestamp += 1;
        assert!(!pow(1).is_valid(&Sha256, &b));
    }

    #[test]
    fn test_is_valid_rejects_insufficient_work() {
        let mut b = block();
        // Find a nonce whose digest starts with a non-zero character.
        let nonce = (0..)
            .find(|n| !b.attempt(&Sha256, *n).meets_difficulty(1))
            .unwrap();
        let hash = b.attempt(&Sha256, nonce);
        b.commit(nonce, hash);
        assert!(b.verify_hash(&Sha256));
        assert!(!pow(1).is_valid(&Sha256, &b));
    }
}
