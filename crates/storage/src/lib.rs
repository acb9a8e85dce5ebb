//! Persistent storage layer for powledger.
//!
//! Every block lives in its own pretty-printed JSON file named
//! `block_{index}_{hash prefix}.json`, so a ledger can be inspected (and
//! tampered with) using nothing but a text editor:
//! - Linear ledger (`dlt/`): blocks linked in index order
//! - Tree ledger (`dlt_tree/`): each block extends a parent with a free slot
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Application Layer                    │
//! │                (CLI, Chain, Proof of Work)              │
//! └────────────────────────┬────────────────────────────────┘
//!                          │
//! ┌────────────────────────▼────────────────────────────────┐
//! │                   Storage Layer                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────┐  │
//! │  │ LedgerStore │  │ TreeStore   │  │ BlockDir        │  │
//! │  │  - Save     │  │  - Parents  │  │  - file names   │  │
//! │  │  - Load     │  │  - Children │  │  - JSON I/O     │  │
//! │  │  - Render   │  │  - Validate │  │  - listing      │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────┘  │
//! └────────────────────────┬────────────────────────────────┘
//!                          │
//! ┌────────────────────────▼────────────────────────────────┐
//! │                     File System                         │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use powledger_chain::{Chain, ChainConfig};
//! use powledger_core::Sha256;
//! use powledger_storage::LedgerStore;
//!
//! let store = LedgerStore::open("./data/dlt").unwrap();
//! let chain = Chain::new(Sha256, ChainConfig::default()).unwrap();
//! store.save_new_blocks(&chain).unwrap();
//!
//! let reloaded = store.load_chain(Sha256, ChainConfig::default()).unwrap();
//! assert!(reloaded.validate().is_valid());
//! ```

pub mod chain;
pub mod db;
pub mod tree;

// Re-export commonly used types
pub use chain::{render_linear, LedgerStore};
pub use db::{BlockDir, BlockFile, Result, StorageError};
pub use tree::{TreeFault, TreeRecord, TreeStatus, TreeStore};
