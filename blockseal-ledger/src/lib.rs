//! Ledger collaborators for blockseal
//!
//! Persistent world state on sled, and the block sources the drivers read
//! from.

pub mod source;
pub mod storage;

pub use source::{parse_event_line, BlockEventReader, BlockSource, FileBlockSource, MemoryBlockSource};
pub use storage::SledLedger;
