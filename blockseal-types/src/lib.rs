//! Core types and wire formats for blockseal
//!
//! This crate defines the algorithm-tagged digests, the ledger block model
//! and the persisted envelope document shared by the rest of the workspace.

pub mod block;
pub mod document;
pub mod encoding;
pub mod error;
pub mod primitives;

pub use block::{AggregationResult, BlockIdentity, CanonicalRecord, HashTreeNode, LedgerBlock};
pub use document::{EnvelopeDocument, CURRENT_VERSION, SUPPORTED_VERSIONS};
pub use error::{Error, Result};
pub use primitives::{DataHasher, HashAlgorithm, Imprint, Timestamp};
