//! Notarization core for blockseal
//!
//! This crate provides:
//! - Canonical digests of ledger block identities
//! - Local hash tree aggregation of record digests
//! - The timestamp authority seam and an Ed25519 implementation of it
//! - Signature envelopes and their storage in ledger state
//! - Detection of blocks that only carry signature writes

pub mod aggregate;
pub mod authority;
pub mod canonical;
pub mod envelope;
pub mod filter;
pub mod local;
pub mod state;
pub mod store;

pub use aggregate::{Aggregator, HashTreeBuilder};
pub use authority::{
    OpaqueSignature, TimestampAuthority, VerificationOutcome, VerificationPolicy, VerificationStatus,
};
pub use canonical::Canonicalizer;
pub use envelope::{envelope_key, SignatureEnvelope};
pub use filter::SelfReferenceFilter;
pub use local::{LocalAuthority, LocalSignature};
pub use state::{LedgerState, MemoryLedger};
pub use store::{
    BlockSummary, CreatePolicy, EnvelopeStore, HistoryEntry, SignatureSummary, SummaryRecord,
    DEFAULT_NAMESPACE, MAX_SUMMARY_BLOCKS,
};
