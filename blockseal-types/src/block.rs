//! Ledger block model as seen by the notarization layer

use crate::primitives::Imprint;
use serde::{Deserialize, Serialize};

/// Identifying fields of a ledger block.
///
/// The digests are optional so that an incomplete block handed over by the
/// ledger collaborator can be represented and rejected by canonicalization
/// instead of at deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockIdentity {
    pub number: u64,
    #[serde(default)]
    pub previous_digest: Option<Imprint>,
    #[serde(default)]
    pub payload_digest: Option<Imprint>,
    /// Block metadata entries, in ledger order
    #[serde(default, with = "crate::encoding::base64_list")]
    pub metadata: Vec<Vec<u8>>,
}

impl BlockIdentity {
    pub fn new(
        number: u64,
        previous_digest: Imprint,
        payload_digest: Imprint,
        metadata: Vec<Vec<u8>>,
    ) -> Self {
        Self {
            number,
            previous_digest: Some(previous_digest),
            payload_digest: Some(payload_digest),
            metadata,
        }
    }
}

/// A block as delivered by a block source or the commit event stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerBlock {
    #[serde(flatten)]
    pub identity: BlockIdentity,
    /// Raw serialized transaction payloads
    #[serde(default, with = "crate::encoding::base64_list")]
    pub payloads: Vec<Vec<u8>>,
}

impl LedgerBlock {
    pub fn number(&self) -> u64 {
        self.identity.number
    }
}

/// The two digests derived from a [`BlockIdentity`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub header_digest: Imprint,
    pub metadata_digest: Imprint,
}

impl CanonicalRecord {
    /// Leaves in the order they are aggregated
    pub fn leaves(&self) -> [Imprint; 2] {
        [self.header_digest.clone(), self.metadata_digest.clone()]
    }
}

/// A node of the local aggregation tree. Leaves sit at level 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashTreeNode {
    pub level: u8,
    pub imprint: Imprint,
}

impl HashTreeNode {
    pub fn leaf(imprint: Imprint) -> Self {
        Self { level: 0, imprint }
    }
}

/// Root of a local aggregation: what is submitted to the authority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub root: Imprint,
    pub level: u8,
}
