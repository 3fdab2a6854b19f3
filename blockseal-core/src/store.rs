//! Envelope persistence on top of ledger state
//!
//! Envelopes live under `<namespace>.<org>.<block>`. Every write goes
//! through [`SignatureEnvelope::encode`] after all checks have passed, so a
//! rejected operation leaves the stored value untouched.

use crate::authority::OpaqueSignature;
use crate::envelope::{envelope_key, SignatureEnvelope};
use crate::state::LedgerState;
use blockseal_types::{Error, Imprint, Result, Timestamp};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use tracing::{debug, info};

pub const DEFAULT_NAMESPACE: &str = "blocksig";

/// Most blocks a single [`EnvelopeStore::summary`] call covers
pub const MAX_SUMMARY_BLOCKS: u64 = 10_000;

/// What `create` does when an envelope already exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CreatePolicy {
    #[default]
    Overwrite,
    RejectExisting,
}

/// Condensed view of a stored signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureSummary {
    pub aggregation_time: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication_time: Option<Timestamp>,
    pub input_hash: Imprint,
    pub extended: bool,
}

impl SignatureSummary {
    pub fn of<S: OpaqueSignature>(envelope: &SignatureEnvelope<S>) -> Self {
        let signature = envelope.signature();
        Self {
            aggregation_time: signature.aggregation_time(),
            publication_time: signature.publication_time(),
            input_hash: signature.input_hash().clone(),
            extended: signature.is_extended(),
        }
    }
}

/// A summary, or why one could not be produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SummaryRecord {
    Signature(SignatureSummary),
    Error { error: String },
}

impl SummaryRecord {
    fn from_result<S: OpaqueSignature>(result: Result<SignatureEnvelope<S>>) -> Self {
        match result {
            Ok(envelope) => SummaryRecord::Signature(SignatureSummary::of(&envelope)),
            Err(e) => SummaryRecord::Error {
                error: e.to_string(),
            },
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SummaryRecord::Error { .. })
    }
}

/// One historical value of an envelope key. `index` 0 is the first write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub index: usize,
    #[serde(flatten)]
    pub record: SummaryRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockSummary {
    pub block: u64,
    #[serde(flatten)]
    pub record: SummaryRecord,
}

pub struct EnvelopeStore<L, S> {
    ledger: L,
    namespace: String,
    create_policy: CreatePolicy,
    _signature: PhantomData<fn() -> S>,
}

impl<L: LedgerState, S: OpaqueSignature> EnvelopeStore<L, S> {
    pub fn new(ledger: L, namespace: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        if namespace.is_empty() {
            return Err(Error::InvalidInput("namespace must not be empty".to_string()));
        }
        Ok(Self {
            ledger,
            namespace,
            create_policy: CreatePolicy::default(),
            _signature: PhantomData,
        })
    }

    pub fn with_create_policy(mut self, policy: CreatePolicy) -> Self {
        self.create_policy = policy;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn full_key(&self, org: &str, block: u64) -> String {
        format!("{}.{}", self.namespace, envelope_key(org, block))
    }

    pub fn create(&self, envelope: &SignatureEnvelope<S>) -> Result<()> {
        let key = self.full_key(envelope.org(), envelope.block());

        if self.create_policy == CreatePolicy::RejectExisting && self.exists(&key)? {
            return Err(Error::Integrity(format!(
                "envelope already exists under {}",
                key
            )));
        }

        self.ledger.put_state(&key, &envelope.encode()?)?;
        info!(key = %key, extended = envelope.is_extended(), "stored signature envelope");
        Ok(())
    }

    pub fn get(&self, org: &str, block: u64) -> Result<SignatureEnvelope<S>> {
        let key = self.full_key(org, block);
        let bytes = match self.ledger.get_state(&key)? {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => return Err(Error::NotFound { key }),
        };

        let envelope = SignatureEnvelope::decode(&bytes)?;
        if envelope.org() != org || envelope.block() != block {
            return Err(Error::Integrity(format!(
                "value under {} belongs to {}",
                key,
                envelope.key()
            )));
        }
        debug!(key = %key, "loaded signature envelope");
        Ok(envelope)
    }

    /// Like [`get`](Self::get) but a missing envelope is `None`
    pub fn try_get(&self, org: &str, block: u64) -> Result<Option<SignatureEnvelope<S>>> {
        match self.get(org, block) {
            Ok(envelope) => Ok(Some(envelope)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Replace a stored envelope with an extended version of the same signature.
    ///
    /// The candidate must carry the same input hash and aggregation time as
    /// the stored signature and must itself be extended. Record digests are
    /// carried forward from the stored envelope when the candidate has none.
    pub fn extend(
        &self,
        org: &str,
        block: u64,
        candidate: SignatureEnvelope<S>,
    ) -> Result<SignatureEnvelope<S>> {
        let key = self.full_key(org, block);
        if candidate.org() != org || candidate.block() != block {
            return Err(Error::Integrity(format!(
                "candidate {} cannot extend {}",
                candidate.key(),
                envelope_key(org, block)
            )));
        }

        let stored = self.get(org, block)?;
        let (old, new) = (stored.signature(), candidate.signature());

        if old.input_hash() != new.input_hash() {
            return Err(Error::Integrity(format!(
                "input hashes differ for {}: {} != {}",
                key,
                old.input_hash(),
                new.input_hash()
            )));
        }
        if old.aggregation_time() != new.aggregation_time() {
            return Err(Error::Integrity(format!(
                "aggregation times differ for {}: {} != {}",
                key,
                old.aggregation_time(),
                new.aggregation_time()
            )));
        }
        if !new.is_extended() {
            return Err(Error::Integrity(format!(
                "candidate signature for {} is not extended",
                key
            )));
        }

        let candidate = if candidate.record_digests().is_empty() && !stored.record_digests().is_empty() {
            candidate.with_record_digests(stored.record_digests().to_vec())?
        } else {
            candidate
        };

        self.ledger.put_state(&key, &candidate.encode()?)?;
        info!(
            key = %key,
            publication_time = ?candidate.signature().publication_time(),
            "extended signature envelope"
        );
        Ok(candidate)
    }

    /// Every value ever stored for the key, newest first
    pub fn history(&self, org: &str, block: u64) -> Result<Vec<HistoryEntry>> {
        let key = self.full_key(org, block);
        let values = self.ledger.get_history(&key)?;
        let mut entries: Vec<HistoryEntry> = values
            .iter()
            .enumerate()
            .map(|(index, bytes)| HistoryEntry {
                index,
                record: SummaryRecord::from_result(SignatureEnvelope::<S>::decode(bytes)),
            })
            .collect();
        entries.reverse();
        Ok(entries)
    }

    /// Summaries for blocks `first..=last`
    pub fn summary(&self, org: &str, first: u64, last: u64) -> Result<Vec<BlockSummary>> {
        if first > last {
            return Err(Error::InvalidInput(format!(
                "first block {} is after last block {}",
                first, last
            )));
        }
        if last - first >= MAX_SUMMARY_BLOCKS {
            return Err(Error::InvalidInput(format!(
                "range {}..={} covers more than {} blocks",
                first, last, MAX_SUMMARY_BLOCKS
            )));
        }
        Ok((first..=last)
            .map(|block| BlockSummary {
                block,
                record: SummaryRecord::from_result(self.get(org, block)),
            })
            .collect())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(matches!(self.ledger.get_state(key)?, Some(bytes) if !bytes.is_empty()))
    }
}
