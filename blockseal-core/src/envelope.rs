//! Signature envelopes: what gets persisted per organization and block

use crate::aggregate::Aggregator;
use crate::authority::OpaqueSignature;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use blockseal_types::{
    document::{is_supported_version, supported_versions_string},
    EnvelopeDocument, Error, Imprint, Result, CURRENT_VERSION,
};
use tracing::warn;

/// Key an envelope is stored under, before namespacing
pub fn envelope_key(org: &str, block: u64) -> String {
    format!("{}.{}", org, block)
}

/// Check that `record_digests` aggregate to the signature's input hash.
///
/// Aggregation uses the algorithm of the input hash, so envelopes signed
/// under any configured algorithm can be checked without knowing it.
pub fn check_record_digests<S: OpaqueSignature>(signature: &S, record_digests: &[Imprint]) -> Result<()> {
    let expected = signature.input_hash();
    let aggregated = Aggregator::new(expected.algorithm()).aggregate(record_digests)?;
    if aggregated.root != *expected {
        return Err(Error::Integrity(format!(
            "record digests aggregate to {}, signature covers {}",
            aggregated.root, expected
        )));
    }
    Ok(())
}

/// A timestamp signature bound to one block of one organization.
///
/// Only constructible through [`SignatureEnvelope::create`] (directly or via
/// decode), so a value in hand has a supported version, a parseable
/// signature, and record digests that are either absent or consistent with
/// the signature.
#[derive(Debug, Clone)]
pub struct SignatureEnvelope<S> {
    version: u32,
    org: String,
    block: u64,
    signature_bytes: Vec<u8>,
    signature: S,
    record_digests: Vec<Imprint>,
}

impl<S: OpaqueSignature> SignatureEnvelope<S> {
    pub fn create(
        version: u32,
        signature_bytes: Vec<u8>,
        record_digests: Vec<Imprint>,
        block: u64,
        org: impl Into<String>,
    ) -> Result<Self> {
        if !is_supported_version(version) {
            return Err(Error::Version {
                found: version.to_string(),
                supported: supported_versions_string(),
            });
        }

        let org = org.into();
        if org.is_empty() {
            return Err(Error::InvalidInput("envelope org must not be empty".to_string()));
        }
        if signature_bytes.is_empty() {
            return Err(Error::InvalidInput("envelope signature must not be empty".to_string()));
        }

        let signature = S::from_bytes(&signature_bytes)?;

        match record_digests.len() {
            0 => {}
            2 => check_record_digests(&signature, &record_digests)?,
            n => {
                return Err(Error::Integrity(format!(
                    "expected 2 record digests, got {}",
                    n
                )))
            }
        }

        Ok(Self {
            version,
            org,
            block,
            signature_bytes,
            signature,
            record_digests,
        })
    }

    /// Envelope at the current version around an already parsed signature
    pub fn from_signature(
        signature: &S,
        record_digests: Vec<Imprint>,
        block: u64,
        org: impl Into<String>,
    ) -> Result<Self> {
        Self::create(CURRENT_VERSION, signature.to_bytes()?, record_digests, block, org)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        self.to_document().to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let document = EnvelopeDocument::from_slice(bytes)?;
        let signature_bytes = BASE64.decode(&document.ksig)?;
        let record_digests = document
            .rechash
            .iter()
            .map(|encoded| Imprint::from_base64(encoded))
            .collect::<Result<Vec<_>>>()?;

        // A stored document missing its org or signature is malformed
        let envelope = Self::create(
            document.ver,
            signature_bytes,
            record_digests,
            document.block,
            document.org,
        )
        .map_err(|e| match e {
            Error::InvalidInput(reason) => Error::Encoding(reason),
            other => other,
        })?;

        if let Some(stored) = document.extended {
            if stored != envelope.is_extended() {
                warn!(
                    key = %envelope.key(),
                    stored,
                    actual = envelope.is_extended(),
                    "stored extended flag disagrees with signature, using signature"
                );
            }
        }
        Ok(envelope)
    }

    pub fn to_document(&self) -> EnvelopeDocument {
        EnvelopeDocument {
            ver: self.version,
            block: self.block,
            org: self.org.clone(),
            ksig: BASE64.encode(&self.signature_bytes),
            rechash: self.record_digests.iter().map(Imprint::to_base64).collect(),
            extended: Some(self.is_extended()),
        }
    }

    /// Same signature and identity with different record digests
    pub fn with_record_digests(self, record_digests: Vec<Imprint>) -> Result<Self> {
        Self::create(
            self.version,
            self.signature_bytes,
            record_digests,
            self.block,
            self.org,
        )
    }

    pub fn key(&self) -> String {
        envelope_key(&self.org, self.block)
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn org(&self) -> &str {
        &self.org
    }

    pub fn block(&self) -> u64 {
        self.block
    }

    pub fn signature(&self) -> &S {
        &self.signature
    }

    pub fn signature_bytes(&self) -> &[u8] {
        &self.signature_bytes
    }

    pub fn record_digests(&self) -> &[Imprint] {
        &self.record_digests
    }

    pub fn is_extended(&self) -> bool {
        self.signature.is_extended()
    }
}

impl<S> PartialEq for SignatureEnvelope<S> {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.org == other.org
            && self.block == other.block
            && self.signature_bytes == other.signature_bytes
            && self.record_digests == other.record_digests
    }
}

impl<S> Eq for SignatureEnvelope<S> {}
