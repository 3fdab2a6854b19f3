//! Canonical digests of a ledger block's identifying fields

use blockseal_types::{BlockIdentity, CanonicalRecord, Error, HashAlgorithm, Imprint, Result};

/// Turns a [`BlockIdentity`] into the two record digests that get
/// aggregated and timestamped.
///
/// Both digests are computed with the ledger's own hash algorithm so that
/// anyone holding the raw block can recompute them. That algorithm is fixed
/// by the ledger platform and is deliberately not configurable here; the
/// configurable algorithm lives on the [`Aggregator`](crate::Aggregator).
#[derive(Debug, Clone)]
pub struct Canonicalizer {
    algorithm: HashAlgorithm,
}

impl Canonicalizer {
    pub fn new() -> Self {
        Self {
            algorithm: HashAlgorithm::LEDGER,
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn canonicalize(&self, identity: &BlockIdentity) -> Result<CanonicalRecord> {
        Ok(CanonicalRecord {
            header_digest: self.header_digest(identity)?,
            metadata_digest: self.metadata_digest(identity),
        })
    }

    /// Hash of `SEQUENCE { INTEGER number, OCTET STRING previous, OCTET STRING payload }` (DER)
    pub fn header_digest(&self, identity: &BlockIdentity) -> Result<Imprint> {
        let encoded = encode_header(identity)?;
        Ok(self.algorithm.digest(&encoded))
    }

    /// Single streaming hash over the metadata entries, in order
    pub fn metadata_digest(&self, identity: &BlockIdentity) -> Imprint {
        let mut hasher = self.algorithm.hasher();
        for entry in &identity.metadata {
            hasher.update(entry);
        }
        hasher.finalize()
    }
}

impl Default for Canonicalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// DER encoding of the block header fields
pub fn encode_header(identity: &BlockIdentity) -> Result<Vec<u8>> {
    let previous = identity.previous_digest.as_ref().ok_or_else(|| {
        Error::Canonicalization(format!(
            "block {} has no previous block digest",
            identity.number
        ))
    })?;
    let payload = identity.payload_digest.as_ref().ok_or_else(|| {
        Error::Canonicalization(format!("block {} has no payload digest", identity.number))
    })?;

    let mut body = Vec::with_capacity(16 + previous.digest().len() + payload.digest().len());
    der_integer(identity.number, &mut body);
    der_octet_string(previous.digest(), &mut body);
    der_octet_string(payload.digest(), &mut body);

    let mut out = Vec::with_capacity(body.len() + 4);
    der_tlv(0x30, &body, &mut out);
    Ok(out)
}

fn der_integer(value: u64, out: &mut Vec<u8>) {
    let bytes = value.to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
    let mut content = Vec::with_capacity(9);
    // Keep the value positive in two's complement
    if bytes[first] & 0x80 != 0 {
        content.push(0);
    }
    content.extend_from_slice(&bytes[first..]);
    der_tlv(0x02, &content, out);
}

fn der_octet_string(value: &[u8], out: &mut Vec<u8>) {
    der_tlv(0x04, value, out);
}

fn der_tlv(tag: u8, content: &[u8], out: &mut Vec<u8>) {
    out.push(tag);
    der_length(content.len(), out);
    out.extend_from_slice(content);
}

fn der_length(len: usize, out: &mut Vec<u8>) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
    out.push(0x80 | (bytes.len() - first) as u8);
    out.extend_from_slice(&bytes[first..]);
}
