//! Ed25519-backed timestamp authority
//!
//! Stands in for a remote timestamping service: it signs aggregation roots
//! with a local key, "extends" by attaching a publication time and
//! re-signing, and verifies under the same policies a remote service would
//! offer. Signatures serialize as a small JSON token.

use crate::authority::{OpaqueSignature, TimestampAuthority, VerificationOutcome, VerificationPolicy};
use blockseal_types::{encoding::base64_bytes, Error, HashAlgorithm, Imprint, Result, Timestamp};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix of every signed message
pub const SIGNATURE_DOMAIN: &[u8] = b"BLOCKSEAL-SIG-v1:";

const PUBLICATION_DOMAIN: &[u8] = b"BLOCKSEAL-PUB-v1:";

/// Build the message that is signed for a timestamp token
///
/// Format: domain || imprint || level || aggregation time || publication
/// marker and time. Integers are big-endian.
pub fn build_sign_message(
    input_hash: &Imprint,
    level: u8,
    aggregation_time: &Timestamp,
    publication_time: Option<&Timestamp>,
) -> Vec<u8> {
    let imprint = input_hash.to_bytes();
    let mut message = Vec::with_capacity(SIGNATURE_DOMAIN.len() + imprint.len() + 26);
    message.extend_from_slice(SIGNATURE_DOMAIN);
    message.extend_from_slice(&imprint);
    message.push(level);
    message.extend_from_slice(&aggregation_time.seconds.to_be_bytes());
    message.extend_from_slice(&aggregation_time.nanos.to_be_bytes());
    match publication_time {
        Some(published) => {
            message.push(1);
            message.extend_from_slice(&published.seconds.to_be_bytes());
            message.extend_from_slice(&published.nanos.to_be_bytes());
        }
        None => message.push(0),
    }
    message
}

/// Publication string for the publication an authority key made at
/// `publication_time`: `<seconds>:<hex SHA-256 of key and time>`.
pub fn publication_code(public_key: &[u8], publication_time: &Timestamp) -> String {
    let mut hasher = HashAlgorithm::Sha256.hasher();
    hasher
        .update(PUBLICATION_DOMAIN)
        .update(public_key)
        .update(&publication_time.seconds.to_be_bytes())
        .update(&publication_time.nanos.to_be_bytes());
    format!("{}:{}", publication_time.seconds, hex::encode(hasher.finalize().digest()))
}

/// Timestamp token issued by [`LocalAuthority`]
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSignature {
    input_hash: Imprint,
    level: u8,
    aggregation_time: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    publication_time: Option<Timestamp>,
    #[serde(with = "base64_bytes")]
    public_key: Vec<u8>,
    #[serde(with = "base64_bytes")]
    signature: Vec<u8>,
}

impl LocalSignature {
    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Publication string of the publication this token is linked to
    pub fn publication_string(&self) -> Option<String> {
        self.publication_time
            .as_ref()
            .map(|published| publication_code(&self.public_key, published))
    }

    fn signed_message(&self) -> Vec<u8> {
        build_sign_message(
            &self.input_hash,
            self.level,
            &self.aggregation_time,
            self.publication_time.as_ref(),
        )
    }

    fn verify_with(&self, key: &VerifyingKey) -> std::result::Result<(), String> {
        if self.public_key.as_slice() != key.as_bytes() {
            return Err("signature was issued under a different key".to_string());
        }
        let bytes: [u8; 64] = self
            .signature
            .as_slice()
            .try_into()
            .map_err(|_| "signature has wrong length".to_string())?;
        key.verify(&self.signed_message(), &Signature::from_bytes(&bytes))
            .map_err(|_| "signature does not verify".to_string())
    }
}

impl fmt::Debug for LocalSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSignature")
            .field("input_hash", &self.input_hash)
            .field("level", &self.level)
            .field("aggregation_time", &self.aggregation_time)
            .field("publication_time", &self.publication_time)
            .finish_non_exhaustive()
    }
}

impl OpaqueSignature for LocalSignature {
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let signature: LocalSignature = serde_json::from_slice(bytes)?;
        if signature.public_key.len() != 32 {
            return Err(Error::Encoding(format!(
                "signature public key must be 32 bytes, got {}",
                signature.public_key.len()
            )));
        }
        if signature.signature.len() != 64 {
            return Err(Error::Encoding(format!(
                "signature must be 64 bytes, got {}",
                signature.signature.len()
            )));
        }
        if let Some(published) = &signature.publication_time {
            if *published < signature.aggregation_time {
                return Err(Error::Encoding(
                    "publication time precedes aggregation time".to_string(),
                ));
            }
        }
        Ok(signature)
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn input_hash(&self) -> &Imprint {
        &self.input_hash
    }

    fn aggregation_time(&self) -> Timestamp {
        self.aggregation_time
    }

    fn is_extended(&self) -> bool {
        self.publication_time.is_some()
    }

    fn publication_time(&self) -> Option<Timestamp> {
        self.publication_time
    }
}

/// Authority holding an Ed25519 signing key
pub struct LocalAuthority {
    signing_key: SigningKey,
}

impl LocalAuthority {
    pub fn new(signing_key: SigningKey) -> Self {
        Self { signing_key }
    }

    pub fn generate() -> Self {
        Self::new(SigningKey::generate(&mut rand::thread_rng()))
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self::new(SigningKey::from_bytes(seed))
    }

    /// Load a key from its 32-byte seed in hex
    pub fn from_hex(seed_hex: &str) -> Result<Self> {
        let bytes = hex::decode(seed_hex.trim())?;
        let seed: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            Error::Authority(format!("signing key seed must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self::from_seed(&seed))
    }

    pub fn seed_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.verifying_key().as_bytes())
    }

    /// Publication string this authority publishes for `publication_time`
    pub fn publication_string(&self, publication_time: &Timestamp) -> String {
        publication_code(self.verifying_key().as_bytes(), publication_time)
    }

    /// Compare a token with the record this authority would hold for it:
    /// the same root, level and aggregation time signed afresh, extended to
    /// the token's publication when it has one.
    fn check_calendar(&self, signature: &LocalSignature) -> std::result::Result<(), String> {
        let issued = self.sign_at(&signature.input_hash, signature.level, signature.aggregation_time);
        let record = match signature.publication_time {
            Some(published) => self.extend_at(&issued, published).map_err(|e| e.to_string())?,
            None => issued,
        };
        if record != *signature {
            return Err("signature does not match the authority's calendar record".to_string());
        }
        Ok(())
    }

    /// Sign with an explicit aggregation time
    pub fn sign_at(&self, root: &Imprint, level: u8, aggregation_time: Timestamp) -> LocalSignature {
        self.issue(root.clone(), level, aggregation_time, None)
    }

    /// Extend with an explicit publication time
    pub fn extend_at(
        &self,
        signature: &LocalSignature,
        publication_time: Timestamp,
    ) -> Result<LocalSignature> {
        signature
            .verify_with(&self.verifying_key())
            .map_err(|reason| Error::Authority(format!("cannot extend: {}", reason)))?;

        if signature.is_extended() {
            return Ok(signature.clone());
        }
        if publication_time < signature.aggregation_time {
            return Err(Error::Authority(format!(
                "no publication after aggregation time {}",
                signature.aggregation_time
            )));
        }

        Ok(self.issue(
            signature.input_hash.clone(),
            signature.level,
            signature.aggregation_time,
            Some(publication_time),
        ))
    }

    fn issue(
        &self,
        input_hash: Imprint,
        level: u8,
        aggregation_time: Timestamp,
        publication_time: Option<Timestamp>,
    ) -> LocalSignature {
        let message = build_sign_message(&input_hash, level, &aggregation_time, publication_time.as_ref());
        let signature = self.signing_key.sign(&message);
        LocalSignature {
            input_hash,
            level,
            aggregation_time,
            publication_time,
            public_key: self.verifying_key().as_bytes().to_vec(),
            signature: signature.to_bytes().to_vec(),
        }
    }
}

impl TimestampAuthority for LocalAuthority {
    type Signature = LocalSignature;

    fn sign(&self, root: &Imprint, level: u8) -> Result<LocalSignature> {
        // Aggregation rounds are one second wide
        let now = Timestamp::from_seconds(Timestamp::now().seconds);
        Ok(self.sign_at(root, level, now))
    }

    fn extend(&self, signature: &LocalSignature) -> Result<LocalSignature> {
        self.extend_at(signature, Timestamp::from_seconds(Timestamp::now().seconds))
    }

    fn verify(
        &self,
        signature: &LocalSignature,
        root: &Imprint,
        level: u8,
        policy: VerificationPolicy,
    ) -> Result<VerificationOutcome> {
        let (check_key, check_publication) = match &policy {
            VerificationPolicy::Internal | VerificationPolicy::Calendar => (false, false),
            VerificationPolicy::Key => (true, false),
            VerificationPolicy::Publication | VerificationPolicy::UserPublication(_) => (true, true),
            VerificationPolicy::Default => (true, signature.is_extended()),
        };

        if signature.input_hash != *root {
            return Ok(VerificationOutcome::fail(
                &policy,
                format!("input hash {} does not match {}", signature.input_hash, root),
            ));
        }
        if signature.level != level {
            return Ok(VerificationOutcome::fail(
                &policy,
                format!("input level {} does not match {}", signature.level, level),
            ));
        }

        if check_key {
            if let Err(reason) = signature.verify_with(&self.verifying_key()) {
                return Ok(VerificationOutcome::fail(&policy, reason));
            }
        }

        if policy == VerificationPolicy::Calendar {
            if let Err(reason) = self.check_calendar(signature) {
                return Ok(VerificationOutcome::fail(&policy, reason));
            }
        }

        if check_publication && !signature.is_extended() {
            return Ok(VerificationOutcome::indeterminate(
                &policy,
                "signature is not extended to a publication",
            ));
        }

        if let VerificationPolicy::UserPublication(expected) = &policy {
            let linked = signature.publication_string().unwrap_or_default();
            if linked != *expected {
                return Ok(VerificationOutcome::fail(
                    &policy,
                    format!("signature is linked to publication {}, not {}", linked, expected),
                ));
            }
        }

        Ok(VerificationOutcome::ok(&policy))
    }
}
