//! Primitive cryptographic types

use crate::error::{Error, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::Digest as _;
use std::fmt;
use std::str::FromStr;

/// Hash algorithms an imprint can be tagged with.
///
/// The numeric identifiers are the leading byte of an imprint. SHA-2 ids
/// follow the KSI registry; BLAKE3 uses an id from the locally reserved
/// range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    #[serde(rename = "SHA-256")]
    Sha256,
    #[serde(rename = "SHA-384")]
    Sha384,
    #[serde(rename = "SHA-512")]
    Sha512,
    #[serde(rename = "BLAKE3")]
    Blake3,
}

impl HashAlgorithm {
    /// Algorithm the ledger platform hashes raw block data with
    pub const LEDGER: HashAlgorithm = HashAlgorithm::Sha256;

    pub fn id(&self) -> u8 {
        match self {
            HashAlgorithm::Sha256 => 0x01,
            HashAlgorithm::Sha384 => 0x04,
            HashAlgorithm::Sha512 => 0x05,
            HashAlgorithm::Blake3 => 0x60,
        }
    }

    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            0x01 => Ok(HashAlgorithm::Sha256),
            0x04 => Ok(HashAlgorithm::Sha384),
            0x05 => Ok(HashAlgorithm::Sha512),
            0x60 => Ok(HashAlgorithm::Blake3),
            other => Err(Error::Encoding(format!(
                "unknown hash algorithm id 0x{:02x}",
                other
            ))),
        }
    }

    /// Digest length in bytes
    pub fn digest_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha256 | HashAlgorithm::Blake3 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "SHA-256",
            HashAlgorithm::Sha384 => "SHA-384",
            HashAlgorithm::Sha512 => "SHA-512",
            HashAlgorithm::Blake3 => "BLAKE3",
        }
    }

    pub fn hasher(&self) -> DataHasher {
        DataHasher::new(*self)
    }

    /// One-shot hash of `data`
    pub fn digest(&self, data: &[u8]) -> Imprint {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finalize()
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().replace('_', "-").as_str() {
            "SHA-256" | "SHA256" | "SHA2-256" => Ok(HashAlgorithm::Sha256),
            "SHA-384" | "SHA384" | "SHA2-384" => Ok(HashAlgorithm::Sha384),
            "SHA-512" | "SHA512" | "SHA2-512" => Ok(HashAlgorithm::Sha512),
            "BLAKE3" => Ok(HashAlgorithm::Blake3),
            _ => Err(Error::InvalidInput(format!("unknown hash algorithm '{}'", s))),
        }
    }
}

/// Streaming hasher producing an [`Imprint`]
pub enum DataHasher {
    Sha256(sha2::Sha256),
    Sha384(sha2::Sha384),
    Sha512(sha2::Sha512),
    Blake3(Box<blake3::Hasher>),
}

impl DataHasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => DataHasher::Sha256(sha2::Sha256::new()),
            HashAlgorithm::Sha384 => DataHasher::Sha384(sha2::Sha384::new()),
            HashAlgorithm::Sha512 => DataHasher::Sha512(sha2::Sha512::new()),
            HashAlgorithm::Blake3 => DataHasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        match self {
            DataHasher::Sha256(h) => h.update(data),
            DataHasher::Sha384(h) => h.update(data),
            DataHasher::Sha512(h) => h.update(data),
            DataHasher::Blake3(h) => {
                h.update(data);
            }
        }
        self
    }

    pub fn finalize(self) -> Imprint {
        let (algorithm, digest) = match self {
            DataHasher::Sha256(h) => (HashAlgorithm::Sha256, h.finalize().to_vec()),
            DataHasher::Sha384(h) => (HashAlgorithm::Sha384, h.finalize().to_vec()),
            DataHasher::Sha512(h) => (HashAlgorithm::Sha512, h.finalize().to_vec()),
            DataHasher::Blake3(h) => (HashAlgorithm::Blake3, h.finalize().as_bytes().to_vec()),
        };
        Imprint { algorithm, digest }
    }
}

/// A digest tagged with the algorithm that produced it.
///
/// Byte form is `[algorithm id] || digest`. Serialized as base64 of that
/// byte form, which is what the envelope's `rechash` list carries.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Imprint {
    algorithm: HashAlgorithm,
    digest: Vec<u8>,
}

impl Imprint {
    pub fn new(algorithm: HashAlgorithm, digest: &[u8]) -> Result<Self> {
        if digest.len() != algorithm.digest_len() {
            return Err(Error::Encoding(format!(
                "{} digest must be {} bytes, got {}",
                algorithm,
                algorithm.digest_len(),
                digest.len()
            )));
        }
        Ok(Self {
            algorithm,
            digest: digest.to_vec(),
        })
    }

    /// Parse the `[id] || digest` byte form
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (id, digest) = bytes
            .split_first()
            .ok_or_else(|| Error::Encoding("empty imprint".to_string()))?;
        Self::new(HashAlgorithm::from_id(*id)?, digest)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.digest.len());
        out.push(self.algorithm.id());
        out.extend_from_slice(&self.digest);
        out
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn digest(&self) -> &[u8] {
        &self.digest
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.to_bytes())
    }

    pub fn from_base64(s: &str) -> Result<Self> {
        let bytes = BASE64.decode(s)?;
        Self::from_bytes(&bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.digest)
    }
}

impl Serialize for Imprint {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for Imprint {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        Self::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}

impl fmt::Debug for Imprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = &self.digest[..self.digest.len().min(8)];
        write!(f, "Imprint({}:{})", self.algorithm, hex::encode(head))
    }
}

impl fmt::Display for Imprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_hex())
    }
}

/// A timestamp with nanosecond precision
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    /// Seconds since UNIX epoch
    pub seconds: i64,
    /// Nanoseconds (0-999,999,999)
    pub nanos: u32,
}

impl Timestamp {
    pub fn new(seconds: i64, nanos: u32) -> Result<Self> {
        if nanos >= 1_000_000_000 {
            return Err(Error::InvalidInput(
                "nanoseconds must be less than 1,000,000,000".to_string(),
            ));
        }
        Ok(Self { seconds, nanos })
    }

    pub fn from_seconds(seconds: i64) -> Self {
        Self { seconds, nanos: 0 }
    }

    pub fn now() -> Self {
        let now = chrono::Utc::now();
        Self {
            seconds: now.timestamp(),
            nanos: now.timestamp_subsec_nanos(),
        }
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({}.{:09})", self.seconds, self.nanos)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(dt) = chrono::DateTime::from_timestamp(self.seconds, self.nanos) {
            write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S UTC"))
        } else {
            write!(f, "{}.{:09}", self.seconds, self.nanos)
        }
    }
}
