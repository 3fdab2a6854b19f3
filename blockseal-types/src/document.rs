//! Persisted envelope document
//!
//! The document is a flat JSON object with stable field names:
//!
//! ```json
//! { "ver": 1, "block": 42, "org": "orgA", "ksig": "<base64>",
//!   "rechash": ["<base64 imprint>", "<base64 imprint>"], "extended": false }
//! ```
//!
//! `ver` gates everything else: it is read and checked before any other
//! field is looked at, so a document of an unknown version is rejected even
//! when the rest of it would parse.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Version written by this implementation
pub const CURRENT_VERSION: u32 = 1;

/// Versions this implementation can read
pub const SUPPORTED_VERSIONS: &[u32] = &[CURRENT_VERSION];

pub fn is_supported_version(version: u32) -> bool {
    SUPPORTED_VERSIONS.contains(&version)
}

pub fn supported_versions_string() -> String {
    let list: Vec<String> = SUPPORTED_VERSIONS.iter().map(|v| v.to_string()).collect();
    format!("[{}]", list.join(", "))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeDocument {
    pub ver: u32,
    pub block: u64,
    pub org: String,
    /// Opaque authority signature, base64
    pub ksig: String,
    /// Record digest imprints, base64. Absent in documents written from an
    /// extension that carried no digests.
    #[serde(default)]
    pub rechash: Vec<String>,
    /// Informational only; readers derive the flag from `ksig`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extended: Option<bool>,
}

impl EnvelopeDocument {
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a stored document, checking the version before anything else
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::Encoding("empty envelope document".to_string()));
        }

        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        let object = value
            .as_object()
            .ok_or_else(|| Error::Encoding("envelope document is not a JSON object".to_string()))?;

        let version = match object.get("ver") {
            None => {
                return Err(Error::Version {
                    found: "missing".to_string(),
                    supported: supported_versions_string(),
                })
            }
            Some(ver) => ver,
        };

        match version.as_u64() {
            Some(v) if v <= u32::MAX as u64 && is_supported_version(v as u32) => {}
            _ => {
                return Err(Error::Version {
                    found: version.to_string(),
                    supported: supported_versions_string(),
                })
            }
        }

        Ok(serde_json::from_value(value)?)
    }
}
