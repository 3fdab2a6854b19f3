//! Seams to the external timestamping authority
//!
//! Signatures are opaque to the rest of the workspace: only the handful of
//! properties below are ever inspected, everything else is carried through
//! as bytes.

use blockseal_types::{Error, Imprint, Result, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A timestamp signature issued by an authority
pub trait OpaqueSignature: Clone + fmt::Debug + Send + Sync + 'static {
    /// Parse serialized signature bytes
    fn from_bytes(bytes: &[u8]) -> Result<Self>;

    /// Serialized form, accepted back by [`OpaqueSignature::from_bytes`]
    fn to_bytes(&self) -> Result<Vec<u8>>;

    /// The imprint that was submitted for signing
    fn input_hash(&self) -> &Imprint;

    fn aggregation_time(&self) -> Timestamp;

    /// Whether the signature has been linked to a publication
    fn is_extended(&self) -> bool;

    fn publication_time(&self) -> Option<Timestamp>;
}

/// Issues, extends and verifies signatures
pub trait TimestampAuthority: Send + Sync {
    type Signature: OpaqueSignature;

    /// Sign an aggregation root. `level` is the height of the local tree
    /// the root was produced by.
    fn sign(&self, root: &Imprint, level: u8) -> Result<Self::Signature>;

    fn extend(&self, signature: &Self::Signature) -> Result<Self::Signature>;

    fn verify(
        &self,
        signature: &Self::Signature,
        root: &Imprint,
        level: u8,
        policy: VerificationPolicy,
    ) -> Result<VerificationOutcome>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerificationPolicy {
    /// Signature is consistent with the given root and level
    Internal,
    /// Internal checks plus the authority's key
    Key,
    /// Internal checks plus a match against the authority's own calendar
    /// record for the signature
    Calendar,
    /// Key checks plus a publication the signature is linked to
    Publication,
    /// Key checks plus a link to the given publication string
    UserPublication(String),
    /// Publication for extended signatures, key otherwise
    #[default]
    Default,
}

impl VerificationPolicy {
    /// Prefix of the textual form of [`VerificationPolicy::UserPublication`]
    pub const USER_PUBLICATION_PREFIX: &'static str = "user-publication:";

    pub fn name(&self) -> &'static str {
        match self {
            VerificationPolicy::Internal => "InternalVerificationPolicy",
            VerificationPolicy::Key => "KeyBasedVerificationPolicy",
            VerificationPolicy::Calendar => "CalendarBasedVerificationPolicy",
            VerificationPolicy::Publication => "PublicationBasedVerificationPolicy",
            VerificationPolicy::UserPublication(_) => "UserProvidedPublicationBasedVerificationPolicy",
            VerificationPolicy::Default => "DefaultVerificationPolicy",
        }
    }
}

impl fmt::Display for VerificationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parses `internal`, `key`, `calendar`, `publication`, `default` and
/// `user-publication:<publication string>`, ignoring case of the name.
impl FromStr for VerificationPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let prefix_len = Self::USER_PUBLICATION_PREFIX.len();
        if s.len() >= prefix_len
            && s.is_char_boundary(prefix_len)
            && s[..prefix_len].eq_ignore_ascii_case(Self::USER_PUBLICATION_PREFIX)
        {
            let publication = s[prefix_len..].trim();
            if publication.is_empty() {
                return Err(Error::InvalidInput(
                    "user-publication policy needs a publication string".to_string(),
                ));
            }
            return Ok(VerificationPolicy::UserPublication(publication.to_string()));
        }

        match s.to_ascii_lowercase().as_str() {
            "internal" => Ok(VerificationPolicy::Internal),
            "key" => Ok(VerificationPolicy::Key),
            "calendar" => Ok(VerificationPolicy::Calendar),
            "publication" => Ok(VerificationPolicy::Publication),
            "default" => Ok(VerificationPolicy::Default),
            other => Err(Error::InvalidInput(format!(
                "unknown verification policy '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Ok,
    Fail,
    Indeterminate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub status: VerificationStatus,
    pub policy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl VerificationOutcome {
    pub fn ok(policy: &VerificationPolicy) -> Self {
        Self {
            status: VerificationStatus::Ok,
            policy: policy.name().to_string(),
            reason: None,
        }
    }

    pub fn fail(policy: &VerificationPolicy, reason: impl Into<String>) -> Self {
        Self {
            status: VerificationStatus::Fail,
            policy: policy.name().to_string(),
            reason: Some(reason.into()),
        }
    }

    pub fn indeterminate(policy: &VerificationPolicy, reason: impl Into<String>) -> Self {
        Self {
            status: VerificationStatus::Indeterminate,
            policy: policy.name().to_string(),
            reason: Some(reason.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == VerificationStatus::Ok
    }
}

impl fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self.status, self.policy)?;
        if let Some(reason) = &self.reason {
            write!(f, ": {}", reason)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parse() {
        assert_eq!("internal".parse::<VerificationPolicy>().unwrap(), VerificationPolicy::Internal);
        assert_eq!("KEY".parse::<VerificationPolicy>().unwrap(), VerificationPolicy::Key);
        assert_eq!(
            "Publication".parse::<VerificationPolicy>().unwrap(),
            VerificationPolicy::Publication
        );
        assert_eq!("calendar".parse::<VerificationPolicy>().unwrap(), VerificationPolicy::Calendar);
        assert!("extended".parse::<VerificationPolicy>().is_err());
        assert_eq!(VerificationPolicy::default(), VerificationPolicy::Default);
    }

    #[test]
    fn test_user_publication_parse() {
        assert_eq!(
            "user-publication:1700000000:ab12".parse::<VerificationPolicy>().unwrap(),
            VerificationPolicy::UserPublication("1700000000:ab12".to_string())
        );
        assert_eq!(
            "User-Publication:CODE".parse::<VerificationPolicy>().unwrap(),
            VerificationPolicy::UserPublication("CODE".to_string())
        );
        assert!(matches!(
            "user-publication:".parse::<VerificationPolicy>(),
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(
            VerificationPolicy::UserPublication("x".to_string()).name(),
            "UserProvidedPublicationBasedVerificationPolicy"
        );
    }

    #[test]
    fn test_outcome_display() {
        let outcome = VerificationOutcome::fail(&VerificationPolicy::Key, "wrong key");
        assert_eq!(outcome.to_string(), "Fail (KeyBasedVerificationPolicy): wrong key");
        assert!(VerificationOutcome::ok(&VerificationPolicy::Internal).is_ok());
    }

    #[test]
    fn test_outcome_json() {
        let json = serde_json::to_string(&VerificationOutcome::ok(&VerificationPolicy::Default)).unwrap();
        assert_eq!(json, r#"{"status":"OK","policy":"DefaultVerificationPolicy"}"#);
    }
}
