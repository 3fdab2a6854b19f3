//! Blockseal configuration

use blockseal_core::filter::{DEFAULT_CHAINCODE_ID, DEFAULT_QUALIFIED_FUNCTION_ID};
use blockseal_core::{CreatePolicy, LocalAuthority, SelfReferenceFilter, DEFAULT_NAMESPACE};
use blockseal_types::HashAlgorithm;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable holding a hex signing key seed
pub const SIGNING_KEY_ENV: &str = "BLOCKSEAL_SIGNING_KEY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Core(#[from] blockseal_types::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlocksealConfig {
    /// Ledger state and block export locations
    pub ledger: LedgerConfig,

    /// Recognition of signature-storage transactions
    #[serde(default)]
    pub filter: FilterConfig,

    /// Organizations notarizing blocks, one pipeline each
    #[serde(default, rename = "identity")]
    pub identities: Vec<IdentityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// sled database holding envelope state
    pub state_path: PathBuf,

    /// Directory of `<number>.json` block exports
    pub blocks_dir: PathBuf,

    /// Key prefix for stored envelopes
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default)]
    pub create_policy: CreatePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    pub chaincode_id: String,

    /// `<contract>:<function>` of the signature-storage entry point
    pub qualified_function_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub org: String,

    #[serde(default)]
    pub disabled: bool,

    /// Hash algorithm for the aggregation root
    #[serde(default = "default_algorithm")]
    pub algorithm: HashAlgorithm,

    /// File holding the hex signing key seed
    #[serde(default)]
    pub signing_key_file: Option<PathBuf>,

    /// Signing key seed (should be provided via environment variable)
    #[serde(skip)]
    pub signing_key: Option<String>,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_algorithm() -> HashAlgorithm {
    HashAlgorithm::Sha256
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            chaincode_id: DEFAULT_CHAINCODE_ID.to_string(),
            qualified_function_id: DEFAULT_QUALIFIED_FUNCTION_ID.to_string(),
        }
    }
}

impl FilterConfig {
    pub fn build(&self) -> SelfReferenceFilter {
        SelfReferenceFilter::new(&self.chaincode_id, &self.qualified_function_id)
    }
}

impl Default for BlocksealConfig {
    fn default() -> Self {
        Self {
            ledger: LedgerConfig {
                state_path: PathBuf::from(".blockseal/state"),
                blocks_dir: PathBuf::from(".blockseal/blocks"),
                namespace: default_namespace(),
                create_policy: CreatePolicy::default(),
            },
            filter: FilterConfig::default(),
            identities: vec![IdentityConfig {
                org: "org1".to_string(),
                disabled: false,
                algorithm: default_algorithm(),
                signing_key_file: Some(PathBuf::from(".blockseal/org1.key")),
                signing_key: None,
            }],
        }
    }
}

impl IdentityConfig {
    /// Build the local authority from the configured key material
    pub fn load_authority(&self) -> Result<LocalAuthority, ConfigError> {
        if let Some(seed) = &self.signing_key {
            return Ok(LocalAuthority::from_hex(seed)?);
        }
        match &self.signing_key_file {
            Some(path) => {
                let seed = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.clone(),
                    source,
                })?;
                Ok(LocalAuthority::from_hex(&seed)?)
            }
            None => Err(ConfigError::Invalid(format!(
                "identity {} has no signing key (set signing_key_file or {})",
                self.org, SIGNING_KEY_ENV
            ))),
        }
    }
}

impl BlocksealConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&contents)?;

        // Load the signing key from the environment for identities without a key file
        Ok(config.with_signing_key(std::env::var(SIGNING_KEY_ENV).ok()))
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: BlocksealConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, contents).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Use `seed` for every identity that has no key file
    pub fn with_signing_key(mut self, seed: Option<String>) -> Self {
        if let Some(seed) = seed {
            for identity in self.identities.iter_mut().filter(|i| i.signing_key_file.is_none()) {
                identity.signing_key = Some(seed.clone());
            }
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger.namespace.is_empty() {
            return Err(ConfigError::Invalid("ledger.namespace must not be empty".to_string()));
        }

        let mut seen = HashSet::new();
        for identity in &self.identities {
            if identity.org.is_empty() {
                return Err(ConfigError::Invalid("identity org must not be empty".to_string()));
            }
            if !seen.insert(identity.org.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "identity {} is configured more than once",
                    identity.org
                )));
            }
        }
        Ok(())
    }

    pub fn enabled_identities(&self) -> impl Iterator<Item = &IdentityConfig> {
        self.identities.iter().filter(|i| !i.disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[ledger]
state_path = "/var/lib/blockseal/state"
blocks_dir = "/var/lib/blockseal/blocks"
create_policy = "reject-existing"

[filter]
chaincode_id = "sigcc"
qualified_function_id = "org.example.sig:setSignature"

[[identity]]
org = "orgA"
algorithm = "SHA-512"
signing_key_file = "/etc/blockseal/orgA.key"

[[identity]]
org = "orgB"
disabled = true
"#;

    #[test]
    fn test_parse_sample() {
        let config = BlocksealConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.ledger.namespace, DEFAULT_NAMESPACE);
        assert_eq!(config.ledger.create_policy, CreatePolicy::RejectExisting);
        assert_eq!(config.filter.chaincode_id, "sigcc");
        assert_eq!(config.identities.len(), 2);
        assert_eq!(config.identities[0].algorithm, HashAlgorithm::Sha512);
        assert_eq!(config.identities[1].algorithm, HashAlgorithm::Sha256);

        let enabled: Vec<&str> = config.enabled_identities().map(|i| i.org.as_str()).collect();
        assert_eq!(enabled, vec!["orgA"]);
    }

    #[test]
    fn test_default_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf/blockseal.toml");
        BlocksealConfig::default().to_file(&path).unwrap();

        let loaded = BlocksealConfig::from_toml(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.identities.len(), 1);
        assert_eq!(loaded.identities[0].org, "org1");
        assert_eq!(loaded.ledger.create_policy, CreatePolicy::Overwrite);
    }

    #[test]
    fn test_validation() {
        let empty_org = SAMPLE.replace("org = \"orgB\"", "org = \"\"");
        assert!(matches!(BlocksealConfig::from_toml(&empty_org), Err(ConfigError::Invalid(_))));

        let duplicate = SAMPLE.replace("org = \"orgB\"", "org = \"orgA\"");
        assert!(matches!(BlocksealConfig::from_toml(&duplicate), Err(ConfigError::Invalid(_))));

        let no_namespace = SAMPLE.replace("[filter]", "namespace = \"\"\n\n[filter]");
        assert!(matches!(BlocksealConfig::from_toml(&no_namespace), Err(ConfigError::Invalid(_))));

        assert!(matches!(
            BlocksealConfig::from_toml("[ledger]\nstate_path = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_signing_key_sources() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("orgA.key");
        let authority = LocalAuthority::generate();
        std::fs::write(&key_path, format!("{}\n", authority.seed_hex())).unwrap();

        let mut config = BlocksealConfig::from_toml(SAMPLE).unwrap();
        config.identities[0].signing_key_file = Some(key_path);
        let config = config.with_signing_key(Some(hex::encode([4u8; 32])));

        let loaded = config.identities[0].load_authority().unwrap();
        assert_eq!(loaded.public_key_hex(), authority.public_key_hex());

        let from_env = config.identities[1].load_authority().unwrap();
        assert_eq!(
            from_env.public_key_hex(),
            LocalAuthority::from_seed(&[4u8; 32]).public_key_hex()
        );
    }

    #[test]
    fn test_missing_signing_key() {
        let config = BlocksealConfig::from_toml(SAMPLE).unwrap();
        assert!(matches!(
            config.identities[1].load_authority(),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            config.identities[0].load_authority(),
            Err(ConfigError::Io { .. })
        ));
    }
}
