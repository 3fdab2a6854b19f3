//! Detection of blocks that only carry signature-storage transactions

/// Chaincode the signature envelopes are written through
pub const DEFAULT_CHAINCODE_ID: &str = "blockseal";

/// `<contract>:<function>` of the signature-storage entry point
pub const DEFAULT_QUALIFIED_FUNCTION_ID: &str = "org.blockseal.contract:setSignature";

/// Recognizes blocks produced by writing envelopes back to the ledger.
///
/// Signing those would make every signature write spawn another block to
/// sign, so the batch and daemon drivers skip them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfReferenceFilter {
    chaincode_id: String,
    qualified_function_id: String,
}

impl SelfReferenceFilter {
    pub fn new(chaincode_id: impl Into<String>, qualified_function_id: impl Into<String>) -> Self {
        Self {
            chaincode_id: chaincode_id.into(),
            qualified_function_id: qualified_function_id.into(),
        }
    }

    pub fn for_contract(chaincode_id: &str, contract: &str, function: &str) -> Self {
        Self::new(chaincode_id, format!("{}:{}", contract, function))
    }

    pub fn chaincode_id(&self) -> &str {
        &self.chaincode_id
    }

    pub fn qualified_function_id(&self) -> &str {
        &self.qualified_function_id
    }

    /// True when every payload mentions both identifiers. An empty block
    /// counts as self-referential.
    pub fn is_self_referential_only<P: AsRef<[u8]>>(&self, payloads: &[P]) -> bool {
        payloads.iter().all(|payload| {
            let text = String::from_utf8_lossy(payload.as_ref());
            text.contains(&self.chaincode_id) && text.contains(&self.qualified_function_id)
        })
    }
}

impl Default for SelfReferenceFilter {
    fn default() -> Self {
        Self::new(DEFAULT_CHAINCODE_ID, DEFAULT_QUALIFIED_FUNCTION_ID)
    }
}
