//! Test utilities for running notarization pipelines in memory.
//!
//! Enabled via the `test-util` feature flag.

use std::ops::RangeInclusive;
use std::sync::Arc;

use blockseal_core::{
    CreatePolicy, EnvelopeStore, LocalAuthority, LocalSignature, MemoryLedger, SelfReferenceFilter,
    DEFAULT_NAMESPACE,
};
use blockseal_ledger::{BlockSource, MemoryBlockSource};
use blockseal_types::{BlockIdentity, HashAlgorithm, LedgerBlock};

use crate::notarizer::Notarizer;

pub type TestNotarizer = Notarizer<LocalAuthority, Arc<MemoryLedger>>;

/// Chaincode id used by [`TestLedger`] signature blocks
pub const TEST_CHAINCODE_ID: &str = "blockseal-test";

/// Qualified function id used by [`TestLedger`] signature blocks
pub const TEST_FUNCTION_ID: &str = "org.blockseal.test:setSignature";

/// Deterministic authority for an organization
pub fn authority_for(org: &str) -> LocalAuthority {
    let digest = HashAlgorithm::Sha256.digest(org.as_bytes());
    let mut seed = [0u8; 32];
    seed.copy_from_slice(digest.digest());
    LocalAuthority::from_seed(&seed)
}

/// An ordinary block with deterministic content
pub fn test_block(number: u64) -> LedgerBlock {
    LedgerBlock {
        identity: BlockIdentity::new(
            number,
            HashAlgorithm::Sha256.digest(format!("block-{}", number.wrapping_sub(1)).as_bytes()),
            HashAlgorithm::Sha256.digest(format!("payload-{}", number).as_bytes()),
            vec![
                format!("signatures-{}", number).into_bytes(),
                format!("last-config-{}", number).into_bytes(),
            ],
        ),
        payloads: vec![format!("asset-transfer:move(a, b, {})", number).into_bytes()],
    }
}

/// A block that only records signatures
pub fn signature_block(number: u64) -> LedgerBlock {
    let mut block = test_block(number);
    block.payloads = vec![
        format!("{} {} {{\"block\":{}}}", TEST_CHAINCODE_ID, TEST_FUNCTION_ID, number.saturating_sub(1)).into_bytes(),
    ];
    block
}

/// In-memory ledger state and blocks, with notarizers bound to them.
///
/// ```ignore
/// let ledger = TestLedger::new().with_blocks(1..=10).with_signature_blocks(&[4]);
/// let orga = ledger.notarizer("orgA");
/// ```
pub struct TestLedger {
    state: Arc<MemoryLedger>,
    blocks: MemoryBlockSource,
    create_policy: CreatePolicy,
}

impl TestLedger {
    pub fn new() -> Self {
        Self {
            state: Arc::new(MemoryLedger::new()),
            blocks: MemoryBlockSource::new(),
            create_policy: CreatePolicy::default(),
        }
    }

    pub fn with_blocks(self, numbers: RangeInclusive<u64>) -> Self {
        for number in numbers {
            self.blocks
                .insert(test_block(number))
                .expect("fresh block source is not poisoned");
        }
        self
    }

    pub fn with_signature_blocks(self, numbers: &[u64]) -> Self {
        for number in numbers {
            self.blocks
                .insert(signature_block(*number))
                .expect("fresh block source is not poisoned");
        }
        self
    }

    pub fn with_create_policy(mut self, policy: CreatePolicy) -> Self {
        self.create_policy = policy;
        self
    }

    pub fn filter() -> SelfReferenceFilter {
        SelfReferenceFilter::new(TEST_CHAINCODE_ID, TEST_FUNCTION_ID)
    }

    pub fn state(&self) -> &Arc<MemoryLedger> {
        &self.state
    }

    pub fn blocks(&self) -> &MemoryBlockSource {
        &self.blocks
    }

    /// Fetch a stored block, panicking when it was never added
    pub fn block(&self, number: u64) -> LedgerBlock {
        self.blocks
            .block(number)
            .unwrap_or_else(|e| panic!("test block {} missing: {}", number, e))
    }

    pub fn store(&self) -> EnvelopeStore<Arc<MemoryLedger>, LocalSignature> {
        EnvelopeStore::new(self.state.clone(), DEFAULT_NAMESPACE)
            .expect("default namespace is valid")
            .with_create_policy(self.create_policy)
    }

    pub fn notarizer(&self, org: &str) -> TestNotarizer {
        self.notarizer_with(org, HashAlgorithm::Sha256, authority_for(org))
    }

    pub fn notarizer_with(
        &self,
        org: &str,
        algorithm: HashAlgorithm,
        authority: LocalAuthority,
    ) -> TestNotarizer {
        Notarizer::new(org, algorithm, Self::filter(), authority, self.store())
            .expect("test org is not empty")
    }
}

impl Default for TestLedger {
    fn default() -> Self {
        Self::new()
    }
}
