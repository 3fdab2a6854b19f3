//! Per-identity notarization pipeline

use blockseal_core::{
    Aggregator, Canonicalizer, EnvelopeStore, LedgerState, OpaqueSignature, SelfReferenceFilter,
    SignatureEnvelope, SignatureSummary, TimestampAuthority, VerificationOutcome, VerificationPolicy,
};
use blockseal_types::{AggregationResult, Error, HashAlgorithm, Imprint, LedgerBlock, Result};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

/// What to do with a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    Sign,
    Verify(VerificationPolicy),
    Extend,
}

impl Task {
    pub fn name(&self) -> &'static str {
        match self {
            Task::Sign => "sign",
            Task::Verify(_) => "verify",
            Task::Extend => "extend",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Comparison of one stored record digest against the recomputed one
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestCheck {
    pub name: &'static str,
    pub stored: Option<Imprint>,
    pub computed: Imprint,
}

impl DigestCheck {
    /// Absent stored digests are not a mismatch
    pub fn matches(&self) -> bool {
        self.stored.as_ref().map_or(true, |stored| *stored == self.computed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub org: String,
    pub block: u64,
    pub digests: Vec<DigestCheck>,
    pub outcome: VerificationOutcome,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.digests.iter().all(DigestCheck::matches) && self.outcome.is_ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "task", rename_all = "lowercase")]
pub enum TaskOutcome {
    Signed(SignatureSummary),
    Verified(VerifyReport),
    Extended(SignatureSummary),
}

/// Everything one organization needs to sign, verify and extend blocks
pub struct Notarizer<A: TimestampAuthority, L> {
    org: String,
    canonicalizer: Canonicalizer,
    aggregator: Aggregator,
    filter: SelfReferenceFilter,
    authority: A,
    store: EnvelopeStore<L, A::Signature>,
}

impl<A: TimestampAuthority, L: LedgerState> Notarizer<A, L> {
    pub fn new(
        org: impl Into<String>,
        algorithm: HashAlgorithm,
        filter: SelfReferenceFilter,
        authority: A,
        store: EnvelopeStore<L, A::Signature>,
    ) -> Result<Self> {
        let org = org.into();
        if org.is_empty() {
            return Err(Error::InvalidInput("org must not be empty".to_string()));
        }
        Ok(Self {
            org,
            canonicalizer: Canonicalizer::new(),
            aggregator: Aggregator::new(algorithm),
            filter,
            authority,
            store,
        })
    }

    pub fn org(&self) -> &str {
        &self.org
    }

    pub fn store(&self) -> &EnvelopeStore<L, A::Signature> {
        &self.store
    }

    pub fn authority(&self) -> &A {
        &self.authority
    }

    pub fn is_self_referential(&self, block: &LedgerBlock) -> bool {
        self.filter.is_self_referential_only(&block.payloads)
    }

    fn record_digests(&self, block: &LedgerBlock) -> Result<Vec<Imprint>> {
        Ok(self.canonicalizer.canonicalize(&block.identity)?.leaves().to_vec())
    }

    /// Canonicalize, aggregate, sign and store
    pub fn sign_block(&self, block: &LedgerBlock) -> Result<SignatureEnvelope<A::Signature>> {
        let digests = self.record_digests(block)?;
        let AggregationResult { root, level } = self.aggregator.aggregate(&digests)?;
        debug!(org = %self.org, block = block.number(), root = %root, level, "aggregated block");

        let signature = self.authority.sign(&root, level)?;
        let envelope = SignatureEnvelope::from_signature(&signature, digests, block.number(), &self.org)?;
        self.store.create(&envelope)?;

        info!(
            org = %self.org,
            block = block.number(),
            aggregation_time = %signature.aggregation_time(),
            "signed block"
        );
        Ok(envelope)
    }

    /// Check a stored envelope against the block it claims to cover
    pub fn verify_block(&self, block: &LedgerBlock, policy: VerificationPolicy) -> Result<VerifyReport> {
        let envelope = self.store.get(&self.org, block.number())?;
        let computed = self.record_digests(block)?;

        let digests: Vec<DigestCheck> = ["header", "metadata"]
            .into_iter()
            .zip(computed.iter())
            .enumerate()
            .map(|(i, (name, computed))| DigestCheck {
                name,
                stored: envelope.record_digests().get(i).cloned(),
                computed: computed.clone(),
            })
            .collect();

        // Recompute under the algorithm the envelope was signed with
        let algorithm = envelope.signature().input_hash().algorithm();
        let AggregationResult { root, level } = Aggregator::new(algorithm).aggregate(&computed)?;
        let outcome = self.authority.verify(envelope.signature(), &root, level, policy.clone())?;

        let report = VerifyReport {
            org: self.org.clone(),
            block: block.number(),
            digests,
            outcome,
        };
        if report.is_ok() {
            info!(org = %self.org, block = block.number(), policy = %policy, "verified block");
        } else {
            warn!(
                org = %self.org,
                block = block.number(),
                outcome = %report.outcome,
                "block verification failed"
            );
        }
        Ok(report)
    }

    /// Extend the stored signature and write it back
    pub fn extend_block(&self, block: &LedgerBlock) -> Result<SignatureEnvelope<A::Signature>> {
        let envelope = self.store.get(&self.org, block.number())?;
        let extended = self.authority.extend(envelope.signature())?;
        let candidate = SignatureEnvelope::from_signature(
            &extended,
            envelope.record_digests().to_vec(),
            block.number(),
            &self.org,
        )?;
        self.store.extend(&self.org, block.number(), candidate)
    }

    pub fn run(&self, task: Task, block: &LedgerBlock) -> Result<TaskOutcome> {
        match task {
            Task::Sign => self
                .sign_block(block)
                .map(|envelope| TaskOutcome::Signed(SignatureSummary::of(&envelope))),
            Task::Verify(policy) => self.verify_block(block, policy).map(TaskOutcome::Verified),
            Task::Extend => self
                .extend_block(block)
                .map(|envelope| TaskOutcome::Extended(SignatureSummary::of(&envelope))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockseal_core::{LocalAuthority, MemoryLedger, VerificationStatus, DEFAULT_NAMESPACE};
    use blockseal_types::BlockIdentity;
    use std::sync::Arc;

    fn block(number: u64) -> LedgerBlock {
        LedgerBlock {
            identity: BlockIdentity::new(
                number,
                HashAlgorithm::Sha256.digest(b"prev"),
                HashAlgorithm::Sha256.digest(b"data"),
                vec![b"m1".to_vec(), b"m2".to_vec()],
            ),
            payloads: vec![b"transfer".to_vec()],
        }
    }

    fn notarizer(ledger: Arc<MemoryLedger>, algorithm: HashAlgorithm) -> Notarizer<LocalAuthority, Arc<MemoryLedger>> {
        Notarizer::new(
            "orgA",
            algorithm,
            SelfReferenceFilter::default(),
            LocalAuthority::from_seed(&[1u8; 32]),
            EnvelopeStore::new(ledger, DEFAULT_NAMESPACE).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_sign_then_verify() {
        let n = notarizer(Arc::new(MemoryLedger::new()), HashAlgorithm::Sha256);
        let envelope = n.sign_block(&block(42)).unwrap();
        assert_eq!(envelope.key(), "orgA.42");

        let report = n.verify_block(&block(42), VerificationPolicy::Key).unwrap();
        assert!(report.is_ok(), "{:?}", report);
        assert!(report.digests.iter().all(DigestCheck::matches));
    }

    #[test]
    fn test_verify_detects_changed_metadata() {
        let n = notarizer(Arc::new(MemoryLedger::new()), HashAlgorithm::Sha256);
        n.sign_block(&block(7)).unwrap();

        let mut tampered = block(7);
        tampered.identity.metadata.push(b"late".to_vec());
        let report = n.verify_block(&tampered, VerificationPolicy::Internal).unwrap();

        assert!(!report.is_ok());
        assert!(report.digests[0].matches());
        assert!(!report.digests[1].matches());
        assert_eq!(report.outcome.status, VerificationStatus::Fail);
    }

    #[test]
    fn test_verify_uses_signing_algorithm() {
        let ledger = Arc::new(MemoryLedger::new());
        notarizer(ledger.clone(), HashAlgorithm::Sha512).sign_block(&block(3)).unwrap();

        let report = notarizer(ledger, HashAlgorithm::Sha256)
            .verify_block(&block(3), VerificationPolicy::Default)
            .unwrap();
        assert!(report.is_ok(), "{:?}", report);
    }

    #[test]
    fn test_extend_then_publication_verify() {
        let n = notarizer(Arc::new(MemoryLedger::new()), HashAlgorithm::Sha256);
        n.sign_block(&block(9)).unwrap();

        let before = n.verify_block(&block(9), VerificationPolicy::Publication).unwrap();
        assert_eq!(before.outcome.status, VerificationStatus::Indeterminate);

        let extended = n.extend_block(&block(9)).unwrap();
        assert!(extended.is_extended());
        assert_eq!(extended.record_digests().len(), 2);

        let after = n.verify_block(&block(9), VerificationPolicy::Publication).unwrap();
        assert!(after.is_ok(), "{:?}", after);
    }

    #[test]
    fn test_run_dispatch() {
        let n = notarizer(Arc::new(MemoryLedger::new()), HashAlgorithm::Sha256);
        assert!(n.run(Task::Verify(VerificationPolicy::Key), &block(1)).unwrap_err().is_not_found());
        assert!(n.run(Task::Extend, &block(1)).unwrap_err().is_not_found());

        assert!(matches!(n.run(Task::Sign, &block(1)).unwrap(), TaskOutcome::Signed(_)));
        assert!(matches!(
            n.run(Task::Verify(VerificationPolicy::Key), &block(1)).unwrap(),
            TaskOutcome::Verified(_)
        ));
        match n.run(Task::Extend, &block(1)).unwrap() {
            TaskOutcome::Extended(summary) => assert!(summary.extended),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_incomplete_block_is_rejected() {
        let n = notarizer(Arc::new(MemoryLedger::new()), HashAlgorithm::Sha256);
        let mut incomplete = block(2);
        incomplete.identity.payload_digest = None;
        assert!(matches!(n.sign_block(&incomplete), Err(Error::Canonicalization(_))));
        assert!(n.store().try_get("orgA", 2).unwrap().is_none());
    }

    #[test]
    fn test_empty_org_rejected() {
        let result = Notarizer::new(
            "",
            HashAlgorithm::Sha256,
            SelfReferenceFilter::default(),
            LocalAuthority::from_seed(&[1u8; 32]),
            EnvelopeStore::<_, blockseal_core::LocalSignature>::new(MemoryLedger::new(), DEFAULT_NAMESPACE).unwrap(),
        );
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
