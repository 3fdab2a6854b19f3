//! Envelope storage on a persistent sled ledger

use blockseal_core::{
    Aggregator, Canonicalizer, EnvelopeStore, LocalAuthority, LocalSignature, SignatureEnvelope,
    SummaryRecord, DEFAULT_NAMESPACE,
};
use blockseal_ledger::SledLedger;
use blockseal_types::{BlockIdentity, HashAlgorithm, Timestamp};
use std::sync::Arc;
use std::thread;

fn envelope(authority: &LocalAuthority, org: &str, number: u64) -> SignatureEnvelope<LocalSignature> {
    let identity = BlockIdentity::new(
        number,
        HashAlgorithm::Sha256.digest(format!("prev-{}", number).as_bytes()),
        HashAlgorithm::Sha256.digest(format!("data-{}", number).as_bytes()),
        vec![format!("meta-{}", number).into_bytes()],
    );
    let record = Canonicalizer::new().canonicalize(&identity).unwrap();
    let leaves = record.leaves().to_vec();
    let aggregated = Aggregator::default().aggregate(&leaves).unwrap();
    let signature = authority.sign_at(&aggregated.root, aggregated.level, Timestamp::from_seconds(1_700_000_000));
    SignatureEnvelope::from_signature(&signature, leaves, number, org).unwrap()
}

#[test]
fn test_envelopes_survive_reopen() {
    let dir = tempfile::tempdir().expect("tempdir failed");
    let authority = LocalAuthority::from_seed(&[11u8; 32]);
    let original = envelope(&authority, "orgA", 42);

    {
        let store = EnvelopeStore::<_, LocalSignature>::new(
            SledLedger::open(dir.path()).unwrap(),
            DEFAULT_NAMESPACE,
        )
        .unwrap();
        store.create(&original).unwrap();

        let extended = authority
            .extend_at(original.signature(), Timestamp::from_seconds(1_700_100_000))
            .unwrap();
        let candidate = SignatureEnvelope::from_signature(&extended, Vec::new(), 42, "orgA").unwrap();
        store.extend("orgA", 42, candidate).unwrap();
    }

    let store = EnvelopeStore::<_, LocalSignature>::new(
        SledLedger::open(dir.path()).unwrap(),
        DEFAULT_NAMESPACE,
    )
    .unwrap();
    let loaded = store.get("orgA", 42).unwrap();
    assert!(loaded.is_extended());
    assert_eq!(loaded.record_digests(), original.record_digests());

    let history = store.history("orgA", 42).unwrap();
    assert_eq!(history.len(), 2);
    match &history[1].record {
        SummaryRecord::Signature(summary) => {
            assert_eq!(history[1].index, 0);
            assert!(!summary.extended);
        }
        other => panic!("unexpected history entry {:?}", other),
    }
}

#[test]
fn test_concurrent_identities_write_disjoint_keys() {
    let ledger = Arc::new(SledLedger::temporary().unwrap());
    let authority = Arc::new(LocalAuthority::from_seed(&[12u8; 32]));

    let handles: Vec<_> = ["org1", "org2", "org3", "org4"]
        .into_iter()
        .map(|org| {
            let ledger = Arc::clone(&ledger);
            let authority = Arc::clone(&authority);
            thread::spawn(move || {
                let store = EnvelopeStore::<_, LocalSignature>::new(ledger, DEFAULT_NAMESPACE).unwrap();
                for number in 0..25 {
                    store.create(&envelope(&authority, org, number)).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("writer thread panicked");
    }

    let keys = ledger.keys_with_prefix("blocksig.").unwrap();
    assert_eq!(keys.len(), 100);

    let store = EnvelopeStore::<_, LocalSignature>::new(ledger, DEFAULT_NAMESPACE).unwrap();
    for org in ["org1", "org2", "org3", "org4"] {
        let summary = store.summary(org, 0, 24).unwrap();
        assert!(summary.iter().all(|s| !s.record.is_error()), "{} has gaps", org);
    }
}
