//! End-to-end notarization over in-memory ledgers

use blockseal_core::{
    CreatePolicy, LedgerState, LocalAuthority, LocalSignature, OpaqueSignature, SignatureEnvelope,
    SummaryRecord, TimestampAuthority, VerificationPolicy, VerificationStatus,
};
use blockseal_ledger::{BlockSource, FileBlockSource};
use blockseal_notary::testutil::{authority_for, test_block, TestLedger};
use blockseal_notary::{build_notarizers, run_batch, BlocksealConfig, Task, TaskOutcome};
use blockseal_types::{Error, HashAlgorithm, Timestamp};
use std::sync::Arc;

#[test]
fn test_sign_block_42() {
    let ledger = TestLedger::new().with_blocks(40..=44);
    let orga = ledger.notarizer("orgA");

    let envelope = orga.sign_block(&ledger.block(42)).unwrap();
    assert_eq!(envelope.key(), "orgA.42");
    assert_eq!(envelope.block(), 42);
    assert_eq!(envelope.record_digests().len(), 2);
    assert_eq!(envelope.signature().level(), 1);
    assert!(!envelope.is_extended());

    let stored = ledger.state().get_state("blocksig.orgA.42").unwrap().unwrap();
    assert_eq!(SignatureEnvelope::<LocalSignature>::decode(&stored).unwrap(), envelope);

    let report = orga.verify_block(&ledger.block(42), VerificationPolicy::Key).unwrap();
    assert!(report.is_ok(), "{:?}", report);
    assert_eq!(report.outcome.status, VerificationStatus::Ok);
}

#[test]
fn test_extend_replaces_signature_and_keeps_history() {
    let ledger = TestLedger::new().with_blocks(1..=3);
    let orga = ledger.notarizer("orgA");
    let block = ledger.block(2);

    let signed = orga.sign_block(&block).unwrap();
    let extended = orga.extend_block(&block).unwrap();

    assert!(extended.is_extended());
    assert_eq!(extended.record_digests(), signed.record_digests());
    assert_eq!(
        extended.signature().aggregation_time(),
        signed.signature().aggregation_time()
    );

    let history = orga.store().history("orgA", 2).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].index, 1);
    assert_eq!(history[1].index, 0);
    match &history[0].record {
        SummaryRecord::Signature(summary) => assert!(summary.extended),
        other => panic!("unexpected history record {:?}", other),
    }

    let report = orga.verify_block(&block, VerificationPolicy::Publication).unwrap();
    assert!(report.is_ok(), "{:?}", report);
}

#[test]
fn test_extend_with_other_aggregation_time_is_rejected() {
    let ledger = TestLedger::new().with_blocks(1..=1);
    let orga = ledger.notarizer("orgA");
    let signed = orga.sign_block(&ledger.block(1)).unwrap();
    let before = ledger.state().get_state("blocksig.orgA.1").unwrap();

    let authority = authority_for("orgA");
    let input_hash = signed.signature().input_hash().clone();
    let resigned = authority.sign_at(&input_hash, 1, Timestamp::from_seconds(1_000));
    let resigned = authority.extend_at(&resigned, Timestamp::from_seconds(2_000)).unwrap();
    let candidate =
        SignatureEnvelope::from_signature(&resigned, signed.record_digests().to_vec(), 1, "orgA")
            .unwrap();

    let result = orga.store().extend("orgA", 1, candidate);
    assert!(matches!(result, Err(Error::Integrity(_))), "{:?}", result);
    assert_eq!(ledger.state().get_state("blocksig.orgA.1").unwrap(), before);
    assert_eq!(orga.store().history("orgA", 1).unwrap().len(), 1);
}

#[test]
fn test_verify_rejects_foreign_key() {
    let ledger = TestLedger::new().with_blocks(5..=5);
    let orga = ledger.notarizer("orgA");
    orga.sign_block(&ledger.block(5)).unwrap();

    let impostor = ledger.notarizer_with("orgA", HashAlgorithm::Sha256, authority_for("orgB"));
    let report = impostor.verify_block(&ledger.block(5), VerificationPolicy::Key).unwrap();
    assert!(!report.is_ok());
    assert_eq!(report.outcome.status, VerificationStatus::Fail);
    assert!(report.digests.iter().all(|check| check.matches()));
}

#[test]
fn test_sha512_roots_verify_under_signing_algorithm() {
    let ledger = TestLedger::new().with_blocks(1..=1);
    let signer = ledger.notarizer_with("orgA", HashAlgorithm::Sha512, authority_for("orgA"));
    let envelope = signer.sign_block(&ledger.block(1)).unwrap();
    assert_eq!(envelope.signature().input_hash().algorithm(), HashAlgorithm::Sha512);

    // A default notarizer recomputes with the algorithm the signature carries
    let verifier = ledger.notarizer("orgA");
    let report = verifier.verify_block(&ledger.block(1), VerificationPolicy::Internal).unwrap();
    assert!(report.is_ok(), "{:?}", report);
}

#[test]
fn test_batch_over_range_with_signature_blocks() {
    let ledger = TestLedger::new().with_blocks(1..=6).with_signature_blocks(&[4]);
    let orga = ledger.notarizer("orgA");
    let orgb = ledger.notarizer("orgB");

    let report = run_batch(&orga, ledger.blocks(), Task::Sign, 1, 6).unwrap();
    assert_eq!((report.processed, report.skipped, report.failed), (5, 1, 0));
    let report = run_batch(&orgb, ledger.blocks(), Task::Sign, 1, 3).unwrap();
    assert_eq!((report.processed, report.skipped, report.failed), (3, 0, 0));

    let summary = orga.store().summary("orgA", 3, 5).unwrap();
    assert_eq!(summary.len(), 3);
    assert!(!summary[0].record.is_error());
    assert!(summary[1].record.is_error());
    assert!(!summary[2].record.is_error());

    assert!(orgb.store().try_get("orgB", 2).unwrap().is_some());
    assert!(orgb.store().try_get("orgB", 5).unwrap().is_none());

    let report = run_batch(&orga, ledger.blocks(), Task::Verify(VerificationPolicy::Default), 1, 6).unwrap();
    assert_eq!((report.processed, report.skipped, report.failed), (5, 1, 0));
}

#[test]
fn test_reject_existing_policy() {
    let ledger = TestLedger::new()
        .with_blocks(1..=2)
        .with_create_policy(CreatePolicy::RejectExisting);
    let orga = ledger.notarizer("orgA");

    orga.sign_block(&ledger.block(1)).unwrap();
    let again = orga.sign_block(&ledger.block(1));
    assert!(matches!(again, Err(Error::Integrity(_))), "{:?}", again);

    let report = run_batch(&orga, ledger.blocks(), Task::Sign, 1, 2).unwrap();
    assert_eq!((report.processed, report.failed), (1, 1));
    assert_eq!(orga.store().history("orgA", 1).unwrap().len(), 1);
}

#[test]
fn test_run_dispatches_tasks() {
    let ledger = TestLedger::new().with_blocks(9..=9);
    let orga = ledger.notarizer("orgA");
    let block = ledger.block(9);

    assert!(matches!(orga.run(Task::Sign, &block).unwrap(), TaskOutcome::Signed(_)));
    match orga.run(Task::Extend, &block).unwrap() {
        TaskOutcome::Extended(summary) => assert!(summary.extended),
        other => panic!("unexpected outcome {:?}", other),
    }
    let outcome = orga.run(Task::Verify(VerificationPolicy::Default), &block).unwrap();
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["task"], "verified");
    assert_eq!(json["outcome"]["status"], "OK");
    assert_eq!(json["outcome"]["policy"], "DefaultVerificationPolicy");
}

#[test]
fn test_notarizers_from_config_over_exported_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let blocks_dir = dir.path().join("blocks");
    std::fs::create_dir_all(&blocks_dir).unwrap();

    let config = BlocksealConfig::from_toml(&format!(
        r#"
[ledger]
state_path = "{state}"
blocks_dir = "{blocks}"

[[identity]]
org = "orgA"

[[identity]]
org = "orgB"
algorithm = "SHA-384"

[[identity]]
org = "orgC"
disabled = true
"#,
        state = dir.path().join("state").display(),
        blocks = blocks_dir.display(),
    ))
    .unwrap()
    .with_signing_key(Some(hex::encode([8u8; 32])));

    let source = FileBlockSource::open(&config.ledger.blocks_dir).unwrap();
    for number in 1..=3 {
        source.write(&test_block(number)).unwrap();
    }
    assert_eq!(source.block(2).unwrap(), test_block(2));

    let ledger = Arc::new(blockseal_core::MemoryLedger::new());
    let notarizers = build_notarizers(&config, ledger.clone()).unwrap();
    let orgs: Vec<&str> = notarizers.iter().map(|n| n.org()).collect();
    assert_eq!(orgs, ["orgA", "orgB"]);

    for notarizer in &notarizers {
        let report = run_batch(notarizer, &source, Task::Sign, 1, 3).unwrap();
        assert!(report.is_clean(), "{}", report);
    }

    let orgb = notarizers[1].store().get("orgB", 3).unwrap();
    assert_eq!(orgb.signature().input_hash().algorithm(), HashAlgorithm::Sha384);
    assert!(ledger.get_state("blocksig.orgA.1").unwrap().is_some());

    let authority = LocalAuthority::from_hex(&hex::encode([8u8; 32])).unwrap();
    let outcome = authority
        .verify(
            orgb.signature(),
            orgb.signature().input_hash(),
            orgb.signature().level(),
            VerificationPolicy::Key,
        )
        .unwrap();
    assert!(outcome.is_ok());
}

#[test]
fn test_calendar_and_user_publication_policies() {
    let ledger = TestLedger::new().with_blocks(3..=3);
    let orga = ledger.notarizer("orgA");
    let block = ledger.block(3);

    orga.sign_block(&block).unwrap();
    let calendar: VerificationPolicy = "calendar".parse().unwrap();
    assert!(orga.verify_block(&block, calendar.clone()).unwrap().is_ok());

    let extended = orga.extend_block(&block).unwrap();
    let code = extended.signature().publication_string().unwrap();
    assert!(orga.verify_block(&block, calendar).unwrap().is_ok());

    let policy: VerificationPolicy = format!("user-publication:{}", code).parse().unwrap();
    let report = orga.verify_block(&block, policy.clone()).unwrap();
    assert!(report.is_ok(), "{:?}", report);
    assert_eq!(report.outcome.policy, "UserProvidedPublicationBasedVerificationPolicy");

    let stale: VerificationPolicy = "user-publication:1:00".parse().unwrap();
    let report = orga.verify_block(&block, stale).unwrap();
    assert_eq!(report.outcome.status, VerificationStatus::Fail);

    let batch = run_batch(&orga, ledger.blocks(), Task::Verify(policy), 3, 3).unwrap();
    assert!(batch.is_clean(), "{}", batch);
}
