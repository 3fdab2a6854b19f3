//! Proptest-based fuzzing for input parsers in blockseal-types.
//!
//! These tests exercise deserialization paths with arbitrary/malformed
//! inputs to verify they never panic, only return errors.

use blockseal_types::{EnvelopeDocument, Error, HashAlgorithm, Imprint, LedgerBlock};
use proptest::prelude::*;

proptest! {
    // === JSON deserialization fuzzing (should never panic) ===

    #[test]
    fn fuzz_imprint_from_json(s in "\\PC{0,200}") {
        let json = format!("\"{}\"", s);
        let _ = serde_json::from_str::<Imprint>(&json);
    }

    #[test]
    fn fuzz_ledger_block_from_json(json in "\\PC{0,1000}") {
        let _ = serde_json::from_str::<LedgerBlock>(&json);
    }

    #[test]
    fn fuzz_envelope_document_from_bytes(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = EnvelopeDocument::from_slice(&bytes);
    }

    // === Base64 imprint parsing ===

    #[test]
    fn fuzz_imprint_from_base64(s in "[A-Za-z0-9+/=]{0,120}") {
        let _ = Imprint::from_base64(&s);
    }

    #[test]
    fn fuzz_algorithm_from_str(s in "\\PC{0,16}") {
        let _ = s.parse::<HashAlgorithm>();
    }

    // === Version gating holds for any payload around an unsupported version ===

    #[test]
    fn fuzz_unsupported_version_always_rejected(
        ver in 2u64..10_000,
        block in any::<i64>(),
        org in "\\PC{0,20}",
        ksig in "\\PC{0,40}",
    ) {
        let doc = serde_json::json!({
            "ver": ver,
            "block": block,
            "org": org,
            "ksig": ksig,
        });
        let bytes = serde_json::to_vec(&doc).unwrap();
        let result = EnvelopeDocument::from_slice(&bytes);
        let is_version_error = matches!(result, Err(Error::Version { .. }));
        prop_assert!(is_version_error);
    }
}
