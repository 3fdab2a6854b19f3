//! Blockseal notary
//!
//! Drives the notarization core for a set of configured organizations:
//! one-off batches over block ranges, and a daemon that signs blocks as
//! they are committed.

pub mod batch;
pub mod config;
pub mod daemon;
pub mod notarizer;

#[cfg(feature = "test-util")]
pub mod testutil;

pub use batch::{run_batch, BatchReport};
pub use config::{BlocksealConfig, ConfigError, IdentityConfig};
pub use daemon::{run_daemon, DaemonReport, Pipeline, PipelineReport};
pub use notarizer::{DigestCheck, Notarizer, Task, TaskOutcome, VerifyReport};

use blockseal_core::{EnvelopeStore, LedgerState, LocalAuthority};
use std::sync::Arc;

/// Notarizers for every enabled identity, sharing one ledger
pub fn build_notarizers<L: LedgerState>(
    config: &BlocksealConfig,
    ledger: Arc<L>,
) -> Result<Vec<Notarizer<LocalAuthority, Arc<L>>>, ConfigError> {
    let filter = config.filter.build();
    config
        .enabled_identities()
        .map(|identity| {
            let store = EnvelopeStore::new(ledger.clone(), config.ledger.namespace.clone())?
                .with_create_policy(config.ledger.create_policy);
            let notarizer = Notarizer::new(
                identity.org.clone(),
                identity.algorithm,
                filter.clone(),
                identity.load_authority()?,
                store,
            )?;
            Ok(notarizer)
        })
        .collect()
}
