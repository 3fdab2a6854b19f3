//! Batch processing of a block range

use crate::notarizer::{Notarizer, Task, TaskOutcome};
use blockseal_core::{LedgerState, TimestampAuthority};
use blockseal_ledger::BlockSource;
use blockseal_types::{Error, Result};
use serde::Serialize;
use std::fmt;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub org: String,
    pub task: String,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {} processed, {} skipped, {} failed",
            self.org, self.task, self.processed, self.skipped, self.failed
        )
    }
}

/// Run `task` over blocks `first..=last`.
///
/// Self-referential blocks are skipped. Blocks without an envelope are
/// skipped for verify and extend. Any other failure is logged and counted,
/// and the loop moves on to the next block.
pub fn run_batch<A, L, B>(
    notarizer: &Notarizer<A, L>,
    source: &B,
    task: Task,
    first: u64,
    last: u64,
) -> Result<BatchReport>
where
    A: TimestampAuthority,
    L: LedgerState,
    B: BlockSource + ?Sized,
{
    if first > last {
        return Err(Error::InvalidInput(format!(
            "first block {} is after last block {}",
            first, last
        )));
    }

    let org = notarizer.org().to_string();
    let mut report = BatchReport {
        org: org.clone(),
        task: task.to_string(),
        ..BatchReport::default()
    };
    info!(org = %org, task = %task, first, last, "batch started");

    for number in first..=last {
        let block = match source.block(number) {
            Ok(block) => block,
            Err(e) => {
                error!(org = %org, block = number, error = %e, "failed to load block");
                report.failed += 1;
                continue;
            }
        };

        if notarizer.is_self_referential(&block) {
            debug!(org = %org, block = number, "skipping self-referential block");
            report.skipped += 1;
            continue;
        }

        match notarizer.run(task.clone(), &block) {
            Ok(TaskOutcome::Verified(verify)) if !verify.is_ok() => report.failed += 1,
            Ok(_) => report.processed += 1,
            Err(e) if e.is_not_found() && task != Task::Sign => {
                warn!(org = %org, block = number, "no signature stored, skipping");
                report.skipped += 1;
            }
            Err(e) => {
                error!(org = %org, block = number, task = %task, error = %e, "task failed");
                report.failed += 1;
            }
        }
    }

    info!("{}", report);
    Ok(report)
}
