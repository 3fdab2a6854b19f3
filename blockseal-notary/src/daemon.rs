//! Long-running signing of committed blocks
//!
//! Block events are read as JSON lines and fanned out to one pipeline task
//! per identity. Each pipeline signs every block that is not
//! self-referential and keeps going when a block fails.

use crate::notarizer::Notarizer;
use blockseal_core::{LedgerState, TimestampAuthority};
use blockseal_ledger::parse_event_line;
use blockseal_types::LedgerBlock;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Capacity of each pipeline's block channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub org: String,
    pub signed: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DaemonReport {
    pub blocks_read: usize,
    pub malformed: usize,
    pub pipelines: Vec<PipelineReport>,
}

/// Signing loop for one identity
pub struct Pipeline<A: TimestampAuthority, L> {
    notarizer: Arc<Notarizer<A, L>>,
    block_rx: mpsc::Receiver<LedgerBlock>,
}

impl<A, L> Pipeline<A, L>
where
    A: TimestampAuthority + 'static,
    L: LedgerState + 'static,
{
    pub fn new(notarizer: Arc<Notarizer<A, L>>, block_rx: mpsc::Receiver<LedgerBlock>) -> Self {
        Self { notarizer, block_rx }
    }

    /// Run until the channel is closed
    pub async fn run(mut self) -> PipelineReport {
        let org = self.notarizer.org().to_string();
        let mut report = PipelineReport {
            org: org.clone(),
            ..PipelineReport::default()
        };
        info!(org = %org, "pipeline started");

        while let Some(block) = self.block_rx.recv().await {
            if self.notarizer.is_self_referential(&block) {
                debug!(org = %org, block = block.number(), "skipping self-referential block");
                report.skipped += 1;
                continue;
            }

            match self.notarizer.sign_block(&block) {
                Ok(_) => report.signed += 1,
                Err(e) => {
                    error!(org = %org, block = block.number(), error = %e, "failed to sign block");
                    report.failed += 1;
                }
            }
        }

        info!(
            org = %org,
            signed = report.signed,
            skipped = report.skipped,
            failed = report.failed,
            "pipeline stopped"
        );
        report
    }
}

/// Feed block events from `input` to every notarizer until end of input or
/// until `shutdown` resolves.
pub async fn run_daemon<A, L, R, F>(
    notarizers: Vec<Arc<Notarizer<A, L>>>,
    input: R,
    shutdown: F,
) -> DaemonReport
where
    A: TimestampAuthority + 'static,
    L: LedgerState + 'static,
    R: AsyncBufRead + Unpin,
    F: Future<Output = ()>,
{
    let mut senders = Vec::with_capacity(notarizers.len());
    let mut handles = Vec::with_capacity(notarizers.len());
    for notarizer in notarizers {
        let (block_tx, block_rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
        senders.push(block_tx);
        handles.push(tokio::spawn(Pipeline::new(notarizer, block_rx).run()));
    }
    info!(pipelines = handles.len(), "daemon started");

    let mut report = DaemonReport::default();
    let mut lines = input.lines();
    tokio::pin!(shutdown);

    'events: loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = &mut shutdown => {
                info!("shutdown requested");
                break;
            }
        };

        let block = match line {
            Ok(Some(line)) => match parse_event_line(&line) {
                Ok(Some(block)) => block,
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, "ignoring malformed block event");
                    report.malformed += 1;
                    continue;
                }
            },
            Ok(None) => {
                info!("end of block events");
                break;
            }
            Err(e) => {
                error!(error = %e, "failed to read block events");
                break;
            }
        };
        report.blocks_read += 1;

        // A full pipeline channel must not hold off shutdown
        for block_tx in &senders {
            tokio::select! {
                sent = block_tx.send(block.clone()) => {
                    if sent.is_err() {
                        warn!(block = block.number(), "pipeline is gone, dropping block");
                    }
                }
                _ = &mut shutdown => {
                    info!(block = block.number(), "shutdown requested while pipelines are busy");
                    break 'events;
                }
            }
        }
    }

    // Closing the channels lets each pipeline drain and stop
    drop(senders);
    for handle in handles {
        match handle.await {
            Ok(pipeline) => report.pipelines.push(pipeline),
            Err(e) => error!(error = %e, "pipeline task failed"),
        }
    }

    info!(blocks = report.blocks_read, "daemon stopped");
    report
}
