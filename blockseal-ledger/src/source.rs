//! Where ledger blocks come from
//!
//! Blocks arrive in two shapes: exported one per file (`<number>.json` in a
//! directory) for the batch tool, and as a JSON-lines stream of commit
//! events for the daemon.

use blockseal_types::{Error, LedgerBlock, Result};
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Random access to blocks by number
pub trait BlockSource: Send + Sync {
    fn block(&self, number: u64) -> Result<LedgerBlock>;
}

/// Directory of JSON block exports
#[derive(Debug, Clone)]
pub struct FileBlockSource {
    dir: PathBuf,
}

impl FileBlockSource {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(Error::Ledger(format!(
                "Block directory {} does not exist",
                dir.display()
            )));
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, number: u64) -> PathBuf {
        self.dir.join(format!("{}.json", number))
    }

    /// Export a block into the directory
    pub fn write(&self, block: &LedgerBlock) -> Result<()> {
        let path = self.path_for(block.number());
        let json = serde_json::to_vec_pretty(block)?;
        fs::write(&path, json)
            .map_err(|e| Error::Ledger(format!("Failed to write {}: {}", path.display(), e)))
    }
}

impl BlockSource for FileBlockSource {
    fn block(&self, number: u64) -> Result<LedgerBlock> {
        let path = self.path_for(number);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::InvalidInput(format!(
                    "block {} has no export at {}",
                    number,
                    path.display()
                )))
            }
            Err(e) => {
                return Err(Error::Ledger(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let block: LedgerBlock = serde_json::from_slice(&bytes)?;
        if block.number() != number {
            return Err(Error::Ledger(format!(
                "{} holds block {}",
                path.display(),
                block.number()
            )));
        }
        Ok(block)
    }
}

/// Blocks held in memory
#[derive(Debug, Default)]
pub struct MemoryBlockSource {
    blocks: RwLock<HashMap<u64, LedgerBlock>>,
}

impl MemoryBlockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, block: LedgerBlock) -> Result<()> {
        let mut blocks = self
            .blocks
            .write()
            .map_err(|_| Error::Ledger("lock poisoned".to_string()))?;
        blocks.insert(block.number(), block);
        Ok(())
    }
}

impl BlockSource for MemoryBlockSource {
    fn block(&self, number: u64) -> Result<LedgerBlock> {
        let blocks = self
            .blocks
            .read()
            .map_err(|_| Error::Ledger("lock poisoned".to_string()))?;
        blocks
            .get(&number)
            .cloned()
            .ok_or_else(|| Error::InvalidInput(format!("block {} is not in the source", number)))
    }
}

/// Parse one line of a block event stream. Blank lines and `#` comments
/// yield `None`.
pub fn parse_event_line(line: &str) -> Result<Option<LedgerBlock>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(line)?))
}

/// Iterator over the blocks of a JSON-lines event stream
pub struct BlockEventReader<R> {
    reader: R,
    line: String,
}

impl<R: BufRead> BlockEventReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
        }
    }
}

impl<R: BufRead> Iterator for BlockEventReader<R> {
    type Item = Result<LedgerBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => return None,
                Ok(_) => match parse_event_line(&self.line) {
                    Ok(None) => continue,
                    Ok(Some(block)) => return Some(Ok(block)),
                    Err(e) => return Some(Err(e)),
                },
                Err(e) => {
                    return Some(Err(Error::Ledger(format!(
                        "Failed to read block event: {}",
                        e
                    ))))
                }
            }
        }
    }
}
