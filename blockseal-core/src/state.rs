//! Ledger world-state access

use blockseal_types::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Key/value state with per-key write history
pub trait LedgerState: Send + Sync {
    fn put_state(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Latest value under `key`
    fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Every value ever written under `key`, oldest first
    fn get_history(&self, key: &str) -> Result<Vec<Vec<u8>>>;
}

impl<T: LedgerState + ?Sized> LedgerState for Arc<T> {
    fn put_state(&self, key: &str, value: &[u8]) -> Result<()> {
        (**self).put_state(key, value)
    }

    fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get_state(key)
    }

    fn get_history(&self, key: &str) -> Result<Vec<Vec<u8>>> {
        (**self).get_history(key)
    }
}

/// In-memory ledger for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryLedger {
    entries: RwLock<HashMap<String, Vec<Vec<u8>>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LedgerState for MemoryLedger {
    fn put_state(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| Error::Ledger("lock poisoned".to_string()))?;
        entries.entry(key.to_string()).or_default().push(value.to_vec());
        Ok(())
    }

    fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| Error::Ledger("lock poisoned".to_string()))?;
        Ok(entries.get(key).and_then(|history| history.last().cloned()))
    }

    fn get_history(&self, key: &str) -> Result<Vec<Vec<u8>>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| Error::Ledger("lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned().unwrap_or_default())
    }
}
