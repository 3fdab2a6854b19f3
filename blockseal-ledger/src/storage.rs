//! Persistent ledger state backed by sled

use blockseal_core::LedgerState;
use blockseal_types::{Error, Result};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::path::Path;
use tracing::info;

const STATE_TREE: &str = "state";
const HISTORY_TREE: &str = "history";

/// Ledger state stored in a sled database.
///
/// Current values live in the `state` tree. Every write is also appended to
/// the `history` tree under `key || 0x00 || seq` with a big-endian sequence
/// number, so a prefix scan returns a key's values in write order.
pub struct SledLedger {
    db: Db,
    state: Tree,
    history: Tree,
}

impl SledLedger {
    /// Open or create a ledger at the given path
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| Error::Ledger(format!("Failed to open database: {}", e)))?;
        info!(path = %path.display(), "opened ledger state");
        Self::from_db(db)
    }

    /// Ledger that is removed when dropped
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| Error::Ledger(format!("Failed to open database: {}", e)))?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self> {
        let state = db
            .open_tree(STATE_TREE)
            .map_err(|e| Error::Ledger(format!("Failed to open state tree: {}", e)))?;
        let history = db
            .open_tree(HISTORY_TREE)
            .map_err(|e| Error::Ledger(format!("Failed to open history tree: {}", e)))?;
        Ok(Self { db, state, history })
    }

    /// Current keys starting with `prefix`
    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for item in self.state.scan_prefix(prefix.as_bytes()) {
            let (key, _) =
                item.map_err(|e| Error::Ledger(format!("Failed to iterate state: {}", e)))?;
            keys.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(keys)
    }

    pub fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| Error::Ledger(format!("Failed to flush database: {}", e)))?;
        Ok(())
    }
}

fn history_prefix(key: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(key.len() + 1);
    prefix.extend_from_slice(key.as_bytes());
    prefix.push(0);
    prefix
}

fn history_key(key: &str, seq: u64) -> Vec<u8> {
    let mut out = history_prefix(key);
    out.extend_from_slice(&seq.to_be_bytes());
    out
}

impl LedgerState for SledLedger {
    fn put_state(&self, key: &str, value: &[u8]) -> Result<()> {
        let seq = self
            .db
            .generate_id()
            .map_err(|e| Error::Ledger(format!("Failed to allocate sequence number: {}", e)))?;
        let entry = history_key(key, seq);

        (&self.state, &self.history)
            .transaction(|(state, history)| {
                state.insert(key.as_bytes(), value)?;
                history.insert(entry.as_slice(), value)?;
                Ok::<(), ConflictableTransactionError<()>>(())
            })
            .map_err(|e: TransactionError<()>| {
                Error::Ledger(format!("Failed to write {}: {:?}", key, e))
            })?;

        self.flush()
    }

    fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self
            .state
            .get(key.as_bytes())
            .map_err(|e| Error::Ledger(format!("Failed to read {}: {}", key, e)))?;
        Ok(value.map(|v| v.to_vec()))
    }

    fn get_history(&self, key: &str) -> Result<Vec<Vec<u8>>> {
        let mut values = Vec::new();
        for item in self.history.scan_prefix(history_prefix(key)) {
            let (entry, value) = item
                .map_err(|e| Error::Ledger(format!("Failed to read history of {}: {}", key, e)))?;
            // Only exact matches: "k" must not pick up "k\0..." of a longer key
            if entry.len() == key.len() + 9 {
                values.push(value.to_vec());
            }
        }
        Ok(values)
    }
}
