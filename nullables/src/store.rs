//! Nullable store: thread-safe in-memory storage for testing.
//!
//! Each update runs against a copy of the tables which replaces the live
//! tables only when the closure succeeds, so rollback behaves like a real
//! transactional backend.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use dagchain_store::{Database, ReadTxn, StoreError, WriteTxn};
use dagchain_types::{BlockHash, OutPoint};

#[derive(Clone, Default)]
struct Tables {
    blocks: BTreeMap<[u8; 32], Vec<u8>>,
    utxos: BTreeMap<[u8; 36], Vec<u8>>,
    spend_journal: BTreeMap<[u8; 32], Vec<u8>>,
    meta: BTreeMap<String, Vec<u8>>,
}

impl ReadTxn for Tables {
    fn get_block(&self, hash: &BlockHash) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.blocks.get(hash.as_bytes()).cloned())
    }

    fn block_count(&self) -> Result<u64, StoreError> {
        Ok(self.blocks.len() as u64)
    }

    fn get_utxo(&self, outpoint: &OutPoint) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.utxos.get(&outpoint.to_key()).cloned())
    }

    fn utxo_count(&self) -> Result<u64, StoreError> {
        Ok(self.utxos.len() as u64)
    }

    fn utxo_entries(&self) -> Result<Vec<(OutPoint, Vec<u8>)>, StoreError> {
        self.utxos
            .iter()
            .map(|(key, value)| {
                OutPoint::from_key(key)
                    .map(|outpoint| (outpoint, value.clone()))
                    .ok_or_else(|| StoreError::Corruption("bad utxo key".into()))
            })
            .collect()
    }

    fn get_spend_journal(&self, hash: &BlockHash) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.spend_journal.get(hash.as_bytes()).cloned())
    }

    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.meta.get(key).cloned())
    }
}

impl WriteTxn for Tables {
    fn put_block(&mut self, hash: &BlockHash, bytes: &[u8]) -> Result<(), StoreError> {
        self.blocks.insert(*hash.as_bytes(), bytes.to_vec());
        Ok(())
    }

    fn put_utxo(&mut self, outpoint: &OutPoint, bytes: &[u8]) -> Result<(), StoreError> {
        self.utxos.insert(outpoint.to_key(), bytes.to_vec());
        Ok(())
    }

    fn delete_utxo(&mut self, outpoint: &OutPoint) -> Result<(), StoreError> {
        self.utxos.remove(&outpoint.to_key());
        Ok(())
    }

    fn put_spend_journal(&mut self, hash: &BlockHash, bytes: &[u8]) -> Result<(), StoreError> {
        self.spend_journal.insert(*hash.as_bytes(), bytes.to_vec());
        Ok(())
    }

    fn delete_spend_journal(&mut self, hash: &BlockHash) -> Result<(), StoreError> {
        self.spend_journal.remove(hash.as_bytes());
        Ok(())
    }

    fn put_meta(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.meta.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete_meta(&mut self, key: &str) -> Result<(), StoreError> {
        self.meta.remove(key);
        Ok(())
    }
}

/// An in-memory [`Database`] for testing.
/// Thread-safe for use with tokio's multi-threaded runtime.
#[derive(Default)]
pub struct NullStore {
    tables: Mutex<Tables>,
    fail_writes: AtomicBool,
    commits: AtomicUsize,
}

impl NullStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every update fails at commit time and leaves the store
    /// untouched.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of updates that committed.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn utxo_len(&self) -> usize {
        self.tables.lock().utxos.len()
    }

    pub fn block_len(&self) -> usize {
        self.tables.lock().blocks.len()
    }

    pub fn journal_len(&self) -> usize {
        self.tables.lock().spend_journal.len()
    }

    /// Raw UTXO table contents in key order.
    pub fn utxo_snapshot(&self) -> Vec<(OutPoint, Vec<u8>)> {
        self.tables.lock().utxo_entries().unwrap_or_default()
    }
}

impl Database for NullStore {
    fn view_raw(
        &self,
        f: &mut dyn FnMut(&dyn ReadTxn) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let tables = self.tables.lock().clone();
        f(&tables)
    }

    fn update_raw(
        &self,
        f: &mut dyn FnMut(&mut dyn WriteTxn) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let mut live = self.tables.lock();
        let mut scratch = live.clone();
        f(&mut scratch)?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected write failure".into()));
        }
        *live = scratch;
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
