//! Write batching: groups every store operation of one block connect or
//! disconnect into a single LMDB write transaction.
//!
//! # Usage
//!
//! ```ignore
//! let mut batch = env.write_batch()?;
//! batch.put_block(&hash, &block_bytes)?;
//! batch.put_utxo(&outpoint, &entry_bytes)?;
//! batch.put_spend_journal(&hash, &journal_bytes)?;
//! batch.commit()?;
//! ```
//!
//! If the batch is dropped without calling [`WriteBatch::commit`], all
//! operations are rolled back (the underlying LMDB transaction is aborted).

use heed::RwTxn;

use dagchain_store::{ReadTxn, StoreError, WriteTxn};
use dagchain_types::{BlockHash, OutPoint};

use crate::environment::LmdbEnvironment;
use crate::read_txn::{all_utxos, count, get_bytes};
use crate::LmdbError;

/// A write batch that groups multiple store operations into a single LMDB
/// write transaction. Reads through the batch observe its own writes.
pub struct WriteBatch<'a> {
    txn: RwTxn<'a>,
    env: &'a LmdbEnvironment,
}

impl<'a> WriteBatch<'a> {
    /// Begin a new write batch.
    pub(crate) fn new(env: &'a LmdbEnvironment) -> Result<Self, StoreError> {
        let txn = env.env.write_txn().map_err(LmdbError::from)?;
        Ok(Self { txn, env })
    }

    /// Commit every operation in the batch atomically.
    pub fn commit(self) -> Result<(), StoreError> {
        self.txn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}

impl ReadTxn for WriteBatch<'_> {
    fn get_block(&self, hash: &BlockHash) -> Result<Option<Vec<u8>>, StoreError> {
        get_bytes(&self.env.blocks_db, &self.txn, hash.as_bytes().as_slice())
    }

    fn block_count(&self) -> Result<u64, StoreError> {
        count(&self.env.blocks_db, &self.txn)
    }

    fn get_utxo(&self, outpoint: &OutPoint) -> Result<Option<Vec<u8>>, StoreError> {
        get_bytes(&self.env.utxos_db, &self.txn, outpoint.to_key().as_slice())
    }

    fn utxo_count(&self) -> Result<u64, StoreError> {
        count(&self.env.utxos_db, &self.txn)
    }

    fn utxo_entries(&self) -> Result<Vec<(OutPoint, Vec<u8>)>, StoreError> {
        all_utxos(self.env, &self.txn)
    }

    fn get_spend_journal(&self, hash: &BlockHash) -> Result<Option<Vec<u8>>, StoreError> {
        get_bytes(&self.env.spend_journal_db, &self.txn, hash.as_bytes().as_slice())
    }

    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        get_bytes(&self.env.meta_db, &self.txn, key.as_bytes())
    }
}

impl WriteTxn for WriteBatch<'_> {
    // ── Block operations ────────────────────────────────────────────────

    fn put_block(&mut self, hash: &BlockHash, bytes: &[u8]) -> Result<(), StoreError> {
        self.env
            .blocks_db
            .put(&mut self.txn, hash.as_bytes().as_slice(), bytes)
            .map_err(LmdbError::from)?;
        Ok(())
    }

    // ── UTXO operations ─────────────────────────────────────────────────

    fn put_utxo(&mut self, outpoint: &OutPoint, bytes: &[u8]) -> Result<(), StoreError> {
        self.env
            .utxos_db
            .put(&mut self.txn, outpoint.to_key().as_slice(), bytes)
            .map_err(LmdbError::from)?;
        Ok(())
    }

    fn delete_utxo(&mut self, outpoint: &OutPoint) -> Result<(), StoreError> {
        self.env
            .utxos_db
            .delete(&mut self.txn, outpoint.to_key().as_slice())
            .map_err(LmdbError::from)?;
        Ok(())
    }

    // ── Spend journal operations ────────────────────────────────────────

    fn put_spend_journal(&mut self, hash: &BlockHash, bytes: &[u8]) -> Result<(), StoreError> {
        self.env
            .spend_journal_db
            .put(&mut self.txn, hash.as_bytes().as_slice(), bytes)
            .map_err(LmdbError::from)?;
        Ok(())
    }

    fn delete_spend_journal(&mut self, hash: &BlockHash) -> Result<(), StoreError> {
        self.env
            .spend_journal_db
            .delete(&mut self.txn, hash.as_bytes().as_slice())
            .map_err(LmdbError::from)?;
        Ok(())
    }

    // ── Meta operations ─────────────────────────────────────────────────

    fn put_meta(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.env
            .meta_db
            .put(&mut self.txn, key.as_bytes(), value)
            .map_err(LmdbError::from)?;
        Ok(())
    }

    fn delete_meta(&mut self, key: &str) -> Result<(), StoreError> {
        self.env
            .meta_db
            .delete(&mut self.txn, key.as_bytes())
            .map_err(LmdbError::from)?;
        Ok(())
    }
}
