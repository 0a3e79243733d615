//! Read and write transaction handles.
//!
//! A handle is only valid inside the closure passed to
//! [`Database::view_raw`](crate::Database::view_raw) or
//! [`Database::update_raw`](crate::Database::update_raw).

use crate::StoreError;
use dagchain_types::{BlockHash, OutPoint};

/// Read-only access to every table.
pub trait ReadTxn {
    // ── Blocks ──────────────────────────────────────────────────────────

    fn get_block(&self, hash: &BlockHash) -> Result<Option<Vec<u8>>, StoreError>;

    fn has_block(&self, hash: &BlockHash) -> Result<bool, StoreError> {
        Ok(self.get_block(hash)?.is_some())
    }

    fn block_count(&self) -> Result<u64, StoreError>;

    // ── UTXO set ────────────────────────────────────────────────────────

    fn get_utxo(&self, outpoint: &OutPoint) -> Result<Option<Vec<u8>>, StoreError>;

    fn utxo_count(&self) -> Result<u64, StoreError>;

    /// Every entry of the UTXO set in key order.
    fn utxo_entries(&self) -> Result<Vec<(OutPoint, Vec<u8>)>, StoreError>;

    // ── Spend journal ───────────────────────────────────────────────────

    fn get_spend_journal(&self, hash: &BlockHash) -> Result<Option<Vec<u8>>, StoreError>;

    // ── Metadata ────────────────────────────────────────────────────────

    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
}

/// Writable transaction handle (extends ReadTxn). Writes become visible to
/// other transactions only when the enclosing update commits.
pub trait WriteTxn: ReadTxn {
    fn put_block(&mut self, hash: &BlockHash, bytes: &[u8]) -> Result<(), StoreError>;

    fn put_utxo(&mut self, outpoint: &OutPoint, bytes: &[u8]) -> Result<(), StoreError>;

    fn delete_utxo(&mut self, outpoint: &OutPoint) -> Result<(), StoreError>;

    fn put_spend_journal(&mut self, hash: &BlockHash, bytes: &[u8]) -> Result<(), StoreError>;

    fn delete_spend_journal(&mut self, hash: &BlockHash) -> Result<(), StoreError>;

    fn put_meta(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    fn delete_meta(&mut self, key: &str) -> Result<(), StoreError>;
}
