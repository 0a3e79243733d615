//! Read-only snapshots of the environment.
//!
//! The lookup helpers here take a plain `RoTxn` so [`WriteBatch`] can serve
//! reads of its own uncommitted writes through the same code.
//!
//! [`WriteBatch`]: crate::WriteBatch

use heed::types::Bytes;
use heed::{Database as HeedDatabase, RoTxn};

use dagchain_store::{ReadTxn, StoreError};
use dagchain_types::{BlockHash, OutPoint};

use crate::environment::LmdbEnvironment;
use crate::LmdbError;

/// A consistent point-in-time view of every table.
pub struct ReadSnapshot<'a> {
    txn: RoTxn<'a>,
    env: &'a LmdbEnvironment,
}

impl<'a> ReadSnapshot<'a> {
    pub(crate) fn new(env: &'a LmdbEnvironment) -> Result<Self, StoreError> {
        let txn = env.env.read_txn().map_err(LmdbError::from)?;
        Ok(Self { txn, env })
    }
}

pub(crate) fn get_bytes(
    db: &HeedDatabase<Bytes, Bytes>,
    txn: &RoTxn<'_>,
    key: &[u8],
) -> Result<Option<Vec<u8>>, StoreError> {
    let value = db.get(txn, key).map_err(LmdbError::from)?;
    Ok(value.map(<[u8]>::to_vec))
}

pub(crate) fn count(db: &HeedDatabase<Bytes, Bytes>, txn: &RoTxn<'_>) -> Result<u64, StoreError> {
    Ok(db.len(txn).map_err(LmdbError::from)?)
}

pub(crate) fn all_utxos(
    env: &LmdbEnvironment,
    txn: &RoTxn<'_>,
) -> Result<Vec<(OutPoint, Vec<u8>)>, StoreError> {
    let mut entries = Vec::new();
    for item in env.utxos_db.iter(txn).map_err(LmdbError::from)? {
        let (key, value) = item.map_err(LmdbError::from)?;
        let outpoint = OutPoint::from_key(key).ok_or_else(|| {
            LmdbError::Corruption(format!("utxo key of length {}", key.len()))
        })?;
        entries.push((outpoint, value.to_vec()));
    }
    Ok(entries)
}

impl ReadTxn for ReadSnapshot<'_> {
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
