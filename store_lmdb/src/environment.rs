//! LMDB environment setup.

use std::path::Path;
use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database as HeedDatabase, Env, EnvOpenOptions};

use dagchain_store::{Database, ReadTxn, StoreError, WriteTxn};

use crate::integrity::check_integrity;
use crate::read_txn::ReadSnapshot;
use crate::write_batch::WriteBatch;
use crate::LmdbError;

/// Names of every database the ledger keeps in the environment.
pub(crate) const DATABASE_NAMES: &[&str] = &["blocks", "utxos", "spend_journal", "meta"];

/// Wraps the LMDB environment and all database handles.
pub struct LmdbEnvironment {
    pub(crate) env: Arc<Env>,
    /// block hash → serialized block
    pub(crate) blocks_db: HeedDatabase<Bytes, Bytes>,
    /// outpoint key → serialized UTXO entry
    pub(crate) utxos_db: HeedDatabase<Bytes, Bytes>,
    /// block hash → serialized spent outputs of that block
    pub(crate) spend_journal_db: HeedDatabase<Bytes, Bytes>,
    /// string key → opaque bytes
    pub(crate) meta_db: HeedDatabase<Bytes, Bytes>,
}

impl LmdbEnvironment {
    /// Open or create an LMDB environment at the given path.
    pub fn open(path: &Path, max_dbs: u32, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)?;

        // SAFETY: the environment is opened once per path by this process and
        // the memory map is never accessed outside heed's transaction API.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(max_dbs.max(DATABASE_NAMES.len() as u32))
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let blocks_db = env.create_database::<Bytes, Bytes>(&mut wtxn, Some("blocks"))?;
        let utxos_db = env.create_database::<Bytes, Bytes>(&mut wtxn, Some("utxos"))?;
        let spend_journal_db =
            env.create_database::<Bytes, Bytes>(&mut wtxn, Some("spend_journal"))?;
        let meta_db = env.create_database::<Bytes, Bytes>(&mut wtxn, Some("meta"))?;
        wtxn.commit()?;

        let env = Arc::new(env);
        let report = check_integrity(&env)?;
        for problem in &report.problems {
            tracing::warn!(problem = %problem, "LMDB integrity check");
        }
        tracing::info!(
            path = %path.display(),
            tables = report.entries.len(),
            entries = report.total_entries(),
            "opened LMDB environment"
        );

        Ok(Self {
            env,
            blocks_db,
            utxos_db,
            spend_journal_db,
            meta_db,
        })
    }

    /// Access the underlying heed environment.
    pub fn env(&self) -> &Arc<Env> {
        &self.env
    }

    /// Begin a write batch. Dropping it without [`WriteBatch::commit`] aborts.
    pub fn write_batch(&self) -> Result<WriteBatch<'_>, StoreError> {
        WriteBatch::new(self)
    }

    /// Flush the memory map to disk.
    pub fn sync(&self) -> Result<(), LmdbError> {
        self.env.force_sync()?;
        Ok(())
    }
}

impl Database for LmdbEnvironment {
    fn view_raw(
        &self,
        f: &mut dyn FnMut(&dyn ReadTxn) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let snapshot = ReadSnapshot::new(self)?;
        f(&snapshot)
    }

    fn update_raw(
        &self,
        f: &mut dyn FnMut(&mut dyn WriteTxn) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new(self)?;
        // An early return drops the batch, which aborts the LMDB transaction.
        f(&mut batch)?;
        batch.commit()
    }
}
