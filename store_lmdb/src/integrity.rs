//! Startup checks of the ledger tables.
//!
//! Counts the entries of every table and flags combinations a committed
//! ledger can never be in, such as UTXO entries without any stored block.
//! Problems are reported, not raised; the caller decides whether to go on.

use heed::types::Bytes;
use heed::Env;

use crate::environment::DATABASE_NAMES;
use crate::LmdbError;

/// Entry counts per table plus every inconsistency found.
#[derive(Debug, Default)]
pub struct IntegrityReport {
    pub entries: Vec<(&'static str, u64)>,
    pub problems: Vec<String>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.problems.is_empty()
    }

    /// Entries in `table`, `None` if it could not be read.
    pub fn entries_in(&self, table: &str) -> Option<u64> {
        self.entries
            .iter()
            .find(|(name, _)| *name == table)
            .map(|(_, count)| *count)
    }

    pub fn total_entries(&self) -> u64 {
        self.entries.iter().map(|(_, count)| count).sum()
    }
}

pub fn check_integrity(env: &Env) -> Result<IntegrityReport, LmdbError> {
    let mut report = IntegrityReport::default();
    let rtxn = env.read_txn()?;

    for &table in DATABASE_NAMES {
        match env.open_database::<Bytes, Bytes>(&rtxn, Some(table)) {
            Ok(Some(db)) => match db.len(&rtxn) {
                Ok(count) => report.entries.push((table, count)),
                Err(e) => report.problems.push(format!("cannot count {}: {}", table, e)),
            },
            Ok(None) => report.problems.push(format!("table {} is missing", table)),
            Err(e) => report.problems.push(format!("cannot open {}: {}", table, e)),
        }
    }

    let count = |table: &str| report.entries_in(table).unwrap_or(0);
    let (blocks, utxos, journals, meta) = (
        count("blocks"),
        count("utxos"),
        count("spend_journal"),
        count("meta"),
    );
    let mut problems = Vec::new();
    if blocks == 0 && (utxos > 0 || journals > 0) {
        problems.push(format!(
            "{} utxo entries and {} journals but no stored block",
            utxos, journals
        ));
    }
    if journals > blocks {
        problems.push(format!("{} spend journals for {} blocks", journals, blocks));
    }
    if blocks > 0 && meta == 0 {
        problems.push(format!("{} blocks stored without a best state", blocks));
    }
    report.problems.extend(problems);

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LmdbEnvironment;
    use dagchain_store::{DatabaseExt, StoreError, WriteTxn};
    use dagchain_types::{BlockHash, OutPoint, TxHash};

    fn open(dir: &tempfile::TempDir) -> LmdbEnvironment {
        LmdbEnvironment::open(dir.path(), 8, 16 * 1024 * 1024).unwrap()
    }

    #[test]
    fn fresh_environment_is_healthy() {
        let dir = tempfile::tempdir().unwrap();
        let env = open(&dir);
        let report = check_integrity(env.env()).unwrap();
        assert!(report.is_healthy(), "{:?}", report.problems);
        assert_eq!(report.entries.len(), DATABASE_NAMES.len());
        assert_eq!(report.total_entries(), 0);
    }

    #[test]
    fn utxos_without_blocks_are_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let env = open(&dir);
        env.update(|txn: &mut dyn WriteTxn| {
            txn.put_utxo(&OutPoint::new(TxHash::new([1; 32]), 0), b"entry")?;
            Ok::<_, StoreError>(())
        })
        .unwrap();

        let report = check_integrity(env.env()).unwrap();
        assert_eq!(report.entries_in("utxos"), Some(1));
        assert!(!report.is_healthy());
    }

    #[test]
    fn blocks_need_a_best_state() {
        let dir = tempfile::tempdir().unwrap();
        let env = open(&dir);
        env.update(|txn: &mut dyn WriteTxn| {
            txn.put_block(&BlockHash::new([2; 32]), b"body")?;
            Ok::<_, StoreError>(())
        })
        .unwrap();
        let report = check_integrity(env.env()).unwrap();
        assert_eq!(report.problems.len(), 1);

        env.update(|txn: &mut dyn WriteTxn| {
            txn.put_meta("best_state", b"record")?;
            Ok::<_, StoreError>(())
        })
        .unwrap();
        assert!(check_integrity(env.env()).unwrap().is_healthy());
    }
}
