//! Transaction semantics of the LMDB backend: commit visibility, rollback on
//! error, and read-your-writes inside a batch.

use dagchain_store::{DatabaseExt, ReadTxn, StoreError, WriteTxn};
use dagchain_store_lmdb::LmdbEnvironment;
use dagchain_types::{BlockHash, OutPoint, TxHash};

fn temp_env() -> (tempfile::TempDir, LmdbEnvironment) {
    let dir = tempfile::tempdir().expect("temp dir");
    let env = LmdbEnvironment::open(dir.path(), 8, 64 * 1024 * 1024).expect("open env");
    (dir, env)
}

fn outpoint(n: u8, index: u32) -> OutPoint {
    OutPoint::new(TxHash::new([n; 32]), index)
}

#[test]
fn committed_update_is_visible_to_views() {
    let (_dir, env) = temp_env();
    let hash = BlockHash::new([1; 32]);

    env.update(|txn: &mut dyn WriteTxn| {
        txn.put_block(&hash, b"block")?;
        txn.put_utxo(&outpoint(1, 0), b"entry")?;
        txn.put_meta("best_state", b"state")?;
        Ok::<_, StoreError>(())
    })
    .unwrap();

    let (block, utxo, meta, count) = env
        .view(|txn: &dyn ReadTxn| {
            Ok::<_, StoreError>((
                txn.get_block(&hash)?,
                txn.get_utxo(&outpoint(1, 0))?,
                txn.get_meta("best_state")?,
                txn.block_count()?,
            ))
        })
        .unwrap();
    assert_eq!(block.as_deref(), Some(&b"block"[..]));
    assert_eq!(utxo.as_deref(), Some(&b"entry"[..]));
    assert_eq!(meta.as_deref(), Some(&b"state"[..]));
    assert_eq!(count, 1);
}

#[test]
fn failed_update_rolls_back_every_write() {
    let (_dir, env) = temp_env();
    let hash = BlockHash::new([2; 32]);

    let result = env.update(|txn: &mut dyn WriteTxn| {
        txn.put_block(&hash, b"block")?;
        txn.put_spend_journal(&hash, b"journal")?;
        Err::<(), _>(StoreError::Corruption("injected".into()))
    });
    assert!(matches!(result, Err(StoreError::Corruption(_))));

    let (has_block, journal) = env
        .view(|txn: &dyn ReadTxn| {
            Ok::<_, StoreError>((txn.has_block(&hash)?, txn.get_spend_journal(&hash)?))
        })
        .unwrap();
    assert!(!has_block);
    assert!(journal.is_none());
}

#[test]
fn batch_reads_its_own_writes() {
    let (_dir, env) = temp_env();
    let seen = env
        .update(|txn: &mut dyn WriteTxn| {
            txn.put_utxo(&outpoint(3, 1), b"a")?;
            let before = txn.get_utxo(&outpoint(3, 1))?;
            txn.delete_utxo(&outpoint(3, 1))?;
            let after = txn.get_utxo(&outpoint(3, 1))?;
            Ok::<_, StoreError>((before, after))
        })
        .unwrap();
    assert_eq!(seen.0.as_deref(), Some(&b"a"[..]));
    assert!(seen.1.is_none());
}

#[test]
fn utxo_entries_are_key_ordered() {
    let (_dir, env) = temp_env();
    env.update(|txn: &mut dyn WriteTxn| {
        txn.put_utxo(&outpoint(9, 0), b"z")?;
        txn.put_utxo(&outpoint(1, 7), b"b")?;
        txn.put_utxo(&outpoint(1, 2), b"a")?;
        Ok::<_, StoreError>(())
    })
    .unwrap();

    let entries = env
        .view(|txn: &dyn ReadTxn| txn.utxo_entries())
        .unwrap();
    let keys: Vec<OutPoint> = entries.iter().map(|(op, _)| *op).collect();
    assert_eq!(keys, vec![outpoint(1, 2), outpoint(1, 7), outpoint(9, 0)]);
}

#[test]
fn data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let hash = BlockHash::new([5; 32]);
    {
        let env = LmdbEnvironment::open(dir.path(), 8, 16 * 1024 * 1024).unwrap();
        let mut batch = env.write_batch().unwrap();
        batch.put_block(&hash, b"persisted").unwrap();
        batch.commit().unwrap();
        env.sync().unwrap();
    }
    let env = LmdbEnvironment::open(dir.path(), 8, 16 * 1024 * 1024).unwrap();
    let block = env.view(|txn: &dyn ReadTxn| txn.get_block(&hash)).unwrap();
    assert_eq!(block.as_deref(), Some(&b"persisted"[..]));
}
