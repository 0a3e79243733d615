//! Unspent outputs and the request-scoped view over them.

use std::collections::HashMap;

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};

use dagchain_store::{ReadTxn, WriteTxn};
use dagchain_types::{Amount, Block, BlockHash, OutPoint, Transaction};

use crate::error::{decode, encode, LedgerResult};

const FLAG_COINBASE: u8 = 1 << 0;
const FLAG_SPENT: u8 = 1 << 1;
const FLAG_MODIFIED: u8 = 1 << 2;

/// One output as tracked by the ledger.
///
/// The spent and modified flags only exist in memory; the persisted form
/// is the amount, script, origin block and coinbase flag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UtxoEntry {
    amount: Amount,
    pk_script: Vec<u8>,
    block_hash: BlockHash,
    flags: u8,
}

#[derive(Serialize, Deserialize)]
struct StoredUtxo {
    amount: Amount,
    pk_script: Vec<u8>,
    block_hash: BlockHash,
    is_coinbase: bool,
}

impl UtxoEntry {
    pub fn new(amount: Amount, pk_script: Vec<u8>, block_hash: BlockHash, is_coinbase: bool) -> Self {
        Self {
            amount,
            pk_script,
            block_hash,
            flags: if is_coinbase { FLAG_COINBASE } else { 0 },
        }
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn pk_script(&self) -> &[u8] {
        &self.pk_script
    }

    /// Block that created the output.
    pub fn block_hash(&self) -> BlockHash {
        self.block_hash
    }

    pub fn is_coinbase(&self) -> bool {
        self.flags & FLAG_COINBASE != 0
    }

    pub fn is_spent(&self) -> bool {
        self.flags & FLAG_SPENT != 0
    }

    pub fn is_modified(&self) -> bool {
        self.flags & FLAG_MODIFIED != 0
    }

    pub fn spend(&mut self) {
        self.flags |= FLAG_SPENT | FLAG_MODIFIED;
    }

    /// Overwrite with a journaled pre-spend state, unspent and pending write.
    pub fn restore(&mut self, amount: Amount, pk_script: Vec<u8>, block_hash: BlockHash, is_coinbase: bool) {
        self.amount = amount;
        self.pk_script = pk_script;
        self.block_hash = block_hash;
        self.flags = FLAG_MODIFIED;
        if is_coinbase {
            self.flags |= FLAG_COINBASE;
        }
    }

    pub fn to_bytes(&self) -> LedgerResult<Vec<u8>> {
        encode(&StoredUtxo {
            amount: self.amount,
            pk_script: self.pk_script.clone(),
            block_hash: self.block_hash,
            is_coinbase: self.is_coinbase(),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> LedgerResult<Self> {
        let stored: StoredUtxo = decode(bytes)?;
        Ok(Self::new(
            stored.amount,
            stored.pk_script,
            stored.block_hash,
            stored.is_coinbase,
        ))
    }
}

/// Overlay of the UTXO entries touched by one connect, disconnect or
/// validation pass. Nothing reaches the store until [`put_utxo_view`].
#[derive(Debug, Default)]
pub struct UtxoView {
    entries: HashMap<OutPoint, UtxoEntry>,
}

impl UtxoView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &HashMap<OutPoint, UtxoEntry> {
        &self.entries
    }

    pub fn lookup(&self, outpoint: &OutPoint) -> Option<&UtxoEntry> {
        self.entries.get(outpoint)
    }

    pub fn lookup_mut(&mut self, outpoint: &OutPoint) -> Option<&mut UtxoEntry> {
        self.entries.get_mut(outpoint)
    }

    pub fn add_entry(&mut self, outpoint: OutPoint, entry: UtxoEntry) {
        self.entries.insert(outpoint, entry);
    }

    /// Entry for `outpoint`, created from `make` if the view has none.
    pub fn entry_or_insert_with(
        &mut self,
        outpoint: OutPoint,
        make: impl FnOnce() -> UtxoEntry,
    ) -> &mut UtxoEntry {
        self.entries.entry(outpoint).or_insert_with(make)
    }

    /// Add every spendable output of `tx`, created in `block_hash`.
    pub fn add_tx_outs(&mut self, tx: &Transaction, block_hash: BlockHash) {
        let tx_hash = tx.hash();
        let is_coinbase = tx.is_coinbase();
        for (index, output) in tx.outputs.iter().enumerate() {
            if output.is_unspendable() {
                continue;
            }
            let mut entry = UtxoEntry::new(output.amount, output.pk_script.clone(), block_hash, is_coinbase);
            entry.flags |= FLAG_MODIFIED;
            self.entries.insert(OutPoint::new(tx_hash, index as u32), entry);
        }
    }

    /// Load the given outpoints from the store. Outpoints already in the view
    /// are left alone; outpoints absent from the store stay absent.
    pub fn fetch_utxos<T, I>(&mut self, txn: &T, outpoints: I) -> LedgerResult<()>
    where
        T: ReadTxn + ?Sized,
        I: IntoIterator<Item = OutPoint>,
    {
        for outpoint in outpoints {
            if self.entries.contains_key(&outpoint) {
                continue;
            }
            if let Some(bytes) = txn.get_utxo(&outpoint)? {
                self.entries.insert(outpoint, UtxoEntry::from_bytes(&bytes)?);
            }
        }
        Ok(())
    }

    /// Load every output spent by `block`.
    pub fn fetch_input_utxos<T: ReadTxn + ?Sized>(&mut self, txn: &T, block: &Block) -> LedgerResult<()> {
        let outpoints: Vec<OutPoint> = block
            .transactions
            .iter()
            .flat_map(|tx| tx.spending_inputs().iter().map(|input| input.previous_out))
            .collect();
        self.fetch_utxos(txn, outpoints)
    }

    /// Load every output created or spent by `block`, as needed to reverse it.
    pub fn fetch_block_utxos<T: ReadTxn + ?Sized>(&mut self, txn: &T, block: &Block) -> LedgerResult<()> {
        let mut outpoints = Vec::new();
        for tx in &block.transactions {
            let tx_hash = tx.hash();
            outpoints.extend((0..tx.outputs.len() as u32).map(|i| OutPoint::new(tx_hash, i)));
            outpoints.extend(tx.spending_inputs().iter().map(|input| input.previous_out));
        }
        self.fetch_utxos(txn, outpoints)
    }

    /// Forget spent entries and clear the modified flags once the view has
    /// been written out.
    pub fn commit(&mut self) {
        self.entries.retain(|_, entry| !entry.is_spent());
        for entry in self.entries.values_mut() {
            entry.flags &= !FLAG_MODIFIED;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Write every modified entry of the view: spent entries are deleted,
/// unspent ones are stored.
pub fn put_utxo_view<T: WriteTxn + ?Sized>(txn: &mut T, view: &UtxoView) -> LedgerResult<()> {
    for (outpoint, entry) in view.entries() {
        if !entry.is_modified() {
            continue;
        }
        if entry.is_spent() {
            txn.delete_utxo(outpoint)?;
        } else {
            txn.put_utxo(outpoint, &entry.to_bytes()?)?;
        }
    }
    Ok(())
}

/// Blake2b digest of the whole persisted UTXO set in key order. Two stores
/// hold the same unspent outputs exactly when their digests match.
pub fn utxo_set_digest<T: ReadTxn + ?Sized>(txn: &T) -> LedgerResult<[u8; 32]> {
    let mut hasher = Blake2b::<U32>::new();
    for (outpoint, bytes) in txn.utxo_entries()? {
        hasher.update(outpoint.to_key());
        hasher.update((bytes.len() as u32).to_le_bytes());
        hasher.update(&bytes);
    }
    Ok(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagchain_store::DatabaseExt;
    use dagchain_nullables::NullStore;
    use dagchain_types::{TxHash, TxIn, TxKind, TxOut, OP_RETURN};

    fn tx_with_outputs(outputs: Vec<TxOut>) -> Transaction {
        Transaction {
            version: 1,
            kind: TxKind::Regular,
            inputs: vec![TxIn::new(OutPoint::new(TxHash::new([7; 32]), 0))],
            outputs,
            lock_time: 0,
        }
    }

    #[test]
    fn entry_bytes_drop_transient_flags() {
        let mut entry = UtxoEntry::new(Amount::primary(10), vec![1, 2], BlockHash::new([3; 32]), true);
        entry.spend();
        let decoded = UtxoEntry::from_bytes(&entry.to_bytes().unwrap()).unwrap();
        assert!(decoded.is_coinbase());
        assert!(!decoded.is_spent());
        assert!(!decoded.is_modified());
        assert_eq!(decoded.amount(), Amount::primary(10));
    }

    #[test]
    fn add_tx_outs_skips_unspendable() {
        let tx = tx_with_outputs(vec![
            TxOut::new(Amount::primary(5), vec![0x51]),
            TxOut::new(Amount::primary(0), vec![OP_RETURN]),
        ]);
        let mut view = UtxoView::new();
        view.add_tx_outs(&tx, BlockHash::new([1; 32]));
        assert_eq!(view.len(), 1);
        let entry = view.lookup(&OutPoint::new(tx.hash(), 0)).unwrap();
        assert!(entry.is_modified());
        assert!(!entry.is_coinbase());
    }

    #[test]
    fn commit_drops_spent_and_clears_modified() {
        let tx = tx_with_outputs(vec![
            TxOut::new(Amount::primary(5), vec![0x51]),
            TxOut::new(Amount::primary(6), vec![0x51]),
        ]);
        let mut view = UtxoView::new();
        view.add_tx_outs(&tx, BlockHash::ZERO);
        view.lookup_mut(&OutPoint::new(tx.hash(), 0)).unwrap().spend();
        view.commit();
        assert_eq!(view.len(), 1);
        assert!(!view.lookup(&OutPoint::new(tx.hash(), 1)).unwrap().is_modified());
    }

    #[test]
    fn put_view_writes_and_deletes() {
        let store = NullStore::new();
        let tx = tx_with_outputs(vec![
            TxOut::new(Amount::primary(5), vec![0x51]),
            TxOut::new(Amount::primary(6), vec![0x52]),
        ]);
        let mut view = UtxoView::new();
        view.add_tx_outs(&tx, BlockHash::ZERO);
        store
            .update(|txn: &mut dyn WriteTxn| put_utxo_view(txn, &view))
            .unwrap();
        assert_eq!(store.utxo_len(), 2);

        let mut view = UtxoView::new();
        store
            .view(|txn: &dyn ReadTxn| view.fetch_utxos(txn, [OutPoint::new(tx.hash(), 1)]))
            .unwrap();
        view.lookup_mut(&OutPoint::new(tx.hash(), 1)).unwrap().spend();
        store
            .update(|txn: &mut dyn WriteTxn| put_utxo_view(txn, &view))
            .unwrap();
        assert_eq!(store.utxo_len(), 1);
    }

    #[test]
    fn digest_tracks_contents() {
        let a = NullStore::new();
        let b = NullStore::new();
        let digest = |s: &NullStore| {
            s.view(|txn: &dyn ReadTxn| utxo_set_digest(txn)).unwrap()
        };
        assert_eq!(digest(&a), digest(&b));

        let entry = UtxoEntry::new(Amount::primary(1), vec![], BlockHash::ZERO, false);
        a.update(|txn: &mut dyn WriteTxn| {
            txn.put_utxo(&OutPoint::new(TxHash::new([1; 32]), 0), &entry.to_bytes()?)?;
            Ok::<_, crate::LedgerError>(())
        })
        .unwrap();
        assert_ne!(digest(&a), digest(&b));
    }
}
