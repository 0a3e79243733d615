//! The spend journal: for every connected block, the pre-spend state of each
//! output it consumed, in the order the spends happened.

use serde::{Deserialize, Serialize};

use dagchain_store::{ReadTxn, WriteTxn};
use dagchain_types::{Amount, Block, BlockHash, CoinId, TxKind};

use crate::block_store::fetch_block;
use crate::error::{decode, encode, LedgerError, LedgerResult};

/// Pre-spend state of one consumed output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpentTxOut {
    pub amount: Amount,
    /// Fees collected by the origin block in the spent coin, recorded when
    /// a coinbase output is spent.
    pub fees: Amount,
    pub pk_script: Vec<u8>,
    /// Block that created the spent output.
    pub block_hash: BlockHash,
    pub is_coinbase: bool,
    /// Position of the spending transaction in its block.
    pub tx_index: u32,
    /// Position of the spending input in its transaction.
    pub tx_in_index: u32,
}

/// Number of journal entries connecting `block` produces.
pub fn count_spent_outputs(block: &Block) -> usize {
    block
        .transactions
        .iter()
        .map(|tx| match tx.kind {
            TxKind::Regular | TxKind::TokenMint => tx.spending_inputs().len(),
            TxKind::CrossChainImport => 1,
            TxKind::Coinbase | TxKind::TokenTransfer | TxKind::CrossChainVm => 0,
        })
        .sum()
}

pub fn put_spend_journal<T: WriteTxn + ?Sized>(
    txn: &mut T,
    hash: &BlockHash,
    stxos: &[SpentTxOut],
) -> LedgerResult<()> {
    txn.put_spend_journal(hash, &encode(&stxos)?)?;
    Ok(())
}

/// The journal of `hash`, empty when none was written.
pub fn fetch_spend_journal<T: ReadTxn + ?Sized>(txn: &T, hash: &BlockHash) -> LedgerResult<Vec<SpentTxOut>> {
    match txn.get_spend_journal(hash)? {
        Some(bytes) => decode(&bytes),
        None => Ok(Vec::new()),
    }
}

pub fn remove_spend_journal<T: WriteTxn + ?Sized>(txn: &mut T, hash: &BlockHash) -> LedgerResult<()> {
    txn.delete_spend_journal(hash)?;
    Ok(())
}

/// Fees block `hash` collected in `coin`: what its regular transactions
/// spent in that coin minus what they paid out in it.
pub fn block_fee_by_coin<T: ReadTxn + ?Sized>(txn: &T, hash: &BlockHash, coin: CoinId) -> LedgerResult<Amount> {
    let block = fetch_block(txn, hash)?.ok_or(LedgerError::MissingBlock(*hash))?;
    let stxos = fetch_spend_journal(txn, hash)?;

    let mut spent_by_tx = vec![0u64; block.transactions.len()];
    let mut journaled = vec![false; block.transactions.len()];
    for stxo in &stxos {
        let index = stxo.tx_index as usize;
        if index >= block.transactions.len() {
            return Err(LedgerError::AssertionFailure(format!(
                "journal of {} references transaction {} of {}",
                hash,
                index,
                block.transactions.len()
            )));
        }
        journaled[index] = true;
        if stxo.amount.coin == coin {
            spent_by_tx[index] = spent_by_tx[index].saturating_add(stxo.amount.value);
        }
    }

    let mut fees = 0u64;
    for (index, tx) in block.transactions.iter().enumerate() {
        if tx.kind != TxKind::Regular || !journaled[index] {
            continue;
        }
        let fee = spent_by_tx[index].saturating_sub(tx.output_value(coin));
        fees = fees.saturating_add(fee);
    }
    Ok(Amount::new(fees, coin))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagchain_types::{OutPoint, Transaction, TxHash, TxIn, TxOut};

    fn tx(kind: TxKind, inputs: usize) -> Transaction {
        Transaction {
            version: 1,
            kind,
            inputs: (0..inputs)
                .map(|i| TxIn::new(OutPoint::new(TxHash::new([i as u8 + 1; 32]), 0)))
                .collect(),
            outputs: vec![TxOut::new(Amount::primary(1), vec![0x51])],
            lock_time: 0,
        }
    }

    #[test]
    fn counts_follow_transaction_kinds() {
        let block = Block {
            header: dagchain_types::NetworkParams::regtest().genesis.header,
            transactions: vec![
                tx(TxKind::Coinbase, 1),
                tx(TxKind::Regular, 3),
                tx(TxKind::TokenMint, 2),
                tx(TxKind::TokenTransfer, 4),
                tx(TxKind::CrossChainImport, 1),
                tx(TxKind::CrossChainVm, 2),
            ],
        };
        assert_eq!(count_spent_outputs(&block), 3 + 1 + 1);
    }

    #[test]
    fn journal_encoding_round_trips() {
        let stxo = SpentTxOut {
            amount: Amount::primary(9),
            fees: Amount::zero(CoinId::PRIMARY),
            pk_script: vec![0x51],
            block_hash: BlockHash::new([4; 32]),
            is_coinbase: true,
            tx_index: 1,
            tx_in_index: 0,
        };
        let bytes = encode(&vec![stxo.clone()]).unwrap();
        let decoded: Vec<SpentTxOut> = decode(&bytes).unwrap();
        assert_eq!(decoded, vec![stxo]);
    }
}
