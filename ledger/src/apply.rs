//! Applying transactions to a [`UtxoView`] and reversing them.
//!
//! Connect and disconnect are exact inverses: connecting a block and then
//! disconnecting it with the journal the connect produced leaves every
//! touched entry as it was before.

use dagchain_store::ReadTxn;
use dagchain_types::{Amount, Block, BlockHash, CoinId, OutPoint, Transaction, TxKind};

use crate::error::{LedgerError, LedgerResult};
use crate::journal::{block_fee_by_coin, count_spent_outputs, SpentTxOut};
use crate::utxo::{UtxoEntry, UtxoView};

/// Index of the subsidy output in every coinbase.
const SUBSIDY_OUTPUT_INDEX: u32 = 0;

/// Apply `tx` (at position `tx_index` in block `block_hash`) to the view.
///
/// Every spent output must already be loaded into the view; a missing one
/// means the caller broke ordering. When `stxos` is given, one journal entry
/// is appended per spent output.
pub fn connect_transaction<T: ReadTxn + ?Sized>(
    txn: &T,
    view: &mut UtxoView,
    tx: &Transaction,
    tx_index: u32,
    block_hash: &BlockHash,
    genesis_hash: &BlockHash,
    mut stxos: Option<&mut Vec<SpentTxOut>>,
) -> LedgerResult<()> {
    match tx.kind {
        TxKind::Coinbase => {
            view.add_tx_outs(tx, *block_hash);
            return Ok(());
        }
        TxKind::TokenTransfer | TxKind::CrossChainVm => return Ok(()),
        TxKind::CrossChainImport => {
            if let Some(stxos) = stxos {
                stxos.push(SpentTxOut {
                    amount: Amount::primary(tx.output_value(CoinId::PRIMARY)),
                    fees: Amount::zero(CoinId::PRIMARY),
                    pk_script: Vec::new(),
                    block_hash: BlockHash::ZERO,
                    is_coinbase: false,
                    tx_index,
                    tx_in_index: 0,
                });
            }
            view.add_tx_outs(tx, *block_hash);
            return Ok(());
        }
        TxKind::Regular | TxKind::TokenMint => {}
    }

    // Token mints designate the token with input 0, which spends nothing.
    let first_spending = if tx.is_token_mint() { 1 } else { 0 };
    for (offset, input) in tx.spending_inputs().iter().enumerate() {
        let outpoint = input.previous_out;
        let entry = view.lookup_mut(&outpoint).ok_or_else(|| {
            LedgerError::AssertionFailure(format!(
                "view missing input {} of transaction {}",
                outpoint,
                tx.hash()
            ))
        })?;

        if let Some(stxos) = stxos.as_deref_mut() {
            let amount = entry.amount();
            let mut fees = Amount::zero(amount.coin);
            if entry.is_coinbase()
                && entry.block_hash() != *genesis_hash
                && (outpoint.index == SUBSIDY_OUTPUT_INDEX || !amount.coin.is_primary())
            {
                fees = block_fee_by_coin(txn, &entry.block_hash(), amount.coin)?;
            }
            stxos.push(SpentTxOut {
                amount,
                fees,
                pk_script: entry.pk_script().to_vec(),
                block_hash: entry.block_hash(),
                is_coinbase: entry.is_coinbase(),
                tx_index,
                tx_in_index: (first_spending + offset) as u32,
            });
        }
        entry.spend();
    }

    view.add_tx_outs(tx, *block_hash);
    Ok(())
}

/// Apply every transaction of `block` in order.
pub fn connect_transactions<T: ReadTxn + ?Sized>(
    txn: &T,
    view: &mut UtxoView,
    block: &Block,
    genesis_hash: &BlockHash,
    mut stxos: Option<&mut Vec<SpentTxOut>>,
) -> LedgerResult<()> {
    let block_hash = block.hash();
    for (index, tx) in block.transactions.iter().enumerate() {
        connect_transaction(
            txn,
            view,
            tx,
            index as u32,
            &block_hash,
            genesis_hash,
            stxos.as_deref_mut(),
        )?;
    }
    Ok(())
}

/// Reverse the effects of `block` using the journal its connect produced.
///
/// The view must hold every output `block` created that is still unspent;
/// see [`UtxoView::fetch_block_utxos`]. Created outputs are tombstoned and
/// spent outputs are restored from `stxos`, consumed from the back.
pub fn disconnect_transactions(view: &mut UtxoView, block: &Block, stxos: &[SpentTxOut]) -> LedgerResult<()> {
    let expected = count_spent_outputs(block);
    if stxos.len() != expected {
        return Err(LedgerError::AssertionFailure(format!(
            "journal of {} holds {} entries, block spends {}",
            block.hash(),
            stxos.len(),
            expected
        )));
    }

    let block_hash = block.hash();
    let mut remaining = stxos.len();

    for tx in block.transactions.iter().rev() {
        if !tx.has_utxo_effects() {
            continue;
        }

        let tx_hash = tx.hash();
        let is_coinbase = tx.is_coinbase();
        for (index, output) in tx.outputs.iter().enumerate() {
            if output.is_unspendable() {
                continue;
            }
            let outpoint = OutPoint::new(tx_hash, index as u32);
            view.entry_or_insert_with(outpoint, || {
                UtxoEntry::new(output.amount, output.pk_script.clone(), block_hash, is_coinbase)
            })
            .spend();
        }

        match tx.kind {
            TxKind::Coinbase => continue,
            TxKind::CrossChainImport => {
                pop_stxo(stxos, &mut remaining, &block_hash)?;
                continue;
            }
            _ => {}
        }

        for input in tx.spending_inputs().iter().rev() {
            let stxo = pop_stxo(stxos, &mut remaining, &block_hash)?;
            let entry = view.entry_or_insert_with(input.previous_out, || {
                UtxoEntry::new(stxo.amount, stxo.pk_script.clone(), stxo.block_hash, stxo.is_coinbase)
            });
            entry.restore(stxo.amount, stxo.pk_script.clone(), stxo.block_hash, stxo.is_coinbase);
        }
    }

    if remaining != 0 {
        return Err(LedgerError::AssertionFailure(format!(
            "{} journal entries of {} left unconsumed",
            remaining, block_hash
        )));
    }
    Ok(())
}

fn pop_stxo<'a>(
    stxos: &'a [SpentTxOut],
    remaining: &mut usize,
    block_hash: &BlockHash,
) -> LedgerResult<&'a SpentTxOut> {
    *remaining = remaining
        .checked_sub(1)
        .ok_or_else(|| LedgerError::AssertionFailure(format!("journal of {} exhausted", block_hash)))?;
    Ok(&stxos[*remaining])
}
