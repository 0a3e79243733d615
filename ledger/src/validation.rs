//! Input and value checks run against a [`UtxoView`] before a block's
//! effects are applied.

use std::collections::BTreeMap;

use dagchain_types::{Block, BlockHash, CoinId, Transaction, TxKind};

use crate::error::{LedgerError, LedgerResult};
use crate::utxo::UtxoView;

/// Fees collected by a block, per coin.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockFees {
    by_coin: BTreeMap<CoinId, u64>,
}

impl BlockFees {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, coin: CoinId) -> u64 {
        self.by_coin.get(&coin).copied().unwrap_or(0)
    }

    /// Returns `false` on overflow, leaving the total unchanged.
    pub fn add(&mut self, coin: CoinId, value: u64) -> bool {
        let total = self.by_coin.entry(coin).or_insert(0);
        match total.checked_add(value) {
            Some(sum) => {
                *total = sum;
                true
            }
            None => false,
        }
    }

    /// Merge another transaction's fees in. Returns `false` on overflow.
    pub fn merge(&mut self, other: &BlockFees) -> bool {
        other.by_coin.iter().all(|(coin, value)| self.add(*coin, *value))
    }

    pub fn iter(&self) -> impl Iterator<Item = (CoinId, u64)> + '_ {
        self.by_coin.iter().map(|(coin, value)| (*coin, *value))
    }
}

/// Check every output `tx` spends against the view and return the fees it
/// pays.
///
/// `origin_height` maps a block hash to its main height; it is used to
/// enforce coinbase maturity relative to `spend_height`.
pub fn check_transaction_inputs(
    view: &UtxoView,
    tx: &Transaction,
    spend_height: u64,
    coinbase_maturity: u64,
    origin_height: &dyn Fn(&BlockHash) -> Option<u64>,
) -> LedgerResult<BlockFees> {
    let mut fees = BlockFees::new();
    if !matches!(tx.kind, TxKind::Regular | TxKind::TokenMint) {
        return Ok(fees);
    }

    let tx_hash = tx.hash();
    let mut inputs = BlockFees::new();
    for input in tx.spending_inputs() {
        let outpoint = input.previous_out;
        let entry = view
            .lookup(&outpoint)
            .ok_or_else(|| LedgerError::invalid_tx(tx_hash, format!("output {} does not exist", outpoint)))?;
        if entry.is_spent() {
            return Err(LedgerError::invalid_tx(tx_hash, format!("output {} already spent", outpoint)));
        }
        if entry.is_coinbase() && coinbase_maturity > 0 {
            let origin = origin_height(&entry.block_hash()).ok_or_else(|| {
                LedgerError::invalid_tx(tx_hash, format!("origin block {} of {} unknown", entry.block_hash(), outpoint))
            })?;
            let depth = spend_height.saturating_sub(origin);
            if depth < coinbase_maturity {
                return Err(LedgerError::invalid_tx(
                    tx_hash,
                    format!("coinbase output {} spent at depth {} before maturity {}", outpoint, depth, coinbase_maturity),
                ));
            }
        }
        let amount = entry.amount();
        if !inputs.add(amount.coin, amount.value) {
            return Err(LedgerError::invalid_tx(tx_hash, "input value overflow"));
        }
    }

    if tx.is_token_mint() {
        if tx.outputs.iter().any(|o| o.amount.coin.is_primary()) {
            return Err(LedgerError::invalid_tx(tx_hash, "token mint pays out the primary coin"));
        }
        return Ok(fees);
    }

    let mut outputs = BlockFees::new();
    for output in &tx.outputs {
        if !outputs.add(output.amount.coin, output.amount.value) {
            return Err(LedgerError::invalid_tx(tx_hash, "output value overflow"));
        }
    }
    for (coin, out_value) in outputs.iter() {
        let in_value = inputs.get(coin);
        if out_value > in_value {
            return Err(LedgerError::invalid_tx(
                tx_hash,
                format!("{} outputs {} exceed inputs {}", coin, out_value, in_value),
            ));
        }
    }
    for (coin, in_value) in inputs.iter() {
        fees.add(coin, in_value - outputs.get(coin));
    }
    Ok(fees)
}

/// The coinbase may claim at most the subsidy plus the block's fees in the
/// primary coin, and at most the block's fees in every other coin.
pub fn check_coinbase_value(block: &Block, fees: &BlockFees, subsidy: u64) -> LedgerResult<()> {
    let hash = block.hash();
    let Some(coinbase) = block.transactions.first().filter(|tx| tx.is_coinbase()) else {
        return Err(LedgerError::InvalidBlock {
            hash,
            reason: "first transaction is not a coinbase".into(),
        });
    };

    let mut claimed = BlockFees::new();
    for output in &coinbase.outputs {
        if !claimed.add(output.amount.coin, output.amount.value) {
            return Err(LedgerError::InvalidBlock {
                hash,
                reason: "coinbase value overflow".into(),
            });
        }
    }
    for (coin, value) in claimed.iter() {
        let allowed = if coin.is_primary() {
            subsidy.saturating_add(fees.get(coin))
        } else {
            fees.get(coin)
        };
        if value > allowed {
            return Err(LedgerError::InvalidBlock {
                hash,
                reason: format!("coinbase claims {} of {}, allowed {}", value, coin, allowed),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utxo::UtxoEntry;
    use dagchain_types::{Amount, OutPoint, TxHash, TxIn, TxOut};

    fn funded_view(entries: &[(u8, Amount, bool)]) -> UtxoView {
        let mut view = UtxoView::new();
        for (n, amount, coinbase) in entries {
            view.add_entry(
                OutPoint::new(TxHash::new([*n; 32]), 0),
                UtxoEntry::new(*amount, vec![0x51], BlockHash::new([*n; 32]), *coinbase),
            );
        }
        view
    }

    fn spend(inputs: &[u8], outputs: Vec<Amount>) -> Transaction {
        Transaction {
            version: 1,
            kind: TxKind::Regular,
            inputs: inputs
                .iter()
                .map(|n| TxIn::new(OutPoint::new(TxHash::new([*n; 32]), 0)))
                .collect(),
            outputs: outputs.into_iter().map(|a| TxOut::new(a, vec![0x51])).collect(),
            lock_time: 0,
        }
    }

    fn no_heights(_: &BlockHash) -> Option<u64> {
        None
    }

    #[test]
    fn fee_is_input_minus_output() {
        let view = funded_view(&[(1, Amount::primary(100), false), (2, Amount::primary(50), false)]);
        let tx = spend(&[1, 2], vec![Amount::primary(140)]);
        let fees = check_transaction_inputs(&view, &tx, 5, 0, &no_heights).unwrap();
        assert_eq!(fees.get(CoinId::PRIMARY), 10);
    }

    #[test]
    fn overspend_is_rejected() {
        let view = funded_view(&[(1, Amount::primary(100), false)]);
        let tx = spend(&[1], vec![Amount::primary(101)]);
        let err = check_transaction_inputs(&view, &tx, 5, 0, &no_heights).unwrap_err();
        assert!(err.is_rule_violation());
    }

    #[test]
    fn missing_and_spent_inputs_are_rejected() {
        let mut view = funded_view(&[(1, Amount::primary(100), false)]);
        let missing = spend(&[9], vec![Amount::primary(1)]);
        assert!(check_transaction_inputs(&view, &missing, 5, 0, &no_heights).is_err());

        view.lookup_mut(&OutPoint::new(TxHash::new([1; 32]), 0)).unwrap().spend();
        let double = spend(&[1], vec![Amount::primary(1)]);
        assert!(check_transaction_inputs(&view, &double, 5, 0, &no_heights).is_err());
    }

    #[test]
    fn minting_primary_coin_from_token_is_rejected() {
        let view = funded_view(&[(1, Amount::new(100, CoinId(3)), false)]);
        let tx = spend(&[1], vec![Amount::primary(1)]);
        assert!(check_transaction_inputs(&view, &tx, 5, 0, &no_heights).is_err());
    }

    #[test]
    fn immature_coinbase_is_rejected() {
        let view = funded_view(&[(1, Amount::primary(100), true)]);
        let tx = spend(&[1], vec![Amount::primary(100)]);
        let heights = |_: &BlockHash| Some(10u64);
        assert!(check_transaction_inputs(&view, &tx, 12, 5, &heights).is_err());
        assert!(check_transaction_inputs(&view, &tx, 15, 5, &heights).is_ok());
    }

    #[test]
    fn coinbase_cap_includes_fees() {
        let coinbase = Transaction {
            version: 1,
            kind: TxKind::Coinbase,
            inputs: vec![TxIn::new(OutPoint::NULL)],
            outputs: vec![TxOut::new(Amount::primary(60), vec![0x51])],
            lock_time: 0,
        };
        let block = Block {
            header: dagchain_types::NetworkParams::regtest().genesis.header,
            transactions: vec![coinbase],
        };
        let mut fees = BlockFees::new();
        assert!(check_coinbase_value(&block, &fees, 50).is_err());
        fees.add(CoinId::PRIMARY, 10);
        assert!(check_coinbase_value(&block, &fees, 50).is_ok());
    }
}
