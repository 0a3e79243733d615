//! UTXO state of the DAG ledger.
//!
//! Blocks are applied to the unspent-output set in the linear order chosen by
//! the DAG oracle. Everything needed to apply a block, and to reverse it
//! exactly during a reorganization, lives here:
//! - [`UtxoView`]: an in-memory overlay of the entries one operation touches
//! - [`SpentTxOut`]: the per-block spend journal that makes spends reversible
//! - [`connect_transactions`] / [`disconnect_transactions`]
//! - input validation and fee accounting
//! - the persisted [`BestState`] record and token-tip bookkeeping

pub mod apply;
pub mod block_store;
pub mod error;
pub mod journal;
pub mod snapshot;
pub mod token;
pub mod utxo;
pub mod validation;

pub use apply::{connect_transaction, connect_transactions, disconnect_transactions};
pub use block_store::{fetch_block, store_block};
pub use error::{LedgerError, LedgerResult};
pub use journal::{
    block_fee_by_coin, count_spent_outputs, fetch_spend_journal, put_spend_journal,
    remove_spend_journal, SpentTxOut,
};
pub use snapshot::{fetch_best_state, put_best_state, BestState, BestStateRecord};
pub use token::{connect_token_state, disconnect_token_state, token_tip};
pub use utxo::{put_utxo_view, utxo_set_digest, UtxoEntry, UtxoView};
pub use validation::{check_coinbase_value, check_transaction_inputs, BlockFees};
