//! Best-state snapshots: the summary of the chain after each admission.
//!
//! A snapshot is never mutated once built; the chain publishes a new one
//! wholesale. The persisted record pairs it with the cumulative work of the
//! main chain.

use serde::{Deserialize, Serialize};

use dagchain_store::meta_keys::BEST_STATE;
use dagchain_store::{ReadTxn, WriteTxn};
use dagchain_types::{BlockHash, GraphState, Timestamp};

use crate::error::{decode, encode, LedgerResult};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestState {
    /// Main-chain tip reported by the DAG oracle.
    pub hash: BlockHash,
    /// Compact difficulty of the tip.
    pub difficulty: u32,
    /// Serialized size of the most recently admitted block.
    pub block_size: u64,
    /// Transactions in the most recently admitted block.
    pub num_txns: u64,
    /// Transactions admitted since genesis.
    pub total_txns: u64,
    /// Past median time of the tip.
    pub median_time: Timestamp,
    /// Fork-choice weight of the tip.
    pub weight: u64,
    pub graph_state: GraphState,
    /// Block that last changed token state, zero if none has.
    pub token_tip: BlockHash,
}

impl BestState {
    /// Main-chain order of the tip.
    pub fn main_order(&self) -> u64 {
        self.graph_state.main_order
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestStateRecord {
    pub state: BestState,
    /// Cumulative proof-of-work along the main chain.
    pub work_sum: u128,
}

pub fn put_best_state<T: WriteTxn + ?Sized>(txn: &mut T, record: &BestStateRecord) -> LedgerResult<()> {
    txn.put_meta(BEST_STATE, &encode(record)?)?;
    Ok(())
}

pub fn fetch_best_state<T: ReadTxn + ?Sized>(txn: &T) -> LedgerResult<Option<BestStateRecord>> {
    match txn.get_meta(BEST_STATE)? {
        Some(bytes) => decode(&bytes).map(Some),
        None => Ok(None),
    }
}
