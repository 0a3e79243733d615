//! Consensus metadata the DAG ordering oracle keeps per block.
//!
//! Blocks refer to each other only through [`BlockId`]s handed out by the
//! oracle; nothing outside the oracle ever assigns one.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::block::BlockHash;
use crate::time::Timestamp;

/// Dense integer identifier assigned once per block, in arrival order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Consensus validity of a block already in the DAG.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockStatus {
    #[default]
    Unknown,
    Valid,
    /// Present and ordered, but its transactions have no ledger effects.
    Invalid,
}

/// Snapshot of one DAG node as reported by the oracle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagNode {
    pub id: BlockId,
    pub hash: BlockHash,
    pub parents: Vec<BlockId>,
    pub main_parent: Option<BlockId>,
    /// Position in the linear order; `None` until the block is ordered.
    pub order: Option<u64>,
    /// Number of main-parent hops to genesis.
    pub height: u64,
    pub layer: u64,
    pub status: BlockStatus,
    pub weight: u64,
    pub timestamp: Timestamp,
    pub difficulty: u32,
}

impl DagNode {
    pub fn is_ordered(&self) -> bool {
        self.order.is_some()
    }

    pub fn is_invalid(&self) -> bool {
        self.status == BlockStatus::Invalid
    }
}

/// Compact descriptor of DAG progress exchanged with peers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphState {
    pub tips: Vec<BlockHash>,
    pub main_order: u64,
    pub main_height: u64,
    pub layer: u64,
}
