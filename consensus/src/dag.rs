//! The DAG ordering oracle contract.
//!
//! The oracle owns topology: it assigns [`BlockId`]s, linearizes the DAG and
//! picks the main chain. Its answers are authoritative; the engine applies
//! ledger effects in whatever order it reports and never second-guesses fork
//! choice.

use dagchain_types::{Block, BlockHash, BlockId, DagNode, GraphState};

use crate::ConsensusError;

/// What changed in the order when a block was added.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddedBlock {
    /// Handle of the block just added.
    pub node: DagNode,
    /// Blocks that received an order slot, oldest first. May name blocks
    /// that are still unordered; those carry no ledger effects yet.
    pub newly_ordered: Vec<BlockId>,
    /// Blocks that lost their order slot, in their former order, oldest
    /// first. Non-empty only when the main chain was reorganized.
    pub removed_from_order: Vec<BlockId>,
    /// Whether the main-chain tip moved.
    pub tip_changed: bool,
}

impl AddedBlock {
    pub fn is_reorg(&self) -> bool {
        !self.removed_from_order.is_empty()
    }
}

pub trait BlockDag: Send + Sync {
    fn has_block(&self, hash: &BlockHash) -> bool;

    /// Insert a block whose parents are all present. An error leaves the
    /// oracle unusable and is treated as fatal by the engine.
    fn add_block(&mut self, block: &Block) -> Result<AddedBlock, ConsensusError>;

    fn mark_valid(&mut self, id: BlockId);

    fn mark_invalid(&mut self, id: BlockId);

    fn main_chain_tip(&self) -> DagNode;

    fn is_on_main_chain(&self, id: BlockId) -> bool;

    /// Main parent a block with these parents would get, if all are known.
    fn main_parent(&self, parents: &[BlockHash]) -> Option<DagNode>;

    fn node(&self, hash: &BlockHash) -> Option<DagNode>;

    fn node_by_id(&self, id: BlockId) -> Option<DagNode>;

    fn hash_by_order(&self, order: u64) -> Option<BlockHash>;

    /// Number of blocks in the DAG, including invalid and unordered ones.
    fn block_count(&self) -> usize;

    /// Recompute the fork-choice weight of a block after its effects were
    /// applied.
    fn update_weight(&mut self, id: BlockId);

    fn graph_state(&self) -> GraphState;

    /// Whether `parents` are still acceptable tips for a locally produced
    /// block.
    fn check_sub_main_chain_tip(&self, parents: &[BlockHash]) -> Result<(), ConsensusError>;

    /// Flush whatever the oracle buffered during the last admission.
    fn commit(&mut self) -> Result<(), ConsensusError>;
}
