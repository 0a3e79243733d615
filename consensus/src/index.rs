//! Optional secondary indexes.

use dagchain_types::{Block, BlockHash, DagNode};

use crate::{ConsensusError, VmBlockId};

/// Receives every connected and disconnected block together with the
/// locking scripts of the outputs it spent, in spend-journal order.
pub trait IndexManager: Send + Sync {
    fn connect_block(
        &self,
        block: &Block,
        spent_scripts: &[Vec<u8>],
        node: &DagNode,
        vm_block: VmBlockId,
    ) -> Result<(), ConsensusError>;

    fn disconnect_block(
        &self,
        block: &Block,
        spent_scripts: &[Vec<u8>],
        node: &DagNode,
        vm_block: VmBlockId,
    ) -> Result<(), ConsensusError>;

    fn update_main_tip(&self, hash: &BlockHash, order: u64) -> Result<(), ConsensusError>;
}
