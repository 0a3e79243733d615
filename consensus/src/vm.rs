//! Side-chain VM service.

use dagchain_types::Block;

use crate::ConsensusError;

/// Identifier the VM assigns to the side-chain block it derived from a
/// ledger block.
pub type VmBlockId = u64;

/// VM id passed to indexers for blocks whose effects were not applied.
pub const NULL_VM_BLOCK: VmBlockId = 0;

/// Executes the VM transactions of connected blocks and rolls them back on
/// disconnect. Only called for blocks that are not known invalid.
pub trait VmService: Send + Sync {
    fn connect_block(&self, block: &Block) -> Result<VmBlockId, ConsensusError>;

    fn disconnect_block(&self, block: &Block) -> Result<VmBlockId, ConsensusError>;
}
