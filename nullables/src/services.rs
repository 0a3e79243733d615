//! Nullable VM and index services that record what the engine asked of them.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use dagchain_consensus::{ConsensusError, IndexManager, VmBlockId, VmService};
use dagchain_types::{Block, BlockHash, DagNode};

/// VM that hands out increasing side-chain ids and logs every call.
#[derive(Default)]
pub struct NullVm {
    next_id: AtomicU64,
    connected: Mutex<Vec<BlockHash>>,
    disconnected: Mutex<Vec<BlockHash>>,
    fail: AtomicBool,
}

impl NullVm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn connected(&self) -> Vec<BlockHash> {
        self.connected.lock().clone()
    }

    pub fn disconnected(&self) -> Vec<BlockHash> {
        self.disconnected.lock().clone()
    }

    fn check(&self) -> Result<(), ConsensusError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ConsensusError::Vm("injected VM failure".into()));
        }
        Ok(())
    }
}

impl VmService for NullVm {
    fn connect_block(&self, block: &Block) -> Result<VmBlockId, ConsensusError> {
        self.check()?;
        self.connected.lock().push(block.hash());
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn disconnect_block(&self, block: &Block) -> Result<VmBlockId, ConsensusError> {
        self.check()?;
        self.disconnected.lock().push(block.hash());
        Ok(self.next_id.load(Ordering::SeqCst))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexCall {
    Connect {
        hash: BlockHash,
        spent_scripts: usize,
        vm_block: VmBlockId,
    },
    Disconnect {
        hash: BlockHash,
        spent_scripts: usize,
    },
    MainTip {
        hash: BlockHash,
        order: u64,
    },
}

/// Index manager that keeps a log of its calls.
#[derive(Default)]
pub struct RecordingIndexer {
    calls: Mutex<Vec<IndexCall>>,
}

impl RecordingIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<IndexCall> {
        self.calls.lock().clone()
    }
}

impl IndexManager for RecordingIndexer {
    fn connect_block(
        &self,
        block: &Block,
        spent_scripts: &[Vec<u8>],
        _node: &DagNode,
        vm_block: VmBlockId,
    ) -> Result<(), ConsensusError> {
        self.calls.lock().push(IndexCall::Connect {
            hash: block.hash(),
            spent_scripts: spent_scripts.len(),
            vm_block,
        });
        Ok(())
    }

    fn disconnect_block(
        &self,
        block: &Block,
        spent_scripts: &[Vec<u8>],
        _node: &DagNode,
        _vm_block: VmBlockId,
    ) -> Result<(), ConsensusError> {
        self.calls.lock().push(IndexCall::Disconnect {
            hash: block.hash(),
            spent_scripts: spent_scripts.len(),
        });
        Ok(())
    }

    fn update_main_tip(&self, hash: &BlockHash, order: u64) -> Result<(), ConsensusError> {
        self.calls.lock().push(IndexCall::MainTip { hash: *hash, order });
        Ok(())
    }
}
