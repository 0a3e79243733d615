use thiserror::Error;

use dagchain_types::BlockHash;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("block {0} unknown to the DAG")]
    UnknownBlock(BlockHash),

    #[error("DAG oracle failure: {0}")]
    Oracle(String),

    #[error("VM service failure: {0}")]
    Vm(String),

    #[error("index failure: {0}")]
    Index(String),

    #[error("script check failed for input {input}: {reason}")]
    Script { input: usize, reason: String },
}
