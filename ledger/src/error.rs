use thiserror::Error;

use dagchain_types::{BlockHash, TxHash};

#[derive(Debug, Error)]
pub enum LedgerError {
    /// An invariant of correctly ordered input does not hold. The persisted
    /// state can no longer be trusted.
    #[error("assertion failed: {0}")]
    AssertionFailure(String),

    #[error("invalid transaction {tx}: {reason}")]
    InvalidTransaction { tx: TxHash, reason: String },

    #[error("invalid block {hash}: {reason}")]
    InvalidBlock { hash: BlockHash, reason: String },

    #[error("block {0} not found in the block store")]
    MissingBlock(BlockHash),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(#[from] dagchain_store::StoreError),
}

impl LedgerError {
    /// Whether the error comes from the content of a block rather than from
    /// broken internal state.
    pub fn is_rule_violation(&self) -> bool {
        matches!(
            self,
            LedgerError::InvalidTransaction { .. } | LedgerError::InvalidBlock { .. }
        )
    }

    pub(crate) fn invalid_tx(tx: TxHash, reason: impl Into<String>) -> Self {
        LedgerError::InvalidTransaction {
            tx,
            reason: reason.into(),
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

pub(crate) fn encode<T: serde::Serialize>(value: &T) -> LedgerResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| LedgerError::Serialization(e.to_string()))
}

pub(crate) fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> LedgerResult<T> {
    bincode::deserialize(bytes).map_err(|e| LedgerError::Serialization(e.to_string()))
}
