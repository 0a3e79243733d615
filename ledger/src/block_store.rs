//! Raw block bodies, keyed by hash.

use dagchain_store::{ReadTxn, WriteTxn};
use dagchain_types::{Block, BlockHash};

use crate::error::{LedgerError, LedgerResult};

/// Store `block` unless a body with its hash is already present. Returns
/// whether anything was written.
pub fn store_block<T: WriteTxn + ?Sized>(txn: &mut T, block: &Block) -> LedgerResult<bool> {
    let hash = block.hash();
    if txn.has_block(&hash)? {
        return Ok(false);
    }
    let bytes = block
        .to_bytes()
        .map_err(|e| LedgerError::Serialization(e.to_string()))?;
    txn.put_block(&hash, &bytes)?;
    Ok(true)
}

pub fn fetch_block<T: ReadTxn + ?Sized>(txn: &T, hash: &BlockHash) -> LedgerResult<Option<Block>> {
    match txn.get_block(hash)? {
        Some(bytes) => Block::from_bytes(&bytes)
            .map(Some)
            .map_err(|e| LedgerError::Serialization(e.to_string())),
        None => Ok(None),
    }
}
