//! Token-state tip tracking.
//!
//! Connecting a block that carries token transactions makes it the token
//! tip. The previous tip is recorded under the block's hash so a disconnect
//! can put it back.

use dagchain_store::meta_keys::{TOKEN_TIP, TOKEN_UNDO_PREFIX};
use dagchain_store::{ReadTxn, WriteTxn};
use dagchain_types::{Block, BlockHash};

use crate::error::{LedgerError, LedgerResult};

fn undo_key(hash: &BlockHash) -> String {
    format!("{}{}", TOKEN_UNDO_PREFIX, hash.to_hex())
}

fn decode_hash(bytes: &[u8]) -> LedgerResult<BlockHash> {
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| LedgerError::Serialization(format!("token tip of {} bytes", bytes.len())))?;
    Ok(BlockHash::new(array))
}

/// Current token tip, zero when no token transaction was ever connected.
pub fn token_tip<T: ReadTxn + ?Sized>(txn: &T) -> LedgerResult<BlockHash> {
    match txn.get_meta(TOKEN_TIP)? {
        Some(bytes) => decode_hash(&bytes),
        None => Ok(BlockHash::ZERO),
    }
}

/// Advance the token tip to `block` if it carries token transactions.
pub fn connect_token_state<T: WriteTxn + ?Sized>(txn: &mut T, block: &Block) -> LedgerResult<()> {
    if !block.transactions.iter().any(|tx| tx.is_token()) {
        return Ok(());
    }
    let hash = block.hash();
    let previous = token_tip(txn)?;
    txn.put_meta(&undo_key(&hash), previous.as_bytes())?;
    txn.put_meta(TOKEN_TIP, hash.as_bytes())?;
    Ok(())
}

/// Undo [`connect_token_state`] for `block`.
pub fn disconnect_token_state<T: WriteTxn + ?Sized>(txn: &mut T, block: &Block) -> LedgerResult<()> {
    let key = undo_key(&block.hash());
    let Some(bytes) = txn.get_meta(&key)? else {
        return Ok(());
    };
    let previous = decode_hash(&bytes)?;
    if previous.is_zero() {
        txn.delete_meta(TOKEN_TIP)?;
    } else {
        txn.put_meta(TOKEN_TIP, previous.as_bytes())?;
    }
    txn.delete_meta(&key)?;
    Ok(())
}
