//! Abstract storage traits for the dagchain ledger.
//!
//! Every storage backend (LMDB, in-memory for testing) implements these
//! traits. The rest of the codebase depends only on the traits. Values are
//! opaque bytes; encoding belongs to the crates that own the record types.

pub mod database;
pub mod error;
pub mod txn;

pub use database::{Database, DatabaseExt};
pub use error::StoreError;
pub use txn::{ReadTxn, WriteTxn};

/// Well-known keys in the metadata table.
pub mod meta_keys {
    /// Serialized best-state record of the chain.
    pub const BEST_STATE: &str = "best_state";
    /// Hash of the block that last changed token state.
    pub const TOKEN_TIP: &str = "token_tip";
    /// Prefix of the per-block token-state undo records.
    pub const TOKEN_UNDO_PREFIX: &str = "token_tip/";
}
