//! LMDB storage backend for the dagchain ledger.
//!
//! Implements the transactional traits from `dagchain-store` using the `heed`
//! LMDB bindings. Each table maps to one named LMDB database within a single
//! environment, so one block's effects across all tables commit in a single
//! write transaction.

pub mod environment;
pub mod error;
pub mod integrity;
pub mod read_txn;
pub mod write_batch;

pub use environment::LmdbEnvironment;
pub use error::LmdbError;
pub use integrity::{check_integrity, IntegrityReport};
pub use read_txn::ReadSnapshot;
pub use write_batch::WriteBatch;
