//! Fundamental types for the dagchain ledger.
//!
//! This crate defines the core types shared across every other crate in the workspace:
//! hashes, outpoints, amounts, blocks and transactions, compact difficulty targets,
//! DAG node handles, network parameters, and timestamps.

pub mod amount;
pub mod block;
pub mod dag;
pub mod error;
pub mod hash;
pub mod network;
pub mod params;
pub mod pow;
pub mod time;
pub mod transaction;

pub use amount::{Amount, CoinId};
pub use block::{Block, BlockHash, BlockHeader};
pub use dag::{BlockId, BlockStatus, DagNode, GraphState};
pub use error::TypesError;
pub use hash::{blake2b_256, TxHash};
pub use network::NetworkId;
pub use params::{Checkpoint, NetworkParams};
pub use pow::{calc_work, easiest_target, Target};
pub use time::{Clock, SystemClock, Timestamp};
pub use transaction::{OutPoint, Transaction, TxIn, TxKind, TxOut, OP_RETURN};
