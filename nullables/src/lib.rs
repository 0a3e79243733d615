//! Nullable infrastructure for deterministic testing.
//!
//! Every external collaborator of the engine (clock, storage, DAG oracle,
//! VM, indexes) sits behind a trait. This crate provides test-friendly
//! implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically
//! - Never touch the filesystem or network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod clock;
pub mod dag;
pub mod services;
pub mod store;

pub use clock::NullClock;
pub use dag::NullDag;
pub use services::{IndexCall, NullVm, RecordingIndexer};
pub use store::NullStore;
