//! Consensus collaborators of the admission engine.
//!
//! The engine never decides topology or fork choice itself. It drives a
//! DAG ordering oracle and a handful of optional services through the
//! traits in this crate:
//!
//! - [`dag`]: the ordering oracle ([`BlockDag`]) and what it reports per
//!   added block ([`AddedBlock`]).
//! - [`vm`]: the side-chain VM that sees every valid connect/disconnect.
//! - [`index`]: optional indexes fed with connected blocks and main-tip moves.
//! - [`script`]: the seam where script/signature checking plugs in.
//! - [`error`]: errors these collaborators report.

pub mod dag;
pub mod error;
pub mod index;
pub mod script;
pub mod vm;

pub use dag::{AddedBlock, BlockDag};
pub use error::ConsensusError;
pub use index::IndexManager;
pub use script::ScriptVerifier;
pub use vm::{VmBlockId, VmService, NULL_VM_BLOCK};
