//! dagchain admission engine: turns received blocks into ledger state.
//!
//! The chain is the central coordinator that:
//! - Sanity- and context-checks incoming blocks
//! - Parks blocks with missing parents until they can be placed
//! - Asks the DAG oracle where each block belongs in the order
//! - Applies, or reorganizes, the UTXO set along that order
//! - Publishes the best state and notifies subscribers

pub mod best_state;
pub mod block_processor;
pub mod chain;
pub mod chain_event;
pub mod config;
pub mod connector;
pub mod error;
pub mod flags;
pub mod import;
pub mod logging;
pub mod metrics;
pub mod orphans;
pub mod pruning;
pub mod sanity;
pub mod shutdown;
pub mod tracing_spans;

pub use best_state::calc_past_median_time;
pub use chain::{BlockChain, ChainServices};
pub use chain_event::{ChainEvent, EventBus};
pub use config::ChainConfig;
pub use error::{ChainError, RuleError, RuleErrorKind};
pub use flags::BehaviorFlags;
pub use import::{ExportOrder, IBD_FILE_NAME};
pub use logging::{init_logging, LogFormat};
pub use metrics::ChainMetrics;
pub use orphans::{OrphanEntry, OrphanPool};
pub use pruning::Pruner;
pub use shutdown::{CommitGateError, ShutdownController};
