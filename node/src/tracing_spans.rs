//! Pre-built [`tracing::Span`] constructors for the admission pipeline.
//!
//! Using consistent span names and field sets makes it easy to filter and
//! correlate traces of one block across validation, connect and reorg.

use tracing::{debug_span, info_span, Span};

use dagchain_types::BlockHash;

/// Span covering the full processing of a single submitted block.
pub fn block_process_span(hash: &BlockHash) -> Span {
    info_span!("block_process", hash = %hash)
}

/// Span covering the connect or disconnect of one ordered block.
pub fn block_connect_span(hash: &BlockHash, order: Option<u64>) -> Span {
    debug_span!("block_connect", hash = %hash, order = ?order)
}

/// Span covering a reorganization of the order.
pub fn reorg_span(detached: usize, attached: usize) -> Span {
    info_span!("reorg", detached, attached)
}
