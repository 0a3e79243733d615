//! Script verification seam.

use dagchain_types::{Amount, Transaction};

use crate::ConsensusError;

/// Checks that input `input_index` of `tx` may spend an output locked by
/// `pk_script`. Implementations must be callable from several threads at
/// once; the engine verifies the inputs of a block in parallel.
pub trait ScriptVerifier: Send + Sync {
    fn verify(
        &self,
        tx: &Transaction,
        input_index: usize,
        pk_script: &[u8],
        amount: Amount,
    ) -> Result<(), ConsensusError>;
}
