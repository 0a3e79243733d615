//! Stateless and contextual block checks run before a block touches the DAG.

use std::collections::HashSet;

use dagchain_types::{easiest_target, Block, BlockHash, NetworkParams, Target, Timestamp, TxKind};

use crate::error::{RuleError, RuleErrorKind};

fn malformed(message: impl Into<String>) -> RuleError {
    RuleError::new(RuleErrorKind::BadStructure, message)
}

/// Structure and proof-of-work of a block, independent of any chain state.
pub fn check_block_sanity(block: &Block, params: &NetworkParams) -> Result<(), RuleError> {
    let parents = block.parents();
    if parents.is_empty() {
        return Err(malformed("block has no parents"));
    }
    if parents.len() > params.max_parents {
        return Err(malformed(format!(
            "block has {} parents, at most {} allowed",
            parents.len(),
            params.max_parents
        )));
    }
    let mut seen_parents = HashSet::with_capacity(parents.len());
    if !parents.iter().all(|p| seen_parents.insert(*p)) {
        return Err(malformed("duplicate parent"));
    }

    check_proof_of_work(&block.hash(), block.header.difficulty, params)?;

    let Some(first) = block.transactions.first() else {
        return Err(malformed("block has no transactions"));
    };
    if !first.is_coinbase() {
        return Err(malformed("first transaction is not a coinbase"));
    }
    if block.transactions.iter().skip(1).any(|tx| tx.is_coinbase()) {
        return Err(malformed("more than one coinbase"));
    }
    if Block::compute_tx_root(&block.transactions) != block.header.tx_root {
        return Err(malformed("transaction root mismatch"));
    }

    let size = block
        .serialized_size()
        .map_err(|e| malformed(e.to_string()))?;
    if size > params.max_block_size {
        return Err(malformed(format!(
            "block size {} exceeds {}",
            size, params.max_block_size
        )));
    }

    let mut seen_txs = HashSet::with_capacity(block.transactions.len());
    for tx in &block.transactions {
        let tx_hash = tx.hash();
        if !seen_txs.insert(tx_hash) {
            return Err(malformed(format!("duplicate transaction {}", tx_hash)));
        }
        if tx.inputs.is_empty() {
            return Err(malformed(format!("transaction {} has no inputs", tx_hash)));
        }
        let needs_outputs = !matches!(tx.kind, TxKind::TokenTransfer | TxKind::CrossChainVm);
        if needs_outputs && tx.outputs.is_empty() {
            return Err(malformed(format!("transaction {} has no outputs", tx_hash)));
        }
        if tx.is_coinbase() && (tx.inputs.len() != 1 || !tx.inputs[0].previous_out.is_null()) {
            return Err(malformed("coinbase must have a single null input"));
        }

        let mut seen_inputs = HashSet::with_capacity(tx.inputs.len());
        for input in tx.spending_inputs() {
            if input.previous_out.is_null() {
                return Err(malformed(format!("transaction {} spends a null outpoint", tx_hash)));
            }
            if !seen_inputs.insert(input.previous_out) {
                return Err(malformed(format!(
                    "transaction {} spends {} twice",
                    tx_hash, input.previous_out
                )));
            }
        }
    }
    Ok(())
}

/// The hash must meet the target encoded in `bits`, which may not be easier
/// than the network's proof-of-work limit.
pub fn check_proof_of_work(hash: &BlockHash, bits: u32, params: &NetworkParams) -> Result<(), RuleError> {
    let target = Target::from_compact(bits)
        .map_err(|e| RuleError::new(RuleErrorKind::BadProofOfWork, e.to_string()))?;
    if target.as_bytes().iter().all(|b| *b == 0) {
        return Err(RuleError::new(RuleErrorKind::BadProofOfWork, "target is zero"));
    }
    if target > params.pow_limit() {
        return Err(RuleError::new(
            RuleErrorKind::BadProofOfWork,
            format!("target {:?} is above the limit {:?}", target, params.pow_limit()),
        ));
    }
    if !target.is_met_by(hash) {
        return Err(RuleError::new(
            RuleErrorKind::BadProofOfWork,
            format!("hash {} is above target {:?}", hash, target),
        ));
    }
    Ok(())
}

/// Checks against the latest checkpoint the DAG already holds.
///
/// A block may not be older than that checkpoint, and its target may not be
/// easier than what the retarget rules allow for the time elapsed since it.
pub fn check_checkpoints(
    block: &Block,
    params: &NetworkParams,
    is_known: impl Fn(&BlockHash) -> bool,
) -> Result<(), RuleError> {
    let Some(checkpoint) = params.checkpoints.iter().rev().find(|cp| is_known(&cp.hash)) else {
        return Ok(());
    };

    let timestamp = block.timestamp();
    if timestamp < checkpoint.timestamp {
        return Err(RuleError::new(
            RuleErrorKind::CheckpointTimeTooOld,
            format!(
                "block timestamp {} is before checkpoint {} at {}",
                timestamp, checkpoint.hash, checkpoint.timestamp
            ),
        ));
    }

    let (Ok(target), Ok(start)) = (
        Target::from_compact(block.header.difficulty),
        Target::from_compact(checkpoint.difficulty),
    ) else {
        return Err(RuleError::new(
            RuleErrorKind::DifficultyTooLow,
            "undecodable difficulty",
        ));
    };
    let easiest = easiest_target(
        start,
        timestamp.as_secs() - checkpoint.timestamp.as_secs(),
        params.max_retarget_timespan_secs(),
        params.retarget_adjustment_factor,
        params.pow_limit(),
    );
    if target > easiest {
        return Err(RuleError::new(
            RuleErrorKind::DifficultyTooLow,
            format!(
                "target {:?} is easier than {:?} allowed since checkpoint {}",
                target, easiest, checkpoint.hash
            ),
        ));
    }
    Ok(())
}

/// Timestamp checks against the main parent's past median time and the
/// local clock.
pub fn check_block_context(
    block: &Block,
    past_median: Timestamp,
    now: Timestamp,
    params: &NetworkParams,
) -> Result<(), RuleError> {
    let timestamp = block.timestamp();
    if timestamp <= past_median {
        return Err(RuleError::new(
            RuleErrorKind::BadTimestamp,
            format!(
                "timestamp {} is not after the past median time {}",
                timestamp, past_median
            ),
        ));
    }
    let limit = now.as_secs().saturating_add(params.max_future_block_secs);
    if timestamp.as_secs() > limit {
        return Err(RuleError::new(
            RuleErrorKind::BadTimestamp,
            format!("timestamp {} is too far in the future", timestamp),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagchain_types::{Amount, BlockHeader, Checkpoint, OutPoint, Transaction, TxHash, TxIn, TxOut};

    fn params() -> NetworkParams {
        NetworkParams::regtest()
    }

    fn coinbase(tag: u8) -> Transaction {
        Transaction {
            version: 1,
            kind: TxKind::Coinbase,
            inputs: vec![TxIn::new(OutPoint::NULL)],
            outputs: vec![TxOut::new(Amount::primary(50), vec![0x51, tag])],
            lock_time: 0,
        }
    }

    fn mined(parents: Vec<BlockHash>, transactions: Vec<Transaction>, timestamp: u64) -> Block {
        let limit = params().pow_limit();
        let mut block = Block {
            header: BlockHeader {
                version: 1,
                parents,
                tx_root: Block::compute_tx_root(&transactions),
                timestamp: Timestamp::new(timestamp),
                difficulty: params().pow_limit_bits,
                nonce: 0,
            },
            transactions,
        };
        while !limit.is_met_by(&block.hash()) {
            block.header.nonce += 1;
        }
        block
    }

    fn genesis() -> BlockHash {
        params().genesis_hash()
    }

    #[test]
    fn well_formed_block_passes() {
        let block = mined(vec![genesis()], vec![coinbase(1)], 1_600_000_100);
        check_block_sanity(&block, &params()).unwrap();
    }

    #[test]
    fn structural_defects_are_malformed() {
        let cases = vec![
            mined(Vec::new(), vec![coinbase(1)], 1),
            mined(vec![genesis(), genesis()], vec![coinbase(2)], 1),
            mined(vec![genesis()], Vec::new(), 1),
            mined(vec![genesis()], vec![coinbase(3), coinbase(4)], 1),
        ];
        for block in cases {
            let err = check_block_sanity(&block, &params()).unwrap_err();
            assert_eq!(err.kind, RuleErrorKind::BadStructure, "{}", err);
        }
    }

    #[test]
    fn tx_root_mismatch_is_malformed() {
        let mut block = mined(vec![genesis()], vec![coinbase(1)], 1);
        // the header commits to the root, so the hash and its proof of work stay valid
        block.transactions[0].lock_time = 9;
        let err = check_block_sanity(&block, &params()).unwrap_err();
        assert_eq!(err.kind, RuleErrorKind::BadStructure);
    }

    #[test]
    fn double_input_in_one_transaction_is_malformed() {
        let outpoint = OutPoint::new(TxHash::new([5; 32]), 0);
        let spend = Transaction {
            version: 1,
            kind: TxKind::Regular,
            inputs: vec![TxIn::new(outpoint), TxIn::new(outpoint)],
            outputs: vec![TxOut::new(Amount::primary(1), vec![0x51])],
            lock_time: 0,
        };
        let block = mined(vec![genesis()], vec![coinbase(1), spend], 1);
        let err = check_block_sanity(&block, &params()).unwrap_err();
        assert_eq!(err.kind, RuleErrorKind::BadStructure);
    }

    #[test]
    fn hash_above_target_is_bad_pow() {
        let mut block = mined(vec![genesis()], vec![coinbase(1)], 1);
        while params().pow_limit().is_met_by(&block.hash()) {
            block.header.nonce += 1;
        }
        let err = check_block_sanity(&block, &params()).unwrap_err();
        assert_eq!(err.kind, RuleErrorKind::BadProofOfWork);
    }

    #[test]
    fn target_above_limit_is_bad_pow() {
        let err = check_proof_of_work(&BlockHash::ZERO, 0x2100ffff, &params()).unwrap_err();
        assert_eq!(err.kind, RuleErrorKind::BadProofOfWork);
    }

    #[test]
    fn checkpoints_only_apply_once_known() {
        let mut params = params();
        let checkpoint = BlockHash::new([8; 32]);
        params.checkpoints.push(Checkpoint {
            hash: checkpoint,
            timestamp: Timestamp::new(1_000),
            difficulty: 0x1d00ffff,
        });
        let old = mined(vec![genesis()], vec![coinbase(1)], 500);

        check_checkpoints(&old, &params, |_| false).unwrap();
        let err = check_checkpoints(&old, &params, |h| *h == checkpoint).unwrap_err();
        assert_eq!(err.kind, RuleErrorKind::CheckpointTimeTooOld);
    }

    #[test]
    fn target_easier_than_allowed_is_too_low() {
        let mut params = params();
        let checkpoint = BlockHash::new([8; 32]);
        params.checkpoints.push(Checkpoint {
            hash: checkpoint,
            timestamp: Timestamp::new(1_000),
            difficulty: 0x1d00ffff,
        });
        // right after the checkpoint the target cannot have loosened at all
        let block = mined(vec![genesis()], vec![coinbase(1)], 1_000);
        let err = check_checkpoints(&block, &params, |h| *h == checkpoint).unwrap_err();
        assert_eq!(err.kind, RuleErrorKind::DifficultyTooLow);

        // long after it, the limit itself is allowed
        let late = mined(vec![genesis()], vec![coinbase(1)], 1_000_000_000);
        check_checkpoints(&late, &params, |h| *h == checkpoint).unwrap();
    }

    #[test]
    fn context_rejects_stale_and_future_timestamps() {
        let params = params();
        let block = mined(vec![genesis()], vec![coinbase(1)], 1_000);
        let now = Timestamp::new(1_000);

        check_block_context(&block, Timestamp::new(999), now, &params).unwrap();
        let stale = check_block_context(&block, Timestamp::new(1_000), now, &params).unwrap_err();
        assert_eq!(stale.kind, RuleErrorKind::BadTimestamp);

        let future = mined(vec![genesis()], vec![coinbase(1)], 1_000 + params.max_future_block_secs + 1);
        let err = check_block_context(&future, Timestamp::new(0), now, &params).unwrap_err();
        assert_eq!(err.kind, RuleErrorKind::BadTimestamp);
    }
}
