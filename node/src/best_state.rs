//! Recomputing and publishing the best state after an admission.

use std::collections::HashMap;
use std::sync::Arc;

use dagchain_consensus::{AddedBlock, BlockDag};
use dagchain_ledger::{put_best_state, token_tip, BestState, BestStateRecord, LedgerError};
use dagchain_store::{DatabaseExt, WriteTxn};
use dagchain_types::{calc_work, Block, BlockId, DagNode, Timestamp};

use crate::chain::{BlockChain, ChainState};
use crate::ChainError;

/// Median timestamp of `node` and its main-chain ancestors, over at most
/// `window` blocks.
pub fn calc_past_median_time(dag: &dyn BlockDag, node: &DagNode, window: usize) -> Timestamp {
    let mut timestamps = Vec::with_capacity(window);
    let mut cursor = Some(node.clone());
    while let Some(current) = cursor {
        if timestamps.len() >= window.max(1) {
            break;
        }
        timestamps.push(current.timestamp);
        cursor = current.main_parent.and_then(|id| dag.node_by_id(id));
    }
    timestamps.sort_unstable();
    timestamps
        .get(timestamps.len() / 2)
        .copied()
        .unwrap_or(node.timestamp)
}

/// Cumulative work of `node` and its main-parent ancestry.
///
/// Walks main parents until a block with known work (or genesis), then
/// records the running sum of every block walked, so repeated calls along
/// the same chain are cheap and a switch to another branch only pays for
/// the part not seen before.
pub(crate) fn chain_work(dag: &dyn BlockDag, known: &mut HashMap<BlockId, u128>, node: &DagNode) -> u128 {
    let mut walked = Vec::new();
    let mut base = 0u128;
    let mut cursor = Some(node.clone());
    while let Some(current) = cursor {
        if let Some(work) = known.get(&current.id) {
            base = *work;
            break;
        }
        cursor = current.main_parent.and_then(|id| dag.node_by_id(id));
        walked.push(current);
    }

    let mut total = base;
    for block in walked.iter().rev() {
        total = total.saturating_add(calc_work(block.difficulty));
        known.insert(block.id, total);
    }
    total
}

impl BlockChain {
    /// Persist and publish the state after `block` was admitted.
    ///
    /// The record is written before the in-memory snapshot is swapped, and
    /// the oracle commits last.
    pub(crate) fn update_best_state(
        &self,
        state: &mut ChainState,
        block: &Block,
        added: &AddedBlock,
    ) -> Result<Arc<BestState>, ChainError> {
        for id in &added.newly_ordered {
            state.dag.update_weight(*id);
        }

        let num_txns = block.transactions.len() as u64;
        let block_size = block
            .serialized_size()
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;
        let tip = state.dag.main_chain_tip();
        let median_time = calc_past_median_time(state.dag.as_ref(), &tip, self.params.median_time_blocks);
        let graph_state = state.dag.graph_state();
        let previous = self.best_snapshot();

        let work_sum = chain_work(state.dag.as_ref(), &mut state.chain_work, &tip);

        let best = self.db.update(|txn: &mut dyn WriteTxn| {
            let record = BestStateRecord {
                state: BestState {
                    hash: tip.hash,
                    difficulty: tip.difficulty,
                    block_size,
                    num_txns,
                    total_txns: previous.total_txns + num_txns,
                    median_time,
                    weight: tip.weight,
                    graph_state,
                    token_tip: token_tip(&*txn)?,
                },
                work_sum,
            };
            put_best_state(txn, &record)?;
            Ok::<_, ChainError>(Arc::new(record.state))
        })?;
        state.work_sum = work_sum;

        if let Some(indexer) = &self.services.indexer {
            indexer.update_main_tip(&tip.hash, tip.order.unwrap_or(0))?;
        }

        *self.best.write() = Arc::clone(&best);
        state.dag.commit()?;

        tracing::debug!(
            tip = %best.hash,
            order = best.main_order(),
            total_txns = best.total_txns,
            "published best state"
        );
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagchain_nullables::NullDag;
    use dagchain_types::{BlockHash, BlockHeader, Transaction};

    fn block(parents: Vec<BlockHash>, timestamp: u64) -> Block {
        let transactions: Vec<Transaction> = Vec::new();
        Block {
            header: BlockHeader {
                version: 1,
                parents,
                tx_root: Block::compute_tx_root(&transactions),
                timestamp: Timestamp::new(timestamp),
                difficulty: 0x207fffff,
                nonce: timestamp,
            },
            transactions,
        }
    }

    #[test]
    fn median_of_the_main_chain_window() {
        let mut dag = NullDag::new();
        let mut parent = block(Vec::new(), 100);
        dag.add_block(&parent).unwrap();
        // timestamps out of order: 100, 300, 200, 500, 400
        for ts in [300, 200, 500, 400] {
            let next = block(vec![parent.hash()], ts);
            dag.add_block(&next).unwrap();
            parent = next;
        }
        let tip = dag.main_chain_tip();
        assert_eq!(calc_past_median_time(&dag, &tip, 11), Timestamp::new(300));
        // last three only: 500, 400 and 200
        assert_eq!(calc_past_median_time(&dag, &tip, 3), Timestamp::new(400));
    }

    fn mined_with(parents: Vec<BlockHash>, timestamp: u64, difficulty: u32) -> Block {
        let mut b = block(parents, timestamp);
        b.header.difficulty = difficulty;
        b
    }

    #[test]
    fn chain_work_follows_the_branch_of_the_tip() {
        let mut dag = NullDag::new();
        let genesis = block(Vec::new(), 1);
        dag.add_block(&genesis).unwrap();
        let a1 = block(vec![genesis.hash()], 2);
        let a2 = block(vec![a1.hash()], 3);
        let b1 = mined_with(vec![genesis.hash()], 4, 0x2000ffff);
        for b in [&a1, &a2, &b1] {
            dag.add_block(b).unwrap();
        }
        let mut known = HashMap::new();

        let a_tip = dag.node(&a2.hash()).unwrap();
        assert_eq!(chain_work(&dag, &mut known, &a_tip), 2 + 2 + 2);
        assert_eq!(known.len(), 3);

        let b_node = dag.node(&b1.hash()).unwrap();
        assert_eq!(chain_work(&dag, &mut known, &b_node), 2 + 256);
        assert_eq!(known.get(&a_tip.id), Some(&6));
    }

    #[test]
    fn chain_work_resumes_from_a_seeded_block() {
        let mut dag = NullDag::new();
        let genesis = block(Vec::new(), 1);
        let child = block(vec![genesis.hash()], 2);
        dag.add_block(&genesis).unwrap();
        dag.add_block(&child).unwrap();

        let mut known = HashMap::new();
        known.insert(dag.node(&genesis.hash()).unwrap().id, 1000);
        let tip = dag.main_chain_tip();
        assert_eq!(chain_work(&dag, &mut known, &tip), 1002);
    }

    #[test]
    fn lone_genesis_is_its_own_median() {
        let mut dag = NullDag::new();
        let genesis = block(Vec::new(), 42);
        dag.add_block(&genesis).unwrap();
        let node = dag.main_chain_tip();
        assert_eq!(calc_past_median_time(&dag, &node, 11), Timestamp::new(42));
    }
}
