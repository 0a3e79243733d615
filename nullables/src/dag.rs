//! Nullable DAG oracle: a small deterministic ordering rule for testing.
//!
//! - The main parent of a block is its highest parent, lowest id on a tie.
//! - The main tip is the highest block; an equally high newcomer never
//!   replaces it.
//! - The order walks the main chain from genesis. Before each main-chain
//!   block it places that block's not yet ordered past, by id.
//!
//! Blocks off the main chain's past stay unordered. Every add recomputes
//! the whole order and reports the difference from the previous one.

use std::collections::{HashMap, HashSet};

use dagchain_consensus::{AddedBlock, BlockDag, ConsensusError};
use dagchain_types::{Block, BlockHash, BlockId, BlockStatus, DagNode, GraphState, Timestamp};

struct Entry {
    hash: BlockHash,
    parents: Vec<BlockId>,
    main_parent: Option<BlockId>,
    height: u64,
    layer: u64,
    status: BlockStatus,
    weight: u64,
    timestamp: Timestamp,
    difficulty: u32,
    has_children: bool,
}

#[derive(Default)]
pub struct NullDag {
    entries: Vec<Entry>,
    by_hash: HashMap<BlockHash, BlockId>,
    order: Vec<BlockId>,
    order_of: HashMap<BlockId, u64>,
    tip: Option<BlockId>,
    fail_adds: bool,
    commits: usize,
}

impl NullDag {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, `add_block` fails as if the oracle lost its state.
    pub fn set_fail_adds(&mut self, fail: bool) {
        self.fail_adds = fail;
    }

    pub fn commit_count(&self) -> usize {
        self.commits
    }

    /// Hashes in the current order.
    pub fn ordered_hashes(&self) -> Vec<BlockHash> {
        self.order.iter().map(|id| self.entry(*id).hash).collect()
    }

    fn entry(&self, id: BlockId) -> &Entry {
        &self.entries[id.0 as usize]
    }

    fn snapshot(&self, id: BlockId) -> DagNode {
        let e = self.entry(id);
        DagNode {
            id,
            hash: e.hash,
            parents: e.parents.clone(),
            main_parent: e.main_parent,
            order: self.order_of.get(&id).copied(),
            height: e.height,
            layer: e.layer,
            status: e.status,
            weight: e.weight,
            timestamp: e.timestamp,
            difficulty: e.difficulty,
        }
    }

    fn pick_main_parent(&self, parents: &[BlockId]) -> Option<BlockId> {
        parents
            .iter()
            .copied()
            .max_by(|a, b| {
                self.entry(*a)
                    .height
                    .cmp(&self.entry(*b).height)
                    .then_with(|| b.cmp(a))
            })
    }

    fn past(&self, id: BlockId) -> HashSet<BlockId> {
        let mut seen = HashSet::new();
        let mut stack = self.entry(id).parents.clone();
        while let Some(next) = stack.pop() {
            if seen.insert(next) {
                stack.extend(self.entry(next).parents.iter().copied());
            }
        }
        seen
    }

    fn compute_order(&self, tip: BlockId) -> Vec<BlockId> {
        let mut chain = vec![tip];
        while let Some(parent) = chain.last().and_then(|id| self.entry(*id).main_parent) {
            chain.push(parent);
        }
        chain.reverse();

        let mut placed = HashSet::new();
        let mut order = Vec::new();
        for block in chain {
            let mut pending: Vec<BlockId> = self
                .past(block)
                .into_iter()
                .filter(|id| !placed.contains(id))
                .collect();
            pending.sort();
            for id in pending.into_iter().chain(std::iter::once(block)) {
                placed.insert(id);
                order.push(id);
            }
        }
        order
    }
}

impl BlockDag for NullDag {
    fn has_block(&self, hash: &BlockHash) -> bool {
        self.by_hash.contains_key(hash)
    }

    fn add_block(&mut self, block: &Block) -> Result<AddedBlock, ConsensusError> {
        if self.fail_adds {
            return Err(ConsensusError::Oracle("injected add failure".into()));
        }
        let hash = block.hash();
        if self.by_hash.contains_key(&hash) {
            return Err(ConsensusError::Oracle(format!("block {} added twice", hash)));
        }
        let parents = block
            .parents()
            .iter()
            .map(|p| self.by_hash.get(p).copied().ok_or(ConsensusError::UnknownBlock(*p)))
            .collect::<Result<Vec<_>, _>>()?;

        let main_parent = self.pick_main_parent(&parents);
        let height = main_parent.map(|p| self.entry(p).height + 1).unwrap_or(0);
        let layer = parents
            .iter()
            .map(|p| self.entry(*p).layer + 1)
            .max()
            .unwrap_or(0);
        let id = BlockId(self.entries.len() as u32);
        for parent in &parents {
            self.entries[parent.0 as usize].has_children = true;
        }
        self.entries.push(Entry {
            hash,
            parents,
            main_parent,
            height,
            layer,
            status: BlockStatus::Unknown,
            weight: 0,
            timestamp: block.timestamp(),
            difficulty: block.header.difficulty,
            has_children: false,
        });
        self.by_hash.insert(hash, id);

        let becomes_tip = match self.tip {
            None => true,
            Some(tip) => height > self.entry(tip).height,
        };
        if !becomes_tip {
            return Ok(AddedBlock {
                node: self.snapshot(id),
                newly_ordered: vec![id],
                removed_from_order: Vec::new(),
                tip_changed: false,
            });
        }

        let new_order = self.compute_order(id);
        let common = self
            .order
            .iter()
            .zip(new_order.iter())
            .take_while(|(old, new)| old == new)
            .count();
        let removed_from_order = self.order[common..].to_vec();
        let newly_ordered = new_order[common..].to_vec();

        self.order_of = new_order
            .iter()
            .enumerate()
            .map(|(position, id)| (*id, position as u64))
            .collect();
        self.order = new_order;
        self.tip = Some(id);

        Ok(AddedBlock {
            node: self.snapshot(id),
            newly_ordered,
            removed_from_order,
            tip_changed: true,
        })
    }

    fn mark_valid(&mut self, id: BlockId) {
        if let Some(entry) = self.entries.get_mut(id.0 as usize) {
            entry.status = BlockStatus::Valid;
        }
    }

    fn mark_invalid(&mut self, id: BlockId) {
        if let Some(entry) = self.entries.get_mut(id.0 as usize) {
            entry.status = BlockStatus::Invalid;
        }
    }

    fn main_chain_tip(&self) -> DagNode {
        self.snapshot(self.tip.unwrap_or(BlockId(0)))
    }

    fn is_on_main_chain(&self, id: BlockId) -> bool {
        let mut cursor = self.tip;
        while let Some(current) = cursor {
            if current == id {
                return true;
            }
            cursor = self.entry(current).main_parent;
        }
        false
    }

    fn main_parent(&self, parents: &[BlockHash]) -> Option<DagNode> {
        let ids = parents
            .iter()
            .map(|p| self.by_hash.get(p).copied())
            .collect::<Option<Vec<_>>>()?;
        self.pick_main_parent(&ids).map(|id| self.snapshot(id))
    }

    fn node(&self, hash: &BlockHash) -> Option<DagNode> {
        self.by_hash.get(hash).map(|id| self.snapshot(*id))
    }

    fn node_by_id(&self, id: BlockId) -> Option<DagNode> {
        ((id.0 as usize) < self.entries.len()).then(|| self.snapshot(id))
    }

    fn hash_by_order(&self, order: u64) -> Option<BlockHash> {
        self.order.get(order as usize).map(|id| self.entry(*id).hash)
    }

    fn block_count(&self) -> usize {
        self.entries.len()
    }

    fn update_weight(&mut self, id: BlockId) {
        if (id.0 as usize) < self.entries.len() {
            let weight = self.past(id).len() as u64 + 1;
            self.entries[id.0 as usize].weight = weight;
        }
    }

    fn graph_state(&self) -> GraphState {
        let tip = self.main_chain_tip();
        GraphState {
            tips: self
                .entries
                .iter()
                .filter(|e| !e.has_children)
                .map(|e| e.hash)
                .collect(),
            main_order: tip.order.unwrap_or(0),
            main_height: tip.height,
            layer: self.entries.iter().map(|e| e.layer).max().unwrap_or(0),
        }
    }

    fn check_sub_main_chain_tip(&self, parents: &[BlockHash]) -> Result<(), ConsensusError> {
        for parent in parents {
            match self.by_hash.get(parent) {
                Some(id) if !self.entry(*id).has_children => {}
                Some(_) => {
                    return Err(ConsensusError::Oracle(format!("{} is no longer a tip", parent)))
                }
                None => return Err(ConsensusError::UnknownBlock(*parent)),
            }
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<(), ConsensusError> {
        self.commits += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagchain_types::{BlockHeader, Transaction};

    fn block(parents: Vec<BlockHash>, nonce: u64) -> Block {
        let transactions: Vec<Transaction> = Vec::new();
        Block {
            header: BlockHeader {
                version: 1,
                parents,
                tx_root: Block::compute_tx_root(&transactions),
                timestamp: Timestamp::new(1_000 + nonce),
                difficulty: 0x207fffff,
                nonce,
            },
            transactions,
        }
    }

    #[test]
    fn extending_the_tip_orders_one_block() {
        let mut dag = NullDag::new();
        let g = block(vec![], 0);
        dag.add_block(&g).unwrap();
        let a = block(vec![g.hash()], 1);
        let added = dag.add_block(&a).unwrap();
        assert_eq!(added.newly_ordered, vec![added.node.id]);
        assert!(added.removed_from_order.is_empty());
        assert!(added.tip_changed);
        assert_eq!(added.node.order, Some(1));
    }

    #[test]
    fn side_block_is_reported_unordered_then_merged() {
        let mut dag = NullDag::new();
        let g = block(vec![], 0);
        dag.add_block(&g).unwrap();
        let a = block(vec![g.hash()], 1);
        dag.add_block(&a).unwrap();

        let b = block(vec![g.hash()], 2);
        let side = dag.add_block(&b).unwrap();
        assert_eq!(side.newly_ordered, vec![side.node.id]);
        assert!(!side.node.is_ordered());
        assert!(!side.tip_changed);

        let c = block(vec![a.hash(), b.hash()], 3);
        let merge = dag.add_block(&c).unwrap();
        assert_eq!(merge.newly_ordered, vec![side.node.id, merge.node.id]);
        assert_eq!(dag.ordered_hashes(), vec![g.hash(), a.hash(), b.hash(), c.hash()]);
    }

    #[test]
    fn higher_branch_reorganizes() {
        let mut dag = NullDag::new();
        let g = block(vec![], 0);
        dag.add_block(&g).unwrap();
        let a = block(vec![g.hash()], 1);
        let a_id = dag.add_block(&a).unwrap().node.id;
        let b = block(vec![g.hash()], 2);
        let b_id = dag.add_block(&b).unwrap().node.id;
        let d = block(vec![b.hash()], 3);
        let added = dag.add_block(&d).unwrap();

        assert_eq!(added.removed_from_order, vec![a_id]);
        assert_eq!(added.newly_ordered, vec![b_id, added.node.id]);
        assert!(!dag.node(&a.hash()).unwrap().is_ordered());
        assert!(!dag.is_on_main_chain(a_id));
    }

    #[test]
    fn sub_main_chain_tip_check_rejects_stale_parents() {
        let mut dag = NullDag::new();
        let g = block(vec![], 0);
        dag.add_block(&g).unwrap();
        let a = block(vec![g.hash()], 1);
        dag.add_block(&a).unwrap();
        assert!(dag.check_sub_main_chain_tip(&[a.hash()]).is_ok());
        assert!(dag.check_sub_main_chain_tip(&[g.hash()]).is_err());
    }
}
