//! Orphan pool: blocks whose parents are not in the DAG yet.
//!
//! Entries are keyed by block hash and time-stamped on arrival. Once all of
//! an orphan's parents are known it is handed back for processing.

use std::collections::HashMap;
use std::sync::Arc;

use dagchain_types::{Block, BlockHash, Timestamp};

use crate::BehaviorFlags;

#[derive(Clone, Debug)]
pub struct OrphanEntry {
    pub block: Arc<Block>,
    /// Flags the block was submitted with.
    pub flags: BehaviorFlags,
    pub received_at: Timestamp,
}

pub struct OrphanPool {
    entries: HashMap<BlockHash, OrphanEntry>,
    /// Maximum entries allowed (prevents memory exhaustion from spam).
    max_size: usize,
    ttl_secs: u64,
}

impl OrphanPool {
    pub fn new(max_size: usize, ttl_secs: u64) -> Self {
        Self {
            entries: HashMap::new(),
            max_size: max_size.max(1),
            ttl_secs,
        }
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.entries.contains_key(hash)
    }

    /// Park `block`. When the pool is full, expired entries go first, then
    /// the oldest one. Returns `false` if the block was already present.
    pub fn add(&mut self, block: Arc<Block>, flags: BehaviorFlags, now: Timestamp) -> bool {
        let hash = block.hash();
        if self.entries.contains_key(&hash) {
            return false;
        }
        if self.entries.len() >= self.max_size {
            self.expire(now);
        }
        if self.entries.len() >= self.max_size {
            self.evict_oldest();
        }
        self.entries.insert(
            hash,
            OrphanEntry {
                block,
                flags,
                received_at: now,
            },
        );
        true
    }

    pub fn remove(&mut self, hash: &BlockHash) -> Option<OrphanEntry> {
        self.entries.remove(hash)
    }

    /// Drop every entry older than the TTL. Returns how many were dropped.
    pub fn expire(&mut self, now: Timestamp) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl_secs;
        self.entries
            .retain(|_, entry| !entry.received_at.has_expired(ttl, now));
        before - self.entries.len()
    }

    /// Orphans whose every parent satisfies `is_known`, oldest first.
    pub fn ready(&self, is_known: impl Fn(&BlockHash) -> bool) -> Vec<BlockHash> {
        let mut ready: Vec<(&BlockHash, &OrphanEntry)> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.block.parents().iter().all(&is_known))
            .collect();
        ready.sort_by(|a, b| a.1.received_at.cmp(&b.1.received_at).then_with(|| a.0.cmp(b.0)));
        ready.into_iter().map(|(hash, _)| *hash).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by(|a, b| a.1.received_at.cmp(&b.1.received_at).then_with(|| a.0.cmp(b.0)))
            .map(|(hash, _)| *hash);
        if let Some(hash) = oldest {
            tracing::debug!(hash = %hash, "orphan pool full, evicting oldest orphan");
            self.entries.remove(&hash);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagchain_types::BlockHeader;

    fn orphan(parent: u8, nonce: u64) -> Arc<Block> {
        Arc::new(Block {
            header: BlockHeader {
                version: 1,
                parents: vec![BlockHash::new([parent; 32])],
                tx_root: [0; 32],
                timestamp: Timestamp::new(0),
                difficulty: 0x207fffff,
                nonce,
            },
            transactions: Vec::new(),
        })
    }

    #[test]
    fn add_is_idempotent() {
        let mut pool = OrphanPool::new(10, 60);
        let block = orphan(1, 1);
        assert!(pool.add(block.clone(), BehaviorFlags::NONE, Timestamp::new(0)));
        assert!(!pool.add(block.clone(), BehaviorFlags::NONE, Timestamp::new(1)));
        assert_eq!(pool.len(), 1);
        assert!(pool.contains(&block.hash()));
    }

    #[test]
    fn full_pool_evicts_expired_then_oldest() {
        let mut pool = OrphanPool::new(2, 100);
        let a = orphan(1, 1);
        let b = orphan(1, 2);
        let c = orphan(1, 3);
        pool.add(a.clone(), BehaviorFlags::NONE, Timestamp::new(10));
        pool.add(b.clone(), BehaviorFlags::NONE, Timestamp::new(20));
        pool.add(c.clone(), BehaviorFlags::NONE, Timestamp::new(30));
        assert!(!pool.contains(&a.hash()));
        assert!(pool.contains(&b.hash()));

        // b is expired by now, so it goes before the younger c
        let d = orphan(1, 4);
        pool.add(d.clone(), BehaviorFlags::NONE, Timestamp::new(125));
        assert!(!pool.contains(&b.hash()));
        assert!(pool.contains(&c.hash()));
        assert!(pool.contains(&d.hash()));
    }

    #[test]
    fn ready_requires_every_parent() {
        let mut pool = OrphanPool::new(10, 60);
        let waiting = orphan(7, 1);
        pool.add(waiting.clone(), BehaviorFlags::NONE, Timestamp::new(0));
        assert!(pool.ready(|_| false).is_empty());
        let known = BlockHash::new([7; 32]);
        assert_eq!(pool.ready(|h| *h == known), vec![waiting.hash()]);
    }

    #[test]
    fn expire_drops_old_entries() {
        let mut pool = OrphanPool::new(10, 60);
        pool.add(orphan(1, 1), BehaviorFlags::NONE, Timestamp::new(0));
        pool.add(orphan(1, 2), BehaviorFlags::NONE, Timestamp::new(50));
        assert_eq!(pool.expire(Timestamp::new(70)), 1);
        assert_eq!(pool.len(), 1);
    }

    proptest::proptest! {
        #[test]
        fn pool_never_exceeds_capacity(
            max_size in 1usize..8,
            arrivals in proptest::collection::vec((0u64..1_000, 0u64..50), 0..40),
        ) {
            let mut pool = OrphanPool::new(max_size, 30);
            for (nonce, at) in arrivals {
                pool.add(orphan(1, nonce), BehaviorFlags::NONE, Timestamp::new(at));
                proptest::prop_assert!(pool.len() <= max_size);
            }
        }
    }
}
