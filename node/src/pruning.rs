//! Bookkeeping pruning run before every mutating admission.
//!
//! The pruner is rate limited: a pass runs at most once per interval, and
//! only expired orphans are removed.

use dagchain_types::Timestamp;

use crate::orphans::OrphanPool;

pub struct Pruner {
    /// Minimum spacing between two passes, in seconds. `0` prunes every time.
    interval_secs: u64,
    last_run: Option<Timestamp>,
}

impl Pruner {
    pub fn new(interval_secs: u64) -> Self {
        Self {
            interval_secs,
            last_run: None,
        }
    }

    /// Run a pass if the interval has elapsed. Returns the number of orphans
    /// dropped.
    pub fn prune_if_needed(&mut self, orphans: &mut OrphanPool, now: Timestamp) -> usize {
        if let Some(last) = self.last_run {
            if !last.has_expired(self.interval_secs, now) {
                return 0;
            }
        }
        self.last_run = Some(now);
        let dropped = orphans.expire(now);
        if dropped > 0 {
            tracing::debug!(dropped, remaining = orphans.len(), "pruned expired orphans");
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BehaviorFlags;
    use dagchain_types::{Block, BlockHash, BlockHeader};
    use std::sync::Arc;

    fn orphan(nonce: u64) -> Arc<Block> {
        Arc::new(Block {
            header: BlockHeader {
                version: 1,
                parents: vec![BlockHash::new([3; 32])],
                tx_root: [0; 32],
                timestamp: Timestamp::new(0),
                difficulty: 0x207fffff,
                nonce,
            },
            transactions: Vec::new(),
        })
    }

    #[test]
    fn passes_are_rate_limited() {
        let mut pool = OrphanPool::new(10, 10);
        let mut pruner = Pruner::new(100);
        pool.add(orphan(1), BehaviorFlags::NONE, Timestamp::new(0));

        assert_eq!(pruner.prune_if_needed(&mut pool, Timestamp::new(5)), 0);
        // expired, but the interval has not elapsed yet
        assert_eq!(pruner.prune_if_needed(&mut pool, Timestamp::new(50)), 0);
        assert_eq!(pool.len(), 1);
        assert_eq!(pruner.prune_if_needed(&mut pool, Timestamp::new(105)), 1);
        assert!(pool.is_empty());
    }

    #[test]
    fn zero_interval_prunes_every_call() {
        let mut pool = OrphanPool::new(10, 10);
        let mut pruner = Pruner::new(0);
        pruner.prune_if_needed(&mut pool, Timestamp::new(0));
        pool.add(orphan(2), BehaviorFlags::NONE, Timestamp::new(0));
        assert_eq!(pruner.prune_if_needed(&mut pool, Timestamp::new(10)), 1);
    }
}
