//! Block admission pipeline.
//!
//! Incoming blocks go through: dedup, structural sanity, checkpoint checks,
//! gap detection (missing parents park the block as an orphan), and finally
//! acceptance under the exclusive chain lock. Every successful acceptance
//! re-examines the orphan pool.

use std::sync::Arc;
use std::time::Instant;

use dagchain_consensus::AddedBlock;
use dagchain_ledger::{store_block, BestState};
use dagchain_store::{DatabaseExt, WriteTxn};
use dagchain_types::Block;

use crate::best_state::calc_past_median_time;
use crate::chain::{BlockChain, ChainState};
use crate::chain_event::ChainEvent;
use crate::connector::AppliedBlocks;
use crate::error::RuleErrorKind;
use crate::sanity::{check_block_context, check_block_sanity, check_checkpoints};
use crate::shutdown::CommitGateError;
use crate::tracing_spans::block_process_span;
use crate::{BehaviorFlags, ChainError};

impl BlockChain {
    /// Admit `block`. Returns `Ok(true)` when it was parked as an orphan.
    ///
    /// A rule violation or structural error leaves no trace. A fatal error
    /// halts the chain; every later call fails with [`ChainError::Halted`].
    pub fn process_block(&self, block: Block, flags: BehaviorFlags) -> Result<bool, ChainError> {
        if self.is_halted() {
            return Err(ChainError::Halted);
        }
        if self.shutdown.is_shutdown_requested() {
            return Err(ChainError::ShuttingDown);
        }

        let block = Arc::new(block);
        let hash = block.hash();
        let span = block_process_span(&hash);
        let _enter = span.enter();
        if let Some(metrics) = self.metrics() {
            metrics.blocks_processed.inc();
        }

        let result = self.process_inner(block, flags);
        match &result {
            Ok(is_orphan) => {
                tracing::debug!(hash = %hash, is_orphan, flags = ?flags, "processed block");
            }
            Err(e @ (ChainError::Rule(_) | ChainError::Structural(_))) => {
                if let Some(metrics) = self.metrics() {
                    metrics.blocks_rejected.inc();
                }
                tracing::debug!(hash = %hash, error = %e, "rejected block");
            }
            Err(_) => {}
        }
        result
    }

    fn process_inner(&self, block: Arc<Block>, flags: BehaviorFlags) -> Result<bool, ChainError> {
        {
            let state = self.state.read();
            if flags.contains(BehaviorFlags::RPC_ADD) {
                state
                    .dag
                    .check_sub_main_chain_tip(block.parents())
                    .map_err(|e| ChainError::rule(RuleErrorKind::TipsExpired, e.to_string()))?;
            }
            if self.pre_process(&state, &block, flags)? {
                return Ok(true);
            }
        }

        self.maybe_accept_block(block, flags)?;
        self.process_orphans()?;
        Ok(false)
    }

    /// Checks that need no exclusive access. Returns `true` when the block
    /// was parked as an orphan.
    fn pre_process(
        &self,
        state: &ChainState,
        block: &Arc<Block>,
        flags: BehaviorFlags,
    ) -> Result<bool, ChainError> {
        let hash = block.hash();
        if state.dag.has_block(&hash) {
            return Err(ChainError::rule(
                RuleErrorKind::DuplicateBlock,
                format!("already have block {}", hash),
            ));
        }
        if self.orphans.lock().contains(&hash) {
            return Err(ChainError::rule(
                RuleErrorKind::DuplicateBlock,
                format!("already have orphan {}", hash),
            ));
        }

        check_block_sanity(block, &self.params)?;
        if !flags.is_fast_add() {
            check_checkpoints(block, &self.params, |h| state.dag.has_block(h))?;
        }

        let missing: Vec<_> = block
            .parents()
            .iter()
            .filter(|parent| !state.dag.has_block(parent))
            .collect();
        if missing.is_empty() {
            return Ok(false);
        }

        let now = self.services.clock.now();
        let mut orphans = self.orphans.lock();
        // Another submitter may have parked the same block since the check
        // above.
        if !orphans.add(Arc::clone(block), flags.without(BehaviorFlags::RPC_ADD), now) {
            return Err(ChainError::rule(
                RuleErrorKind::DuplicateBlock,
                format!("already have orphan {}", hash),
            ));
        }
        if let Some(metrics) = self.metrics() {
            metrics.blocks_orphaned.inc();
            metrics.orphan_count.set(orphans.len() as i64);
        }
        tracing::debug!(
            hash = %hash,
            missing = missing.len(),
            first_missing = %missing[0],
            pool = orphans.len(),
            "parked orphan block"
        );
        Ok(true)
    }

    /// Add a block whose parents are all present to the DAG and apply the
    /// resulting order, then notify subscribers outside the lock.
    pub(crate) fn maybe_accept_block(&self, block: Arc<Block>, flags: BehaviorFlags) -> Result<(), ChainError> {
        let accepted = {
            let mut state = self.state.write();
            self.accept_locked(&mut state, block, flags)?
        };
        self.publish_acceptance(accepted);
        Ok(())
    }

    /// Acceptance proper. Every check that can refuse the block, shutdown
    /// included, runs before the DAG is touched; past that point a failure
    /// is fatal.
    fn accept_locked(
        &self,
        state: &mut ChainState,
        block: Arc<Block>,
        flags: BehaviorFlags,
    ) -> Result<Accepted, ChainError> {
        let started = Instant::now();
        let hash = block.hash();

        if state.dag.has_block(&hash) {
            return Err(ChainError::rule(
                RuleErrorKind::DuplicateBlock,
                format!("already have block {}", hash),
            ));
        }
        if self.shutdown.is_shutdown_requested() {
            return Err(ChainError::ShuttingDown);
        }
        let now = self.services.clock.now();
        if !flags.is_fast_add() {
            let parent = state.dag.main_parent(block.parents()).ok_or_else(|| {
                ChainError::Structural(format!("cannot resolve main parent of {}", hash))
            })?;
            let past_median = calc_past_median_time(state.dag.as_ref(), &parent, self.params.median_time_blocks);
            check_block_context(&block, past_median, now, &self.params)?;
        }

        {
            let mut orphans = self.orphans.lock();
            state.pruner.prune_if_needed(&mut orphans, now);
        }

        match self.shutdown.begin_commit(&hash) {
            Ok(()) => {}
            Err(CommitGateError::ShuttingDown) => return Err(ChainError::ShuttingDown),
            Err(e) => return Err(self.fatal(format!("failed to mark commit of {}: {}", hash, e))),
        }
        let (added, applied, best) = match self.commit_block(state, &block, flags) {
            Ok(done) => done,
            Err(e) => {
                self.shutdown.abandon_commit();
                return Err(self.fatal(format!("commit of block {} failed: {}", hash, e)));
            }
        };
        self.shutdown
            .end_commit()
            .map_err(|e| self.fatal(format!("failed to clear commit marker of {}: {}", hash, e)))?;

        Ok(Accepted {
            block,
            flags,
            added,
            applied,
            best,
            started,
        })
    }

    /// Insert into the DAG, store the body, reconcile the UTXO set and
    /// publish the best state.
    fn commit_block(
        &self,
        state: &mut ChainState,
        block: &Arc<Block>,
        flags: BehaviorFlags,
    ) -> Result<(AddedBlock, AppliedBlocks, Arc<BestState>), ChainError> {
        let hash = block.hash();
        let added = state.dag.add_block(block)?;
        if added.node.hash != hash {
            return Err(ChainError::Structural(format!(
                "oracle returned node {} for block {}",
                added.node.hash, hash
            )));
        }
        self.db
            .update(|txn: &mut dyn WriteTxn| store_block(txn, block).map(|_| ()))?;
        let applied = self.connect_dag_chain(state, block, &added, flags)?;
        let best = self.update_best_state(state, block, &added)?;
        Ok((added, applied, best))
    }

    /// Metrics, log line and events of a finished acceptance. Listeners run
    /// on a snapshot of the bus so they may subscribe in turn.
    fn publish_acceptance(&self, accepted: Accepted) {
        let Accepted {
            block,
            flags,
            added,
            applied,
            best,
            started,
        } = accepted;
        let hash = block.hash();

        if let Some(metrics) = self.metrics() {
            metrics.blocks_accepted.inc();
            metrics.main_order.set(best.main_order() as i64);
            metrics.total_txns.set(best.total_txns as i64);
            metrics.orphan_count.set(self.orphan_count() as i64);
            metrics
                .accept_time_ms
                .observe(started.elapsed().as_secs_f64() * 1000.0);
        }
        tracing::info!(
            hash = %hash,
            order = ?added.node.order,
            tip_changed = added.tip_changed,
            connected = applied.connected.len(),
            disconnected = applied.disconnected.len(),
            "accepted block"
        );

        let events = self.events.read().clone();
        for detached in applied.disconnected {
            events.emit(&ChainEvent::BlockDisconnected { block: detached });
        }
        for (attached, is_on_main_chain) in applied.connected {
            events.emit(&ChainEvent::BlockConnected {
                block: attached,
                is_on_main_chain,
            });
        }
        events.emit(&ChainEvent::BlockAccepted {
            block,
            tip_changed: added.tip_changed,
            flags,
        });
    }

    /// Accept every orphan whose parents are now all present, repeating
    /// until a pass promotes nothing. Returns how many were accepted.
    ///
    /// An orphan leaves the pool under the same write lock that inserts it
    /// into the DAG. Once shutdown is requested the cascade stops and the
    /// remaining orphans stay parked.
    fn process_orphans(&self) -> Result<usize, ChainError> {
        let mut accepted = 0;
        'passes: loop {
            let ready = {
                let state = self.state.read();
                let orphans = self.orphans.lock();
                orphans.ready(|parent| state.dag.has_block(parent))
            };
            if ready.is_empty() {
                break;
            }

            let mut progressed = false;
            for hash in ready {
                let outcome = {
                    let mut state = self.state.write();
                    if self.shutdown.is_shutdown_requested() {
                        break 'passes;
                    }
                    let Some(entry) = self.orphans.lock().remove(&hash) else {
                        continue;
                    };
                    progressed = true;
                    let block = Arc::clone(&entry.block);
                    match self.accept_locked(&mut state, block, entry.flags) {
                        Err(ChainError::ShuttingDown) => {
                            self.orphans
                                .lock()
                                .add(entry.block, entry.flags, entry.received_at);
                            break 'passes;
                        }
                        outcome => outcome,
                    }
                };
                match outcome {
                    Ok(done) => {
                        self.publish_acceptance(done);
                        accepted += 1;
                    }
                    Err(e @ (ChainError::Rule(_) | ChainError::Structural(_))) => {
                        tracing::warn!(hash = %hash, error = %e, "dropping orphan that failed acceptance");
                    }
                    Err(e) => return Err(e),
                }
            }
            if !progressed {
                break;
            }
        }

        if accepted > 0 {
            tracing::debug!(accepted, remaining = self.orphan_count(), "promoted orphans");
        }
        if let Some(metrics) = self.metrics() {
            metrics.orphan_count.set(self.orphan_count() as i64);
        }
        Ok(accepted)
    }
}

/// What an acceptance changed, carried out of the chain lock.
struct Accepted {
    block: Arc<Block>,
    flags: BehaviorFlags,
    added: AddedBlock,
    applied: AppliedBlocks,
    best: Arc<BestState>,
    started: Instant,
}
