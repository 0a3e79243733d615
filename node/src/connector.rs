//! Applying the oracle's ordering to the UTXO set.
//!
//! An admission either extends the order by the new block alone, or
//! reorganizes: blocks that lost their slot are disconnected newest first,
//! then every newly ordered block is connected oldest first.

use std::sync::Arc;

use rayon::prelude::*;

use dagchain_consensus::{AddedBlock, BlockDag, NULL_VM_BLOCK};
use dagchain_ledger::{
    check_coinbase_value, check_transaction_inputs, connect_token_state, connect_transaction,
    connect_transactions, count_spent_outputs, disconnect_token_state, disconnect_transactions,
    fetch_spend_journal, put_spend_journal, put_utxo_view, remove_spend_journal, BlockFees,
    LedgerError, LedgerResult, SpentTxOut, UtxoView,
};
use dagchain_store::{DatabaseExt, ReadTxn, WriteTxn};
use dagchain_types::{Block, BlockHash, DagNode, Transaction};

use crate::chain::{BlockChain, ChainState};
use crate::tracing_spans::{block_connect_span, reorg_span};
use crate::{BehaviorFlags, ChainError};

/// Blocks whose effects an admission applied or reversed, in the order it
/// did so.
#[derive(Default)]
pub(crate) struct AppliedBlocks {
    pub(crate) disconnected: Vec<Arc<Block>>,
    pub(crate) connected: Vec<(Arc<Block>, bool)>,
}

impl BlockChain {
    /// Bring the UTXO set in line with the order reported for `block`.
    pub(crate) fn connect_dag_chain(
        &self,
        state: &mut ChainState,
        block: &Arc<Block>,
        added: &AddedBlock,
        flags: BehaviorFlags,
    ) -> Result<AppliedBlocks, ChainError> {
        let mut applied = AppliedBlocks::default();
        let new_id = added.node.id;

        let mut ordered = Vec::with_capacity(added.newly_ordered.len());
        for id in &added.newly_ordered {
            let node = Self::node_by_id(state.dag.as_ref(), *id)?;
            if node.is_ordered() {
                ordered.push(node);
            }
        }

        let simple = !added.is_reorg()
            && (ordered.is_empty() || (ordered.len() == 1 && ordered[0].id == new_id));
        if simple {
            if let Some(node) = ordered.pop() {
                self.connect_one(state, &node, block, flags, &mut applied)?;
            } else {
                tracing::debug!(hash = %added.node.hash, "block is not ordered yet, nothing to connect");
            }
            return Ok(applied);
        }

        let span = reorg_span(added.removed_from_order.len(), ordered.len());
        let _enter = span.enter();
        if let Some(metrics) = self.metrics().filter(|_| added.is_reorg()) {
            metrics.reorgs.inc();
        }

        for id in added.removed_from_order.iter().rev() {
            let node = Self::node_by_id(state.dag.as_ref(), *id)?;
            let detached = self.load_block(&node.hash)?;
            self.disconnect_block(&node, &detached)?;
            applied.disconnected.push(detached);
        }
        for node in &ordered {
            let attached = if node.id == new_id {
                Arc::clone(block)
            } else {
                self.load_block(&node.hash)?
            };
            self.connect_one(state, node, &attached, flags, &mut applied)?;
        }

        tracing::info!(
            detached = applied.disconnected.len(),
            attached = applied.connected.len(),
            "reorganized block order"
        );
        Ok(applied)
    }

    /// Validate and connect one ordered block. A block that fails
    /// validation keeps its slot but only reaches the indexer.
    fn connect_one(
        &self,
        state: &mut ChainState,
        node: &DagNode,
        block: &Arc<Block>,
        flags: BehaviorFlags,
        applied: &mut AppliedBlocks,
    ) -> Result<(), ChainError> {
        let span = block_connect_span(&node.hash, node.order);
        let _enter = span.enter();

        let valid = if node.is_invalid() {
            false
        } else {
            match self.check_connect_block(state.dag.as_ref(), node, block, flags) {
                Ok((view, stxos)) => {
                    self.connect_block(node, block, view, &stxos)?;
                    state.dag.mark_valid(node.id);
                    true
                }
                Err(e @ (LedgerError::InvalidTransaction { .. }
                | LedgerError::InvalidBlock { .. }
                | LedgerError::AssertionFailure(_))) => {
                    tracing::warn!(hash = %node.hash, error = %e, "block failed validation, marking invalid");
                    state.dag.mark_invalid(node.id);
                    false
                }
                Err(e) => return Err(e.into()),
            }
        };

        if !valid {
            if let Some(indexer) = &self.services.indexer {
                indexer.connect_block(block, &[], node, NULL_VM_BLOCK)?;
            }
        }

        let on_main_chain = state.dag.is_on_main_chain(node.id);
        applied.connected.push((Arc::clone(block), on_main_chain));
        if let Some(metrics) = self.metrics() {
            metrics.blocks_connected.inc();
        }
        tracing::debug!(hash = %node.hash, order = ?node.order, valid, on_main_chain, "connected block");
        Ok(())
    }

    /// Build the view and journal of `block`, validating it unless
    /// fast-add is set. Nothing is written.
    fn check_connect_block(
        &self,
        dag: &dyn BlockDag,
        node: &DagNode,
        block: &Block,
        flags: BehaviorFlags,
    ) -> LedgerResult<(UtxoView, Vec<SpentTxOut>)> {
        let hash = block.hash();
        let genesis_hash = self.params.genesis_hash();
        self.db.view(|txn: &dyn ReadTxn| {
            let mut view = UtxoView::new();
            view.fetch_input_utxos(txn, block)?;
            let mut stxos = Vec::with_capacity(count_spent_outputs(block));

            if flags.is_fast_add() {
                connect_transactions(txn, &mut view, block, &genesis_hash, Some(&mut stxos))?;
                return Ok((view, stxos));
            }

            let origin_height = |origin: &BlockHash| dag.node(origin).map(|n| n.height);
            let mut fees = BlockFees::new();
            for (index, tx) in block.transactions.iter().enumerate() {
                let tx_fees = check_transaction_inputs(
                    &view,
                    tx,
                    node.height,
                    self.params.coinbase_maturity,
                    &origin_height,
                )?;
                if !fees.merge(&tx_fees) {
                    return Err(LedgerError::InvalidBlock {
                        hash,
                        reason: "total fees overflow".into(),
                    });
                }
                self.verify_scripts(&view, tx)?;
                connect_transaction(
                    txn,
                    &mut view,
                    tx,
                    index as u32,
                    &hash,
                    &genesis_hash,
                    Some(&mut stxos),
                )?;
            }
            check_coinbase_value(block, &fees, self.params.base_subsidy)?;
            Ok((view, stxos))
        })
    }

    /// Run the script verifier over every spending input of `tx` in
    /// parallel.
    fn verify_scripts(&self, view: &UtxoView, tx: &Transaction) -> LedgerResult<()> {
        let Some(verifier) = &self.services.scripts else {
            return Ok(());
        };
        let first_spending = if tx.is_token_mint() { 1 } else { 0 };
        let jobs: Vec<_> = tx
            .spending_inputs()
            .iter()
            .enumerate()
            .filter_map(|(offset, input)| {
                view.lookup(&input.previous_out)
                    .map(|entry| (first_spending + offset, entry.pk_script(), entry.amount()))
            })
            .collect();
        jobs.par_iter().try_for_each(|(input_index, pk_script, amount)| {
            verifier
                .verify(tx, *input_index, pk_script, *amount)
                .map_err(|e| LedgerError::InvalidTransaction {
                    tx: tx.hash(),
                    reason: e.to_string(),
                })
        })
    }

    /// Make a validated block's effects durable and notify the VM and the
    /// indexer.
    fn connect_block(
        &self,
        node: &DagNode,
        block: &Block,
        mut view: UtxoView,
        stxos: &[SpentTxOut],
    ) -> Result<(), ChainError> {
        let hash = block.hash();
        let vm_block = match &self.services.vm {
            Some(vm) => vm.connect_block(block)?,
            None => NULL_VM_BLOCK,
        };

        self.db.update(|txn: &mut dyn WriteTxn| {
            put_utxo_view(txn, &view)?;
            put_spend_journal(txn, &hash, stxos)?;
            connect_token_state(txn, block)?;
            Ok::<_, ChainError>(())
        })?;

        if let Some(indexer) = &self.services.indexer {
            let spent_scripts: Vec<Vec<u8>> = stxos.iter().map(|s| s.pk_script.clone()).collect();
            indexer.connect_block(block, &spent_scripts, node, vm_block)?;
        }
        view.commit();
        Ok(())
    }

    /// Reverse `block` using its spend journal. A block connected as
    /// invalid had no effects, so only the indexer hears about it.
    fn disconnect_block(&self, node: &DagNode, block: &Block) -> Result<(), ChainError> {
        let span = block_connect_span(&node.hash, node.order);
        let _enter = span.enter();
        let hash = block.hash();

        if node.is_invalid() {
            if let Some(indexer) = &self.services.indexer {
                indexer.disconnect_block(block, &[], node, NULL_VM_BLOCK)?;
            }
            tracing::debug!(hash = %hash, "disconnected invalid block");
            return Ok(());
        }

        let (view, stxos) = self.db.view(|txn: &dyn ReadTxn| {
            let stxos = fetch_spend_journal(txn, &hash)?;
            let mut view = UtxoView::new();
            view.fetch_block_utxos(txn, block)?;
            disconnect_transactions(&mut view, block, &stxos)?;
            Ok::<_, LedgerError>((view, stxos))
        })?;

        let vm_block = match &self.services.vm {
            Some(vm) => vm.disconnect_block(block)?,
            None => NULL_VM_BLOCK,
        };

        self.db.update(|txn: &mut dyn WriteTxn| {
            put_utxo_view(txn, &view)?;
            remove_spend_journal(txn, &hash)?;
            disconnect_token_state(txn, block)?;
            Ok::<_, ChainError>(())
        })?;

        if let Some(indexer) = &self.services.indexer {
            let spent_scripts: Vec<Vec<u8>> = stxos.iter().map(|s| s.pk_script.clone()).collect();
            indexer.disconnect_block(block, &spent_scripts, node, vm_block)?;
        }
        if let Some(metrics) = self.metrics() {
            metrics.blocks_disconnected.inc();
        }
        tracing::debug!(hash = %hash, restored = stxos.len(), "disconnected block");
        Ok(())
    }
}
