//! The chain: shared state of the admission engine and its accessors.
//!
//! All mutation of the DAG, the UTXO set and the best state happens under
//! the exclusive side of [`BlockChain::state`]. Readers get immutable
//! [`BestState`] snapshots that are swapped wholesale.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};

use dagchain_consensus::{BlockDag, IndexManager, ScriptVerifier, VmService};
use dagchain_ledger::{
    connect_token_state, connect_transactions, fetch_best_state, fetch_block, put_best_state,
    put_spend_journal, put_utxo_view, store_block, token_tip, BestState, BestStateRecord,
    LedgerError, UtxoView,
};
use dagchain_store::{Database, DatabaseExt, ReadTxn, WriteTxn};
use dagchain_store_lmdb::LmdbEnvironment;
use dagchain_types::{calc_work, Block, BlockHash, BlockId, Clock, DagNode, NetworkParams, SystemClock};

use crate::chain_event::{ChainEvent, EventBus};
use crate::config::ChainConfig;
use crate::metrics::ChainMetrics;
use crate::orphans::OrphanPool;
use crate::pruning::Pruner;
use crate::shutdown::ShutdownController;
use crate::ChainError;

/// Capacity of the fatal-error broadcast channel.
const FATAL_CHANNEL_CAPACITY: usize = 4;

/// External collaborators of the chain. Every service is optional except
/// the clock.
#[derive(Clone)]
pub struct ChainServices {
    pub vm: Option<Arc<dyn VmService>>,
    pub indexer: Option<Arc<dyn IndexManager>>,
    pub scripts: Option<Arc<dyn ScriptVerifier>>,
    pub clock: Arc<dyn Clock>,
    pub metrics: Option<Arc<ChainMetrics>>,
}

impl Default for ChainServices {
    fn default() -> Self {
        Self {
            vm: None,
            indexer: None,
            scripts: None,
            clock: Arc::new(SystemClock),
            metrics: None,
        }
    }
}

/// State guarded by the chain lock.
pub(crate) struct ChainState {
    pub(crate) dag: Box<dyn BlockDag>,
    pub(crate) pruner: Pruner,
    /// Cumulative work of the main chain, persisted with the best state.
    pub(crate) work_sum: u128,
    pub(crate) chain_work: HashMap<BlockId, u128>,
}

pub struct BlockChain {
    pub(crate) params: NetworkParams,
    pub(crate) config: ChainConfig,
    pub(crate) db: Arc<dyn Database>,
    pub(crate) state: RwLock<ChainState>,
    pub(crate) orphans: Mutex<OrphanPool>,
    pub(crate) best: RwLock<Arc<BestState>>,
    pub(crate) services: ChainServices,
    pub(crate) events: RwLock<EventBus>,
    pub(crate) shutdown: Arc<ShutdownController>,
    halted: AtomicBool,
    fatal_tx: broadcast::Sender<String>,
}

impl BlockChain {
    /// Build a chain over `db` and `dag`, bootstrapping genesis on first
    /// use.
    pub fn new(
        config: ChainConfig,
        db: Arc<dyn Database>,
        mut dag: Box<dyn BlockDag>,
        mut services: ChainServices,
    ) -> Result<Self, ChainError> {
        let params = config.params();
        if config.enable_metrics && services.metrics.is_none() {
            let metrics = ChainMetrics::new()
                .map_err(|e| ChainError::Config(format!("cannot register metrics: {}", e)))?;
            services.metrics = Some(Arc::new(metrics));
        }
        let genesis_hash = params.genesis_hash();

        if !dag.has_block(&genesis_hash) {
            let added = dag.add_block(&params.genesis)?;
            dag.mark_valid(added.node.id);
            dag.update_weight(added.node.id);
            dag.commit()?;
        }

        let record = match db.view(|txn: &dyn ReadTxn| Ok::<_, ChainError>(fetch_best_state(txn)?))? {
            Some(record) => {
                if !dag.has_block(&record.state.hash) {
                    return Err(ChainError::Config(format!(
                        "stored tip {} is unknown to the DAG",
                        record.state.hash
                    )));
                }
                tracing::info!(
                    tip = %record.state.hash,
                    order = record.state.main_order(),
                    total_txns = record.state.total_txns,
                    "loaded best state"
                );
                record
            }
            None => init_genesis(db.as_ref(), dag.as_ref(), &params)?,
        };

        let shutdown = Arc::new(ShutdownController::new(config.shutdown_marker.clone()));
        if let Some(hash) = shutdown.interrupted_commit()? {
            tracing::warn!(hash = %hash, "previous run stopped while committing a block");
        }

        let mut chain_work = HashMap::new();
        if let Some(tip) = dag.node(&record.state.hash) {
            chain_work.insert(tip.id, record.work_sum);
        }

        let (fatal_tx, _) = broadcast::channel(FATAL_CHANNEL_CAPACITY);
        Ok(Self {
            orphans: Mutex::new(OrphanPool::new(config.max_orphans, config.orphan_ttl_secs)),
            state: RwLock::new(ChainState {
                dag,
                pruner: Pruner::new(config.prune_interval_secs),
                work_sum: record.work_sum,
                chain_work,
            }),
            best: RwLock::new(Arc::new(record.state)),
            params,
            config,
            db,
            services,
            events: RwLock::new(EventBus::new()),
            shutdown,
            halted: AtomicBool::new(false),
            fatal_tx,
        })
    }

    /// Open the LMDB store under `config.data_dir` and build a chain on it.
    pub fn open(
        config: ChainConfig,
        dag: Box<dyn BlockDag>,
        services: ChainServices,
    ) -> Result<Self, ChainError> {
        let env = LmdbEnvironment::open(Path::new(&config.data_dir), 8, config.map_size)
            .map_err(|e| ChainError::Store(e.into()))?;
        Self::new(config, Arc::new(env), dag, services)
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Current best-state snapshot. Cheap to clone and never mutated.
    pub fn best_snapshot(&self) -> Arc<BestState> {
        Arc::clone(&self.best.read())
    }

    /// Cumulative main-chain work.
    pub fn work_sum(&self) -> u128 {
        self.state.read().work_sum
    }

    pub fn dag_node(&self, hash: &BlockHash) -> Option<DagNode> {
        self.state.read().dag.node(hash)
    }

    pub fn block_hash_by_order(&self, order: u64) -> Option<BlockHash> {
        self.state.read().dag.hash_by_order(order)
    }

    pub fn is_on_main_chain(&self, hash: &BlockHash) -> bool {
        let state = self.state.read();
        state
            .dag
            .node(hash)
            .is_some_and(|node| state.dag.is_on_main_chain(node.id))
    }

    /// Whether the DAG or the orphan pool holds `hash`.
    pub fn have_block(&self, hash: &BlockHash) -> bool {
        self.state.read().dag.has_block(hash) || self.orphans.lock().contains(hash)
    }

    pub fn is_orphan(&self, hash: &BlockHash) -> bool {
        self.orphans.lock().contains(hash)
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans.lock().len()
    }

    /// Raw block body from the store.
    pub fn fetch_block(&self, hash: &BlockHash) -> Result<Option<Block>, ChainError> {
        self.db
            .view(|txn: &dyn ReadTxn| Ok::<_, ChainError>(fetch_block(txn, hash)?))
    }

    /// Register a listener invoked inline for every event.
    pub fn subscribe(&self, listener: Box<dyn Fn(&ChainEvent) + Send + Sync>) {
        self.events.write().subscribe(listener);
    }

    /// Receive events through a bounded queue.
    pub fn subscribe_channel(&self) -> mpsc::Receiver<ChainEvent> {
        self.events
            .write()
            .subscribe_channel(self.config.notification_queue_capacity)
    }

    /// Reasons of fatal errors, delivered once each.
    pub fn subscribe_fatal(&self) -> broadcast::Receiver<String> {
        self.fatal_tx.subscribe()
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    pub fn shutdown_controller(&self) -> &Arc<ShutdownController> {
        &self.shutdown
    }

    /// Metrics in use, injected or created from `enable_metrics`.
    pub fn chain_metrics(&self) -> Option<&Arc<ChainMetrics>> {
        self.services.metrics.as_ref()
    }

    pub(crate) fn metrics(&self) -> Option<&ChainMetrics> {
        self.services.metrics.as_deref()
    }

    /// Latch the halted flag and broadcast `reason`. Returns the error to
    /// hand back to the caller.
    pub(crate) fn fatal(&self, reason: impl Into<String>) -> ChainError {
        let reason = reason.into();
        tracing::error!(reason = %reason, "fatal chain error, halting admissions");
        self.halted.store(true, Ordering::SeqCst);
        let _ = self.fatal_tx.send(reason.clone());
        ChainError::Fatal(reason)
    }

    /// Load a block the DAG references. Its body must be in the store.
    pub(crate) fn load_block(&self, hash: &BlockHash) -> Result<Arc<Block>, ChainError> {
        self.fetch_block(hash)?
            .map(Arc::new)
            .ok_or_else(|| LedgerError::MissingBlock(*hash).into())
    }

    pub(crate) fn node_by_id(dag: &dyn BlockDag, id: BlockId) -> Result<DagNode, ChainError> {
        dag.node_by_id(id)
            .ok_or_else(|| ChainError::Structural(format!("oracle has no block {}", id)))
    }
}

/// Persist genesis and its effects on an empty store.
fn init_genesis(
    db: &dyn Database,
    dag: &dyn BlockDag,
    params: &NetworkParams,
) -> Result<BestStateRecord, ChainError> {
    let genesis = &params.genesis;
    let genesis_hash = genesis.hash();
    let node = dag
        .node(&genesis_hash)
        .ok_or_else(|| ChainError::Config("DAG has no genesis block".into()))?;
    let block_size = genesis
        .serialized_size()
        .map_err(|e| LedgerError::Serialization(e.to_string()))?;

    let record = db.update(|txn: &mut dyn WriteTxn| {
        store_block(txn, genesis)?;
        let mut view = UtxoView::new();
        let mut stxos = Vec::new();
        connect_transactions(&*txn, &mut view, genesis, &genesis_hash, Some(&mut stxos))?;
        put_utxo_view(txn, &view)?;
        put_spend_journal(txn, &genesis_hash, &stxos)?;
        connect_token_state(txn, genesis)?;

        let num_txns = genesis.transactions.len() as u64;
        let record = BestStateRecord {
            state: BestState {
                hash: genesis_hash,
                difficulty: genesis.header.difficulty,
                block_size,
                num_txns,
                total_txns: num_txns,
                median_time: genesis.timestamp(),
                weight: node.weight,
                graph_state: dag.graph_state(),
                token_tip: token_tip(&*txn)?,
            },
            work_sum: calc_work(genesis.header.difficulty),
        };
        put_best_state(txn, &record)?;
        Ok::<_, ChainError>(record)
    })?;

    tracing::info!(genesis = %genesis_hash, network = params.network.as_str(), "initialized chain state");
    Ok(record)
}
