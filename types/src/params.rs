//! Consensus parameters for each network.
//!
//! These are fixed per network and never loaded from configuration files;
//! the node selects a set by [`NetworkId`].

use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::block::{Block, BlockHash, BlockHeader};
use crate::network::NetworkId;
use crate::pow::Target;
use crate::time::Timestamp;
use crate::transaction::{OutPoint, Transaction, TxIn, TxKind, TxOut};

/// A known-good block. Blocks timestamped before the latest checkpoint in
/// the DAG are rejected outright.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub hash: BlockHash,
    pub timestamp: Timestamp,
    pub difficulty: u32,
}

#[derive(Clone, Debug)]
pub struct NetworkParams {
    pub network: NetworkId,
    pub genesis: Block,
    pub checkpoints: Vec<Checkpoint>,

    // ── Proof of work ───────────────────────────────────────────────────
    /// Easiest target any block may carry, in compact form.
    pub pow_limit_bits: u32,
    /// Length of one retarget window in seconds.
    pub target_timespan_secs: u64,
    /// Largest factor the target may move by in one window.
    pub retarget_adjustment_factor: u32,

    // ── Block shape ─────────────────────────────────────────────────────
    pub max_block_size: u64,
    pub max_parents: usize,
    /// Number of main-chain ancestors the past median time is taken over.
    pub median_time_blocks: usize,
    /// How far past the local clock a block timestamp may lie.
    pub max_future_block_secs: u64,

    // ── Rewards ─────────────────────────────────────────────────────────
    /// Primary-coin subsidy paid by every coinbase, in atoms.
    pub base_subsidy: u64,
    /// Main-height distance before a coinbase output may be spent.
    pub coinbase_maturity: u64,
}

/// Locking script of the genesis reward output.
const GENESIS_SCRIPT: &[u8] = &[0x51];

impl NetworkParams {
    pub fn for_network(network: NetworkId) -> Self {
        match network {
            NetworkId::Mainnet => Self::mainnet(),
            NetworkId::Testnet => Self::testnet(),
            NetworkId::Regtest => Self::regtest(),
        }
    }

    pub fn mainnet() -> Self {
        let pow_limit_bits = 0x1d00ffff;
        Self {
            network: NetworkId::Mainnet,
            genesis: genesis_block(Timestamp::new(1_700_000_000), pow_limit_bits, 12_000_000_000),
            checkpoints: Vec::new(),
            pow_limit_bits,
            target_timespan_secs: 30 * 30,
            retarget_adjustment_factor: 2,
            max_block_size: 1_310_720,
            max_parents: 50,
            median_time_blocks: 11,
            max_future_block_secs: 2 * 60 * 60,
            base_subsidy: 12_000_000_000,
            coinbase_maturity: 720,
        }
    }

    pub fn testnet() -> Self {
        let pow_limit_bits = 0x1f0198f2;
        Self {
            network: NetworkId::Testnet,
            genesis: genesis_block(Timestamp::new(1_690_000_000), pow_limit_bits, 12_000_000_000),
            checkpoints: Vec::new(),
            pow_limit_bits,
            target_timespan_secs: 15 * 30,
            retarget_adjustment_factor: 2,
            max_block_size: 1_310_720,
            max_parents: 50,
            median_time_blocks: 11,
            max_future_block_secs: 2 * 60 * 60,
            base_subsidy: 12_000_000_000,
            coinbase_maturity: 720,
        }
    }

    /// Trivial proof-of-work and immediately spendable coinbases.
    pub fn regtest() -> Self {
        let pow_limit_bits = 0x207fffff;
        Self {
            network: NetworkId::Regtest,
            genesis: genesis_block(Timestamp::new(1_600_000_000), pow_limit_bits, 5_000_000_000),
            checkpoints: Vec::new(),
            pow_limit_bits,
            target_timespan_secs: 60,
            retarget_adjustment_factor: 4,
            max_block_size: 1_310_720,
            max_parents: 50,
            median_time_blocks: 11,
            max_future_block_secs: 2 * 60 * 60,
            base_subsidy: 5_000_000_000,
            coinbase_maturity: 0,
        }
    }

    pub fn genesis_hash(&self) -> BlockHash {
        self.genesis.hash()
    }

    pub fn pow_limit(&self) -> Target {
        Target::from_compact(self.pow_limit_bits).unwrap_or(Target::MAX)
    }

    /// Longest span over which the target may loosen by one adjustment factor.
    pub fn max_retarget_timespan_secs(&self) -> u64 {
        self.target_timespan_secs
            .saturating_mul(self.retarget_adjustment_factor as u64)
    }
}

/// Genesis carries a single coinbase paying `subsidy` to [`GENESIS_SCRIPT`].
fn genesis_block(timestamp: Timestamp, bits: u32, subsidy: u64) -> Block {
    let coinbase = Transaction {
        version: 1,
        kind: TxKind::Coinbase,
        inputs: vec![TxIn::new(OutPoint::NULL)],
        outputs: vec![TxOut::new(Amount::primary(subsidy), GENESIS_SCRIPT.to_vec())],
        lock_time: 0,
    };
    let transactions = vec![coinbase];
    Block {
        header: BlockHeader {
            version: 1,
            parents: Vec::new(),
            tx_root: Block::compute_tx_root(&transactions),
            timestamp,
            difficulty: bits,
            nonce: 0,
        },
        transactions,
    }
}
