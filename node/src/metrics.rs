//! Prometheus metrics for the admission engine.
//!
//! [`ChainMetrics`] owns a dedicated [`Registry`] that a host can encode
//! into the Prometheus text exposition format.

use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge,
    Opts, Registry, TextEncoder,
};

pub struct ChainMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Blocks submitted to `process_block`.
    pub blocks_processed: IntCounter,
    /// Blocks added to the DAG, orphans promoted later included.
    pub blocks_accepted: IntCounter,
    /// Blocks parked in the orphan pool.
    pub blocks_orphaned: IntCounter,
    /// Blocks rejected for a rule violation.
    pub blocks_rejected: IntCounter,
    /// Ordered blocks whose effects were applied (or indexed, if invalid).
    pub blocks_connected: IntCounter,
    /// Blocks whose effects were reversed by a reorganization.
    pub blocks_disconnected: IntCounter,
    pub reorgs: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub orphan_count: IntGauge,
    /// Order of the main-chain tip.
    pub main_order: IntGauge,
    /// Transactions admitted since genesis.
    pub total_txns: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    /// Time spent accepting one block under the exclusive lock, in milliseconds.
    pub accept_time_ms: Histogram,
}

impl ChainMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Counters
        let blocks_processed = register_int_counter_with_registry!(
            Opts::new("dagchain_blocks_processed_total", "Blocks submitted for processing"),
            registry
        )?;
        let blocks_accepted = register_int_counter_with_registry!(
            Opts::new("dagchain_blocks_accepted_total", "Blocks added to the DAG"),
            registry
        )?;
        let blocks_orphaned = register_int_counter_with_registry!(
            Opts::new("dagchain_blocks_orphaned_total", "Blocks parked as orphans"),
            registry
        )?;
        let blocks_rejected = register_int_counter_with_registry!(
            Opts::new("dagchain_blocks_rejected_total", "Blocks rejected by consensus rules"),
            registry
        )?;
        let blocks_connected = register_int_counter_with_registry!(
            Opts::new("dagchain_blocks_connected_total", "Ordered blocks connected"),
            registry
        )?;
        let blocks_disconnected = register_int_counter_with_registry!(
            Opts::new("dagchain_blocks_disconnected_total", "Blocks disconnected by reorganizations"),
            registry
        )?;
        let reorgs = register_int_counter_with_registry!(
            Opts::new("dagchain_reorgs_total", "Reorganizations of the block order"),
            registry
        )?;

        // Gauges
        let orphan_count = register_int_gauge_with_registry!(
            Opts::new("dagchain_orphan_count", "Blocks currently in the orphan pool"),
            registry
        )?;
        let main_order = register_int_gauge_with_registry!(
            Opts::new("dagchain_main_order", "Order of the main-chain tip"),
            registry
        )?;
        let total_txns = register_int_gauge_with_registry!(
            Opts::new("dagchain_total_txns", "Transactions admitted since genesis"),
            registry
        )?;

        // Histograms – exponential buckets covering 0.1 ms → ~1.6 s.
        let accept_time_ms = register_histogram_with_registry!(
            HistogramOpts::new("dagchain_accept_time_ms", "Block acceptance time in milliseconds")
                .buckets(prometheus::exponential_buckets(0.1, 2.0, 15)?),
            registry
        )?;

        Ok(Self {
            registry,
            blocks_processed,
            blocks_accepted,
            blocks_orphaned,
            blocks_rejected,
            blocks_connected,
            blocks_disconnected,
            reorgs,
            orphan_count,
            main_order,
            total_txns,
            accept_time_ms,
        })
    }

    /// Encode every metric in the text exposition format.
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registries_are_independent() {
        let a = ChainMetrics::new().unwrap();
        let b = ChainMetrics::new().unwrap();
        a.blocks_processed.inc();
        assert_eq!(a.blocks_processed.get(), 1);
        assert_eq!(b.blocks_processed.get(), 0);
    }

    #[test]
    fn text_encoding_names_every_family() {
        let metrics = ChainMetrics::new().unwrap();
        metrics.reorgs.inc();
        metrics.accept_time_ms.observe(3.0);
        let text = metrics.encode_text().unwrap();
        assert!(text.contains("dagchain_reorgs_total 1"));
        assert!(text.contains("dagchain_accept_time_ms_bucket"));
        assert!(text.contains("dagchain_orphan_count"));
    }
}
