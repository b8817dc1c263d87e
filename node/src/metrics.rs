//! Prometheus metrics for the Meridian node.
//!
//! Covers transaction admission, sub-block assembly and commit outcomes,
//! and the current size of each pipeline stage. [`NodeMetrics`] owns a
//! dedicated [`Registry`]; [`NodeMetrics::encode`] renders it in the
//! Prometheus text exposition format.

use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge,
    Opts, Registry, TextEncoder,
};

/// Central collection of all node-level Prometheus metrics.
pub struct NodeMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Transactions accepted into the pool.
    pub transactions_submitted: IntCounter,
    /// Transactions refused at submission (verification, duplicate, pool full).
    pub transactions_rejected: IntCounter,
    pub sub_blocks_assembled: IntCounter,
    pub sub_blocks_committed: IntCounter,
    /// Commit attempts that ended with the sub-block rejected.
    pub sub_blocks_rejected: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub pool_size: IntGauge,
    /// Sub-blocks assembled but not yet committed or released.
    pub pending_sub_blocks: IntGauge,
    pub difficulty: IntGauge,
    pub ledger_height: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    /// Assembly-to-commit latency, in milliseconds.
    pub commit_latency_ms: Histogram,
}

impl NodeMetrics {
    /// Create a fresh set of metrics, all registered under a new
    /// [`Registry`].
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Counters
        let transactions_submitted = register_int_counter_with_registry!(
            Opts::new(
                "meridian_transactions_submitted_total",
                "Transactions accepted into the pool"
            ),
            registry
        )?;

        let transactions_rejected = register_int_counter_with_registry!(
            Opts::new(
                "meridian_transactions_rejected_total",
                "Transactions refused at submission"
            ),
            registry
        )?;

        let sub_blocks_assembled = register_int_counter_with_registry!(
            Opts::new(
                "meridian_sub_blocks_assembled_total",
                "Sub-blocks cut from the pool"
            ),
            registry
        )?;

        let sub_blocks_committed = register_int_counter_with_registry!(
            Opts::new(
                "meridian_sub_blocks_committed_total",
                "Sub-blocks appended to the ledger"
            ),
            registry
        )?;

        let sub_blocks_rejected = register_int_counter_with_registry!(
            Opts::new(
                "meridian_sub_blocks_rejected_total",
                "Sub-blocks rejected at commit"
            ),
            registry
        )?;

        // Gauges
        let pool_size = register_int_gauge_with_registry!(
            Opts::new("meridian_pool_size", "Transactions waiting in the pool"),
            registry
        )?;

        let pending_sub_blocks = register_int_gauge_with_registry!(
            Opts::new(
                "meridian_pending_sub_blocks",
                "Sub-blocks awaiting commit"
            ),
            registry
        )?;

        let difficulty = register_int_gauge_with_registry!(
            Opts::new("meridian_difficulty", "Current difficulty level"),
            registry
        )?;

        let ledger_height = register_int_gauge_with_registry!(
            Opts::new("meridian_ledger_height", "Committed sub-blocks in the ledger"),
            registry
        )?;

        // Exponential buckets covering 1 ms → ~16 s.
        let commit_latency_ms = register_histogram_with_registry!(
            HistogramOpts::new(
                "meridian_commit_latency_ms",
                "Assembly-to-commit latency in milliseconds"
            )
            .buckets(prometheus::exponential_buckets(1.0, 2.0, 15)?),
            registry
        )?;

        Ok(Self {
            registry,
            transactions_submitted,
            transactions_rejected,
            sub_blocks_assembled,
            sub_blocks_committed,
            sub_blocks_rejected,
            pool_size,
            pending_sub_blocks,
            difficulty,
            ledger_height,
            commit_latency_ms,
        })
    }

    /// Render every metric in the text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_lists_registered_metrics() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.sub_blocks_committed.inc();
        metrics.pool_size.set(7);
        metrics.commit_latency_ms.observe(12.0);

        let text = metrics.encode().unwrap();
        assert!(text.contains("meridian_sub_blocks_committed_total 1"));
        assert!(text.contains("meridian_pool_size 7"));
        assert!(text.contains("meridian_commit_latency_ms_count 1"));
    }

    #[test]
    fn instances_do_not_share_registries() {
        let a = NodeMetrics::new().unwrap();
        let b = NodeMetrics::new().unwrap();
        a.transactions_submitted.inc();
        assert_eq!(b.transactions_submitted.get(), 0);
    }
}
