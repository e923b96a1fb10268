//! Prometheus metrics for the consensus/mempool/executor/transport
//! pipeline.

use once_cell::sync::OnceCell;
use prometheus::{
    exponential_buckets, register_gauge, register_histogram, register_int_counter, register_int_counter_vec, Gauge, Histogram, IntCounter, IntCounterVec,
};

static CONNECTED_PEERS: OnceCell<Gauge> = OnceCell::new();
static MEMPOOL_PACKETS: OnceCell<Gauge> = OnceCell::new();
static EXECUTOR_QUEUE_DEPTH: OnceCell<Gauge> = OnceCell::new();
static BLOCKS_WRITTEN_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static BIG_BANGS_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static ROUND_DURATION_SECONDS: OnceCell<Histogram> = OnceCell::new();
static ERRORS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();

#[derive(Debug, Clone, Copy)]
pub struct Metrics;

macro_rules! get_metric {
    ($metric:ident) => {
        $metric.get().expect("metrics::install() must run before use")
    };
}

impl Metrics {
    pub fn set_connected_peers(&self, count: i64) {
        get_metric!(CONNECTED_PEERS).set(count as f64);
    }

    pub fn set_mempool_packets(&self, count: usize) {
        get_metric!(MEMPOOL_PACKETS).set(count as f64);
    }

    pub fn set_executor_queue_depth(&self, depth: usize) {
        get_metric!(EXECUTOR_QUEUE_DEPTH).set(depth as f64);
    }

    pub fn inc_blocks_written(&self) {
        get_metric!(BLOCKS_WRITTEN_TOTAL).inc();
    }

    pub fn inc_big_bangs(&self) {
        get_metric!(BIG_BANGS_TOTAL).inc();
    }

    pub fn observe_round_duration(&self, seconds: f64) {
        get_metric!(ROUND_DURATION_SECONDS).observe(seconds);
    }

    pub fn inc_error(&self, component: &'static str, code: &'static str) {
        get_metric!(ERRORS_TOTAL).with_label_values(&[component, code]).inc();
    }
}

/// Registers every collector with the default Prometheus registry.
/// Must run exactly once at startup, before any [`Metrics`] method is
/// called.
pub fn install() -> Result<Metrics, prometheus::Error> {
    CONNECTED_PEERS
        .set(register_gauge!("concord_connected_peers", "Current number of confirmed neighbours.")?)
        .expect("installed twice");
    MEMPOOL_PACKETS
        .set(register_gauge!("concord_mempool_packets", "Transaction packets currently held by the conveyer.")?)
        .expect("installed twice");
    EXECUTOR_QUEUE_DEPTH
        .set(register_gauge!("concord_executor_queue_depth", "Total queued smart-contract invocations across all contracts.")?)
        .expect("installed twice");
    BLOCKS_WRITTEN_TOTAL
        .set(register_int_counter!("concord_blocks_written_total", "Total blocks this node has finalized and stored.")?)
        .expect("installed twice");
    BIG_BANGS_TOTAL
        .set(register_int_counter!("concord_big_bangs_total", "Total accepted big-bang resets.")?)
        .expect("installed twice");
    ROUND_DURATION_SECONDS
        .set(register_histogram!(
            "concord_round_duration_seconds",
            "Wall-clock time from round-table receipt to Stage3 finalization.",
            exponential_buckets(0.05, 2.0, 12)?
        )?)
        .expect("installed twice");
    ERRORS_TOTAL
        .set(register_int_counter_vec!("concord_errors_total", "Total errors by component and stable error code.", &["component", "code"])?)
        .expect("installed twice");

    Ok(Metrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_is_idempotent_safe_to_call_once() {
        let metrics = install().expect("first install succeeds");
        metrics.set_connected_peers(3);
        metrics.inc_blocks_written();
    }
}
