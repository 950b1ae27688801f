use crate::config::EngineConfig;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Metrics {
    pub queries_total: AtomicU64,
    pub queries_slow_total: AtomicU64,
    pub writes_total: AtomicU64,
    pub cancelled_total: AtomicU64,
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queries_total: u64,
    pub queries_slow_total: u64,
    pub writes_total: u64,
    pub cancelled_total: u64,
}

pub struct Telemetry {
    slow_query_ms: AtomicU64,
    pub metrics: Metrics,
    // tests can capture audit lines in memory
    audit_sink: RwLock<Option<Arc<RwLock<Vec<String>>>>>,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self {
            slow_query_ms: AtomicU64::new(EngineConfig::default().slow_query_ms),
            metrics: Metrics::default(),
            audit_sink: RwLock::new(None),
        }
    }
}

pub(crate) static TELEMETRY: std::sync::LazyLock<Telemetry> = std::sync::LazyLock::new(Telemetry::default);

pub fn configure(cfg: &EngineConfig) {
    set_slow_query_ms(cfg.slow_query_ms);
}

pub fn set_slow_query_ms(ms: u64) {
    TELEMETRY.slow_query_ms.store(ms, Ordering::Relaxed);
}

#[must_use]
pub fn slow_query_ms() -> u64 {
    TELEMETRY.slow_query_ms.load(Ordering::Relaxed)
}

pub fn set_audit_sink_for_tests(sink: Arc<RwLock<Vec<String>>>) {
    *TELEMETRY.audit_sink.write() = Some(sink);
}

fn now_ts() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn sha256_hex(input: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut h = Sha256::new();
    h.update(input.as_bytes());
    hex::encode(h.finalize())
}

/// Counts a finished query and reports it on `objrepo::metrics` when it ran slow.
/// The filter appears only as a hash so record values never reach the log.
pub fn log_query(collection: &str, filter_desc: &str, duration_ms: u64, result_count: usize) {
    TELEMETRY.metrics.queries_total.fetch_add(1, Ordering::Relaxed);
    if duration_ms < slow_query_ms() {
        return;
    }
    TELEMETRY.metrics.queries_slow_total.fetch_add(1, Ordering::Relaxed);
    let line = serde_json::json!({
        "ts": now_ts(),
        "collection": collection,
        "filter_hash": sha256_hex(filter_desc),
        "duration_ms": duration_ms,
        "result_count": result_count,
        "slow": true
    });
    log::warn!(target: "objrepo::metrics", "{line}");
}

pub fn record_write(op: &str, collection: &str, doc_id: &str) {
    TELEMETRY.metrics.writes_total.fetch_add(1, Ordering::Relaxed);
    let line = serde_json::json!({
        "ts": now_ts(), "op": op, "collection": collection, "doc_id": doc_id
    })
    .to_string();
    let sink = TELEMETRY.audit_sink.read().clone();
    if let Some(sink) = sink {
        sink.write().push(line.clone());
    }
    log::info!(target: "objrepo::audit", "{line}");
}

pub fn record_cancelled(collection: &str) {
    TELEMETRY.metrics.cancelled_total.fetch_add(1, Ordering::Relaxed);
    log::debug!("cursor on `{collection}` cancelled");
}

#[must_use]
pub fn metrics_snapshot() -> MetricsSnapshot {
    let m = &TELEMETRY.metrics;
    MetricsSnapshot {
        queries_total: m.queries_total.load(Ordering::Relaxed),
        queries_slow_total: m.queries_slow_total.load(Ordering::Relaxed),
        writes_total: m.writes_total.load(Ordering::Relaxed),
        cancelled_total: m.cancelled_total.load(Ordering::Relaxed),
    }
}

/// OpenMetrics text for the counters above.
#[must_use]
pub fn metrics_text() -> String {
    let m = metrics_snapshot();
    format!(
        "objrepo_queries_total {}\n\
         objrepo_queries_slow_total {}\n\
         objrepo_writes_total {}\n\
         objrepo_cancelled_total {}\n",
        m.queries_total, m.queries_slow_total, m.writes_total, m.cancelled_total,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_hash_is_stable_hex() {
        let a = sha256_hex("empId == 3");
        assert_eq!(a.len(), 64);
        assert_eq!(a, sha256_hex("empId == 3"));
        assert_ne!(a, sha256_hex("empId == 4"));
    }

    #[test]
    fn counters_only_grow() {
        let before = metrics_snapshot();
        log_query("t", "ALL", 0, 0);
        record_cancelled("t");
        let after = metrics_snapshot();
        assert!(after.queries_total > before.queries_total);
        assert!(after.cancelled_total > before.cancelled_total);
        assert!(metrics_text().contains("objrepo_queries_total"));
    }
}
