//! Exporter self-metrics
//!
//! Counters about the exporter's own polling, exposed next to the peer
//! families.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::snapshot::{MetricFamily, MetricSnapshot};
use crate::source::SourceKind;

/// Counters updated by the polling loop
#[derive(Default)]
pub struct ExporterStats {
    /// Start time for uptime calculation
    start_time: Option<Instant>,

    /// Completed reconciliation passes (all providers)
    pub passes: AtomicU64,

    /// Failed `admin_peers` calls
    pub rpc_failures: AtomicU64,

    /// Failed probe rounds
    pub probe_failures: AtomicU64,

    /// Peers returned by the last `admin_peers` call
    pub observed_peers: AtomicU64,
}

impl ExporterStats {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0)
    }

    pub fn inc_passes(&self) {
        self.passes.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a failed observation for the given source kind
    pub fn inc_source_failure(&self, kind: SourceKind) {
        self.failures(kind).fetch_add(1, Ordering::Relaxed);
    }

    fn failures(&self, kind: SourceKind) -> &AtomicU64 {
        match kind {
            SourceKind::Rpc => &self.rpc_failures,
            SourceKind::Probe => &self.probe_failures,
        }
    }

    pub fn set_observed_peers(&self, count: u64) {
        self.observed_peers.store(count, Ordering::Relaxed);
    }

    /// Families for the Prometheus endpoint
    pub fn snapshot(&self) -> MetricSnapshot {
        let mut uptime = MetricFamily::gauge(
            "quorum_peers_exporter_uptime_seconds",
            "Exporter uptime in seconds",
            &[],
        );
        uptime.push(Vec::<String>::new(), self.uptime_secs() as f64);

        let mut passes = MetricFamily::counter(
            "quorum_peers_exporter_passes_total",
            "Completed reconciliation passes",
            &[],
        );
        passes.push(Vec::<String>::new(), self.passes.load(Ordering::Relaxed) as f64);

        let mut failures = MetricFamily::counter(
            "quorum_peers_exporter_source_failures_total",
            "Failed peer observations by source",
            &["source"],
        );
        for kind in [SourceKind::Rpc, SourceKind::Probe] {
            failures.push([kind.as_str()], self.failures(kind).load(Ordering::Relaxed) as f64);
        }

        let mut observed = MetricFamily::gauge(
            "quorum_peers_exporter_observed_peers",
            "Peers returned by the last admin_peers call",
            &[],
        );
        observed.push(
            Vec::<String>::new(),
            self.observed_peers.load(Ordering::Relaxed) as f64,
        );

        MetricSnapshot::new(vec![uptime, passes, failures, observed])
    }

    /// Export as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "uptime_secs": self.uptime_secs(),
            "passes": self.passes.load(Ordering::Relaxed),
            "source_failures": {
                "rpc": self.failures(SourceKind::Rpc).load(Ordering::Relaxed),
                "probe": self.failures(SourceKind::Probe).load(Ordering::Relaxed),
            },
            "observed_peers": self.observed_peers.load(Ordering::Relaxed),
        })
    }
}
