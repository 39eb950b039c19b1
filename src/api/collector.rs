//! Scrape Collector
//!
//! Gathers the current snapshot of every provider for one scrape. Only
//! loads already published snapshots: no I/O, no locks.

use std::sync::Arc;

use crate::api::metrics::ExporterStats;
use crate::provider::MetricsProvider;
use crate::snapshot::MetricSnapshot;

pub struct ScrapeCollector {
    providers: Vec<Arc<dyn MetricsProvider>>,
    stats: Arc<ExporterStats>,
}

impl ScrapeCollector {
    pub fn new(providers: Vec<Arc<dyn MetricsProvider>>, stats: Arc<ExporterStats>) -> Self {
        Self { providers, stats }
    }

    /// Current snapshot of every provider, in registration order
    pub fn collect(&self) -> Vec<Arc<MetricSnapshot>> {
        self.providers.iter().map(|p| p.current_metrics()).collect()
    }

    /// Prometheus text exposition of all providers plus self-metrics
    pub fn render(&self) -> String {
        let mut output = String::new();
        for snapshot in self.collect() {
            output.push_str(&snapshot.to_prometheus());
        }
        output.push_str(&self.stats.snapshot().to_prometheus());
        output
    }

    /// JSON view of the same data
    pub fn to_json(&self) -> serde_json::Value {
        let families: Vec<_> = self
            .collect()
            .iter()
            .flat_map(|snapshot| snapshot.families.iter().cloned())
            .collect();

        serde_json::json!({
            "families": families,
            "exporter": self.stats.to_json(),
        })
    }
}
