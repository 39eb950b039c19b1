//! Metrics Providers
//!
//! An [`Exporter`] pairs one observation source with its own snapshot
//! store. The polling loop drives [`Poll::process`]; the scrape side only
//! ever sees the [`MetricsProvider`] capability.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::api::metrics::ExporterStats;
use crate::snapshot::MetricSnapshot;
use crate::source::PeerSource;
use crate::store::SnapshotStore;
use crate::types::PeerBook;

/// Anything that can hand out its current metrics without blocking
pub trait MetricsProvider: Send + Sync {
    fn current_metrics(&self) -> Arc<MetricSnapshot>;
}

/// One reconciliation pass, driven by the polling loop
#[async_trait]
pub trait Poll: Send + Sync {
    async fn process(&self);
}

/// Reconciles one source against the configured peers
pub struct Exporter<S> {
    book: Arc<PeerBook>,
    source: S,

    /// `instance_name` label, the host of the RPC URL
    instance_name: String,

    store: SnapshotStore,
    stats: Arc<ExporterStats>,
}

impl<S: PeerSource> Exporter<S> {
    pub fn new(
        book: Arc<PeerBook>,
        source: S,
        instance_name: impl Into<String>,
        stats: Arc<ExporterStats>,
    ) -> Self {
        Self {
            book,
            source,
            instance_name: instance_name.into(),
            store: SnapshotStore::new(),
            stats,
        }
    }

    /// Observe, reconcile and publish one snapshot.
    ///
    /// A transport failure is logged and counted, then treated as zero
    /// observed peers, so every configured peer reports absent.
    pub async fn run_pass(&self) {
        let kind = self.source.kind();

        let observed = match self.source.observe(&self.book).await {
            Ok(observed) => observed,
            Err(e) => {
                warn!("{} >> Observing peers failed: {}", kind, e);
                self.stats.inc_source_failure(kind);
                Vec::new()
            }
        };

        if self.source.reports_peer_count() {
            self.stats.set_observed_peers(observed.len() as u64);
        }

        let snapshot = self
            .source
            .project(&self.book, &observed, &self.instance_name);

        info!(
            "{} >> Publishing {} samples for {} observed / {} configured peers - instance_name={}",
            kind,
            snapshot.sample_count(),
            observed.len(),
            self.book.len(),
            self.instance_name
        );

        self.store.publish(snapshot);
        self.stats.inc_passes();
    }
}

impl<S: PeerSource> MetricsProvider for Exporter<S> {
    fn current_metrics(&self) -> Arc<MetricSnapshot> {
        self.store.current()
    }
}

#[async_trait]
impl<S: PeerSource> Poll for Exporter<S> {
    async fn process(&self) {
        self.run_pass().await
    }
}

/// Run every poller once per interval until `shutdown` turns true.
///
/// The first round starts immediately. Pollers run one after another, so
/// passes of the same provider never overlap.
pub async fn run_polling(
    pollers: Vec<Arc<dyn Poll>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                // Sender dropped
                if changed.is_err() {
                    break;
                }
            }
        }
        if *shutdown.borrow() {
            break;
        }

        info!("Preparing metrics");
        for poller in &pollers {
            poller.process().await;
        }
        info!("Done. Sleeping for {}s", interval.as_secs_f64());
    }

    info!("Polling stopped");
}
