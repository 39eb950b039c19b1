//! Peer Observation Sources
//!
//! Each source turns one transport's raw response into [`ObservedPeer`]s
//! and picks the gauge families its observations are projected into.
//!
//! - [`RpcSource`]: `admin_peers` on the node's JSON-RPC endpoint
//! - [`ProbeSource`]: TCP connect to every configured peer

pub mod probe;
pub mod rpc;

pub use probe::ProbeSource;
pub use rpc::RpcSource;

use async_trait::async_trait;
use std::fmt;

use crate::snapshot::MetricSnapshot;
use crate::types::{ObservedPeer, PeerBook};

/// Which transport a source observes through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Rpc,
    Probe,
}

impl SourceKind {
    /// Value of the `source` label
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Rpc => "rpc",
            SourceKind::Probe => "probe",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transport observing which peers are currently connected
#[async_trait]
pub trait PeerSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Whether this source's observation count is the node's peer count
    fn reports_peer_count(&self) -> bool {
        false
    }

    /// Observe the currently connected peers
    async fn observe(&self, book: &PeerBook) -> Result<Vec<ObservedPeer>, SourceError>;

    /// Project one pass worth of observations into metric families
    fn project(&self, book: &PeerBook, observed: &[ObservedPeer], instance_name: &str) -> MetricSnapshot;
}

/// Transport failure while observing peers
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP error status {0}")]
    Status(u16),

    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("all {failed} connectivity checks failed locally, last error: {last}")]
    Probe { failed: usize, last: std::io::Error },
}
