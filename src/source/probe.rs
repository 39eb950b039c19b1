//! TCP egress connectivity probe
//!
//! Checks from the exporter's own network position whether each configured
//! peer accepts a TCP connection on its p2p port. A peer that accepts is
//! reported as observed; the connection is closed right away.

use async_trait::async_trait;
use futures::future::join_all;
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

use super::{PeerSource, SourceError, SourceKind};
use crate::reconciler::reconcile_connectivity;
use crate::snapshot::MetricSnapshot;
use crate::types::{ConfiguredPeer, Direction, ObservedPeer, PeerBook, ProbeTarget};

/// Result of one connect attempt
#[derive(Debug)]
enum Outcome {
    Reachable,

    /// The peer refused, reset or did not answer in time
    Unreachable,

    /// The connect failed on our side (resolution, routing, permissions)
    LocalError(io::Error),
}

/// Whether a connect error was caused by the remote end or the path to it
fn is_remote_failure(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::TimedOut
    )
}

/// Connectivity probe over plain TCP connects
pub struct ProbeSource {
    timeout: Duration,
}

impl ProbeSource {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Try to connect once, bounded by the probe timeout
    async fn connect(&self, target: &ProbeTarget) -> Outcome {
        let connect = TcpStream::connect((target.address.as_str(), target.port));

        match tokio::time::timeout(self.timeout, connect).await {
            Ok(Ok(_stream)) => Outcome::Reachable,
            Ok(Err(e)) if is_remote_failure(&e) => {
                debug!("Cannot connect to {}:{}: {}", target.address, target.port, e);
                Outcome::Unreachable
            }
            Ok(Err(e)) => {
                debug!("Connect to {}:{} failed locally: {}", target.address, target.port, e);
                Outcome::LocalError(e)
            }
            Err(_) => {
                debug!("Connect to {}:{} timed out", target.address, target.port);
                Outcome::Unreachable
            }
        }
    }

    /// `None` for peers without a probe target
    async fn probe<'a>(&self, peer: &'a ConfiguredPeer) -> Option<(&'a ConfiguredPeer, Outcome)> {
        let target = peer.probe_target.as_ref()?;
        Some((peer, self.connect(target).await))
    }
}

fn observation(peer: &ConfiguredPeer) -> ObservedPeer {
    ObservedPeer {
        raw_address: Some(peer.raw_address.clone()),
        direction: Direction::Outbound,
        head_blocks: Default::default(),
        instance: String::new(),
    }
}

#[async_trait]
impl PeerSource for ProbeSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Probe
    }

    /// Fails only when every probed peer failed on our side, which means
    /// the probe itself cannot run from here.
    async fn observe(&self, book: &PeerBook) -> Result<Vec<ObservedPeer>, SourceError> {
        let results: Vec<_> = join_all(book.iter().map(|peer| self.probe(peer)))
            .await
            .into_iter()
            .flatten()
            .collect();

        let probed = results.len();
        let mut observed = Vec::new();
        let mut last_local = None;
        let mut local_failures = 0;

        for (peer, outcome) in results {
            match outcome {
                Outcome::Reachable => {
                    debug!("Connected to {}", peer.name);
                    observed.push(observation(peer));
                }
                Outcome::Unreachable => {}
                Outcome::LocalError(e) => {
                    local_failures += 1;
                    last_local = Some(e);
                }
            }
        }

        match last_local {
            Some(last) if local_failures == probed => Err(SourceError::Probe {
                failed: local_failures,
                last,
            }),
            _ => Ok(observed),
        }
    }

    fn project(&self, book: &PeerBook, observed: &[ObservedPeer], instance_name: &str) -> MetricSnapshot {
        reconcile_connectivity(book, observed, instance_name)
    }
}
