//! Peer Reconciler
//!
//! Merges the configured peer set with the peers observed in one pass,
//! keyed by node id, and projects the result into gauge families.
//!
//! ## Rules
//!
//! - Observations without a node id are dropped entirely
//! - Observed peers are reported even if not configured (named by short id)
//! - Configured peers not observed are reported absent
//! - Head blocks are only reported for connected peers, and only when
//!   nonzero: a zero for an absent peer would read as a real head block

use std::collections::HashSet;
use tracing::debug;

use crate::snapshot::{MetricFamily, MetricSnapshot};
use crate::types::{ObservedPeer, PeerBook, PeerIdentity, ReconciledPeer};

pub const PEERS_METRIC: &str = "quorum_peers";
pub const DIRECTION_METRIC: &str = "quorum_peers_network_direction";
pub const HEAD_BLOCK_METRIC: &str = "quorum_peers_head_block";
pub const EGRESS_CONNECTIVITY_METRIC: &str = "quorum_tcp_egress_connectivity";

const PEER_LABELS: &[&str] = &["instance", "instance_name", "enode", "enode_short", "name"];
const HEAD_BLOCK_LABELS: &[&str] = &[
    "instance",
    "instance_name",
    "enode",
    "enode_short",
    "name",
    "protocol",
];
const EGRESS_LABELS: &[&str] = &["instance_name", "enode", "enode_short", "name"];

/// Merge configured and observed peers by identity.
///
/// Connected peers come first, in observation order, followed by absent
/// configured peers in configuration order. Only the first observation of
/// an identity counts.
pub fn merge<'a>(book: &'a PeerBook, observed: &'a [ObservedPeer]) -> Vec<ReconciledPeer<'a>> {
    let mut seen: HashSet<PeerIdentity> = HashSet::with_capacity(observed.len());
    let mut merged = Vec::with_capacity(observed.len() + book.len());

    for observation in observed {
        let Some(identity) = observation.identity() else {
            debug!(
                "Dropping observation without node id: {:?}",
                observation.raw_address
            );
            continue;
        };

        if !seen.insert(identity.clone()) {
            debug!("Dropping duplicate observation of {}", identity.short());
            continue;
        }

        let configured = book.get(&identity);
        let name = configured
            .map(|p| p.name.clone())
            .unwrap_or_else(|| identity.short().to_string());

        merged.push(ReconciledPeer {
            identity,
            name,
            configured,
            observation: Some(observation),
        });
    }

    for peer in book.iter().filter(|p| !seen.contains(&p.identity)) {
        merged.push(ReconciledPeer {
            identity: peer.identity.clone(),
            name: peer.name.clone(),
            configured: Some(peer),
            observation: None,
        });
    }

    merged
}

/// Build the peer presence, direction and head block families.
///
/// All three families are always present, even without samples.
pub fn reconcile(book: &PeerBook, observed: &[ObservedPeer], instance_name: &str) -> MetricSnapshot {
    let mut peers = MetricFamily::gauge(PEERS_METRIC, "Quorum peers by enode", PEER_LABELS);
    let mut direction = MetricFamily::gauge(
        DIRECTION_METRIC,
        "Quorum peers network inbound (1) or outbound (2) by enode",
        PEER_LABELS,
    );
    let mut head_block = MetricFamily::gauge(
        HEAD_BLOCK_METRIC,
        "Quorum peers head block by enode and protocol eth or istanbul",
        HEAD_BLOCK_LABELS,
    );

    for peer in merge(book, observed) {
        let labels = [
            peer.instance(),
            instance_name,
            peer.identity.as_str(),
            peer.short(),
            peer.name.as_str(),
        ];

        peers.push(labels, if peer.is_present() { 1.0 } else { 0.0 });
        direction.push(labels, f64::from(peer.direction_code()));

        let Some(observation) = peer.observation else {
            continue;
        };
        for (protocol, &value) in &observation.head_blocks {
            if value == 0.0 {
                continue;
            }
            let mut labels = labels.to_vec();
            labels.push(protocol.as_str());
            head_block.push(labels, value);
        }
    }

    MetricSnapshot::new(vec![peers, direction, head_block])
}

/// Build the TCP egress connectivity family.
///
/// One sample per configured peer that has a probe target: `1` if it was
/// reachable in this pass, `0` otherwise.
pub fn reconcile_connectivity(
    book: &PeerBook,
    observed: &[ObservedPeer],
    instance_name: &str,
) -> MetricSnapshot {
    let mut connectivity = MetricFamily::gauge(
        EGRESS_CONNECTIVITY_METRIC,
        "Quorum TCP egress connectivity to other nodes by enode. (0) for no connectivity, (1) for connectivity can be established",
        EGRESS_LABELS,
    );

    let mut merged = merge(book, observed);
    // Report in configuration order
    merged.sort_by_key(|p| book.position(&p.identity).unwrap_or(usize::MAX));

    for peer in merged {
        let probed = peer.configured.is_some_and(|c| c.probe_target.is_some());
        if !probed {
            continue;
        }
        connectivity.push(
            [instance_name, peer.identity.as_str(), peer.short(), peer.name.as_str()],
            if peer.is_present() { 1.0 } else { 0.0 },
        );
    }

    MetricSnapshot::new(vec![connectivity])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, PeerDescriptor, ProbeTarget};
    use std::collections::{BTreeMap, HashSet};

    const INSTANCE: &str = "quorum-node-0.quorum";

    fn id(pair: &str) -> String {
        pair.repeat(64)
    }

    fn book(entries: &[(&str, &str)]) -> PeerBook {
        PeerBook::new(
            entries
                .iter()
                .map(|(pair, label)| PeerDescriptor {
                    raw_address: id(pair),
                    label: label.to_string(),
                    probe_target: Some(ProbeTarget {
                        address: "10.0.0.1".to_string(),
                        port: 30303,
                    }),
                })
                .collect(),
        )
        .unwrap()
    }

    fn observed(pair: &str, inbound: Option<bool>, blocks: &[(&str, f64)]) -> ObservedPeer {
        ObservedPeer {
            raw_address: Some(format!("enode://{}@1.2.3.4:1", id(pair))),
            direction: Direction::from_inbound_flag(inbound),
            head_blocks: blocks
                .iter()
                .map(|(p, v)| (p.to_string(), *v))
                .collect::<BTreeMap<_, _>>(),
            instance: "10.0.0.9:9545".to_string(),
        }
    }

    fn family<'a>(snapshot: &'a MetricSnapshot, name: &str) -> &'a MetricFamily {
        snapshot.family(name).unwrap()
    }

    fn sample_set(family: &MetricFamily) -> HashSet<(Vec<String>, u64)> {
        family
            .samples
            .iter()
            .map(|s| (s.labels.clone(), s.value.to_bits()))
            .collect()
    }

    #[test]
    fn test_connected_configured_peer() {
        let book = book(&[("aa", "Acme")]);
        let obs = vec![observed("aa", Some(true), &[("eth", 5.0)])];

        let snapshot = reconcile(&book, &obs, INSTANCE);
        let enode = id("aa");
        let short = &enode[..20];
        let labels = ["10.0.0.9:9545", INSTANCE, enode.as_str(), short, "Acme"];

        assert_eq!(family(&snapshot, PEERS_METRIC).value_of(&labels), Some(1.0));
        assert_eq!(family(&snapshot, DIRECTION_METRIC).value_of(&labels), Some(1.0));

        let head = family(&snapshot, HEAD_BLOCK_METRIC);
        assert_eq!(head.samples.len(), 1);
        assert_eq!(
            head.value_of(&["10.0.0.9:9545", INSTANCE, enode.as_str(), short, "Acme", "eth"]),
            Some(5.0)
        );
    }

    #[test]
    fn test_absent_configured_peer() {
        let book = book(&[("aa", "Acme")]);

        let snapshot = reconcile(&book, &[], INSTANCE);
        let enode = id("aa");
        let labels = ["", INSTANCE, enode.as_str(), &enode[..20], "Acme"];

        assert_eq!(family(&snapshot, PEERS_METRIC).value_of(&labels), Some(0.0));
        assert_eq!(family(&snapshot, DIRECTION_METRIC).value_of(&labels), Some(0.0));
        assert!(family(&snapshot, HEAD_BLOCK_METRIC).samples.is_empty());
    }

    #[test]
    fn test_no_observations_reports_all_absent() {
        let book = book(&[("aa", "Acme"), ("bb", "Globex"), ("cc", "Acme")]);

        let snapshot = reconcile(&book, &[], INSTANCE);
        let peers = family(&snapshot, PEERS_METRIC);

        assert_eq!(snapshot.families.len(), 3);
        assert_eq!(peers.samples.len(), 3);
        assert!(peers.samples.iter().all(|s| s.value == 0.0));
        assert!(family(&snapshot, HEAD_BLOCK_METRIC).samples.is_empty());
    }

    #[test]
    fn test_empty_config_reports_observed_only() {
        let book = PeerBook::default();
        let obs = vec![
            observed("aa", Some(true), &[]),
            observed("bb", Some(false), &[("istanbul", 7.0)]),
        ];

        let snapshot = reconcile(&book, &obs, INSTANCE);
        let peers = family(&snapshot, PEERS_METRIC);

        assert_eq!(peers.samples.len(), 2);
        assert!(peers.samples.iter().all(|s| s.value == 1.0));
        // Not in the config: named by short id
        assert_eq!(peers.samples[0].labels[4], &id("aa")[..20]);
    }

    #[test]
    fn test_zero_head_block_omitted() {
        let book = book(&[("aa", "Acme")]);
        let obs = vec![observed("aa", Some(false), &[("eth", 0.0), ("istanbul", 42.0)])];

        let snapshot = reconcile(&book, &obs, INSTANCE);
        let head = family(&snapshot, HEAD_BLOCK_METRIC);

        assert_eq!(head.samples.len(), 1);
        assert_eq!(head.samples[0].labels[5], "istanbul");
        assert_eq!(head.samples[0].value, 42.0);
    }

    #[test]
    fn test_unknown_direction_reports_outbound() {
        let book = book(&[("aa", "Acme")]);
        let obs = vec![observed("aa", None, &[])];

        let snapshot = reconcile(&book, &obs, INSTANCE);
        assert_eq!(family(&snapshot, DIRECTION_METRIC).samples[0].value, 2.0);
    }

    #[test]
    fn test_unparseable_observation_skipped() {
        let book = book(&[("aa", "Acme")]);
        let mut bad = observed("aa", Some(true), &[("eth", 9.0)]);
        bad.raw_address = Some("enode://deadbeef@1.2.3.4:30303".to_string());
        let missing = ObservedPeer::default();

        let snapshot = reconcile(&book, &[bad, missing], INSTANCE);
        let peers = family(&snapshot, PEERS_METRIC);

        assert_eq!(peers.samples.len(), 1);
        assert_eq!(peers.samples[0].value, 0.0);
        assert!(family(&snapshot, HEAD_BLOCK_METRIC).samples.is_empty());
    }

    #[test]
    fn test_extra_and_configured_mixed() {
        let book = book(&[("aa", "Acme"), ("bb", "Globex")]);
        let obs = vec![observed("cc", Some(true), &[]), observed("aa", None, &[("eth", 3.0)])];

        let merged = merge(&book, &obs);
        let summary: Vec<_> = merged
            .iter()
            .map(|p| (p.name.clone(), p.is_present(), p.configured.is_some()))
            .collect();

        assert_eq!(
            summary,
            vec![
                (id("cc")[..20].to_string(), true, false),
                ("Acme".to_string(), true, true),
                ("Globex".to_string(), false, true),
            ]
        );
    }

    #[test]
    fn test_duplicate_observation_counted_once() {
        let book = book(&[("aa", "Acme")]);
        let obs = vec![
            observed("aa", Some(true), &[("eth", 1.0)]),
            observed("aa", Some(false), &[("eth", 2.0)]),
        ];

        let snapshot = reconcile(&book, &obs, INSTANCE);
        assert_eq!(family(&snapshot, PEERS_METRIC).samples.len(), 1);
        assert_eq!(family(&snapshot, DIRECTION_METRIC).samples[0].value, 1.0);
        assert_eq!(family(&snapshot, HEAD_BLOCK_METRIC).samples[0].value, 1.0);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let book = book(&[("aa", "Acme"), ("bb", "Acme"), ("cc", "Globex")]);
        let obs = vec![
            observed("bb", Some(true), &[("eth", 10.0), ("istanbul", 11.0)]),
            observed("dd", None, &[]),
        ];

        let first = reconcile(&book, &obs, INSTANCE);
        let second = reconcile(&book, &obs, INSTANCE);

        for (a, b) in first.families.iter().zip(&second.families) {
            assert_eq!(a.name, b.name);
            assert_eq!(sample_set(a), sample_set(b));
        }
    }

    #[test]
    fn test_connectivity_family() {
        let mut book_entries = vec![
            PeerDescriptor {
                raw_address: id("aa"),
                label: "Acme".to_string(),
                probe_target: Some(ProbeTarget { address: "10.0.0.1".into(), port: 30303 }),
            },
            PeerDescriptor {
                raw_address: id("bb"),
                label: "Globex".to_string(),
                probe_target: Some(ProbeTarget { address: "10.0.0.2".into(), port: 30303 }),
            },
        ];
        book_entries.push(PeerDescriptor {
            raw_address: id("cc"),
            label: "Unprobed".to_string(),
            probe_target: None,
        });
        let book = PeerBook::new(book_entries).unwrap();
        let obs = vec![observed("bb", Some(false), &[])];

        let snapshot = reconcile_connectivity(&book, &obs, INSTANCE);
        let family = family(&snapshot, EGRESS_CONNECTIVITY_METRIC);

        assert_eq!(family.samples.len(), 2);
        assert_eq!(family.samples[0].labels[3], "Acme");
        assert_eq!(family.samples[0].value, 0.0);
        assert_eq!(family.samples[1].labels, vec![
            INSTANCE.to_string(),
            id("bb"),
            id("bb")[..20].to_string(),
            "Globex".to_string(),
        ]);
        assert_eq!(family.samples[1].value, 1.0);
    }
}
