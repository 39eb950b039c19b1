//! Core peer types
//!
//! Configured peers are loaded once and shared read-only; observed peers
//! live for a single reconciliation pass.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::identity::{extract_identity, short_form};
use crate::naming::assign_display_names;

// =============================================================================
// IDENTITY
// =============================================================================

/// 128 hex-char node id, kept verbatim as found in the address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerIdentity(String);

impl PeerIdentity {
    /// Wrap a string already matched by the identity pattern
    pub(crate) fn new_unchecked(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        short_form(self)
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// CONFIGURED PEERS
// =============================================================================

/// Address probed by the TCP egress connectivity check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeTarget {
    pub address: String,
    pub port: u16,
}

/// A statically expected peer
#[derive(Debug, Clone)]
pub struct ConfiguredPeer {
    pub identity: PeerIdentity,

    /// Address as written in the config (bare id or enode URL)
    pub raw_address: String,

    /// Unique display name, assigned at load
    pub name: String,

    pub probe_target: Option<ProbeTarget>,
}

/// Raw peer entry before names are assigned
#[derive(Debug, Clone)]
pub struct PeerDescriptor {
    pub raw_address: String,
    pub label: String,
    pub probe_target: Option<ProbeTarget>,
}

/// Descriptor rejected while building a [`PeerBook`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PeerBookError {
    #[error("peer #{index} has no 128 hex-char enode id")]
    InvalidEnode { index: usize },

    #[error("enode {identity} is configured more than once")]
    DuplicateEnode { identity: String },
}

/// The configured peer set, in configuration order, indexed by identity
#[derive(Debug, Clone, Default)]
pub struct PeerBook {
    peers: Vec<ConfiguredPeer>,
    index: HashMap<PeerIdentity, usize>,
}

impl PeerBook {
    /// Resolve identities and assign display names
    pub fn new(descriptors: Vec<PeerDescriptor>) -> Result<Self, PeerBookError> {
        let mut identities = Vec::with_capacity(descriptors.len());
        let mut index = HashMap::with_capacity(descriptors.len());

        for (i, descriptor) in descriptors.iter().enumerate() {
            let identity = extract_identity(&descriptor.raw_address)
                .ok_or(PeerBookError::InvalidEnode { index: i })?;

            if index.insert(identity.clone(), i).is_some() {
                return Err(PeerBookError::DuplicateEnode {
                    identity: identity.to_string(),
                });
            }
            identities.push(identity);
        }

        let names = {
            let labelled: Vec<(&str, &PeerIdentity)> = descriptors
                .iter()
                .zip(&identities)
                .map(|(d, id)| (d.label.as_str(), id))
                .collect();
            assign_display_names(&labelled)
        };

        let peers = descriptors
            .into_iter()
            .zip(identities)
            .zip(names)
            .map(|((descriptor, identity), name)| ConfiguredPeer {
                identity,
                raw_address: descriptor.raw_address,
                name,
                probe_target: descriptor.probe_target,
            })
            .collect();

        Ok(Self { peers, index })
    }

    pub fn get(&self, identity: &PeerIdentity) -> Option<&ConfiguredPeer> {
        self.index.get(identity).map(|&i| &self.peers[i])
    }

    /// Index of the peer in configuration order
    pub fn position(&self, identity: &PeerIdentity) -> Option<usize> {
        self.index.get(identity).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfiguredPeer> {
        self.peers.iter()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }
}

// =============================================================================
// OBSERVED PEERS
// =============================================================================

/// Link direction as reported by the observation source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    Inbound,
    Outbound,
    #[default]
    Unknown,
}

impl Direction {
    pub fn from_inbound_flag(inbound: Option<bool>) -> Self {
        match inbound {
            Some(true) => Direction::Inbound,
            Some(false) => Direction::Outbound,
            None => Direction::Unknown,
        }
    }

    /// Gauge value for a connected peer.
    ///
    /// A missing inbound flag conventionally means outbound, so unknown
    /// reports as `2` like outbound.
    pub fn gauge_code(self) -> u8 {
        match self {
            Direction::Inbound => 1,
            Direction::Outbound | Direction::Unknown => 2,
        }
    }
}

/// A peer reported as connected during one pass
#[derive(Debug, Clone, Default)]
pub struct ObservedPeer {
    /// Identity-bearing address; may be missing or unparseable
    pub raw_address: Option<String>,

    pub direction: Direction,

    /// Head block (difficulty) per protocol tag, e.g. `eth`, `istanbul`
    pub head_blocks: BTreeMap<String, f64>,

    /// Source specific `instance` label
    pub instance: String,
}

impl ObservedPeer {
    pub fn identity(&self) -> Option<PeerIdentity> {
        self.raw_address.as_deref().and_then(extract_identity)
    }
}

// =============================================================================
// RECONCILED PEERS
// =============================================================================

/// Configured and observed views of one identity, merged
#[derive(Debug, Clone)]
pub struct ReconciledPeer<'a> {
    pub identity: PeerIdentity,

    /// Config name, or the short id for peers not in the config
    pub name: String,

    pub configured: Option<&'a ConfiguredPeer>,

    /// `Some` while connected
    pub observation: Option<&'a ObservedPeer>,
}

impl ReconciledPeer<'_> {
    pub fn is_present(&self) -> bool {
        self.observation.is_some()
    }

    pub fn short(&self) -> &str {
        self.identity.short()
    }

    /// 0 when absent, otherwise the direction's gauge code
    pub fn direction_code(&self) -> u8 {
        self.observation
            .map(|o| o.direction.gauge_code())
            .unwrap_or(0)
    }

    pub fn instance(&self) -> &str {
        self.observation.map(|o| o.instance.as_str()).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id_pair: &str, label: &str) -> PeerDescriptor {
        PeerDescriptor {
            raw_address: id_pair.repeat(64),
            label: label.to_string(),
            probe_target: None,
        }
    }

    #[test]
    fn test_peer_book_assigns_names() {
        let book = PeerBook::new(vec![
            descriptor("aa", "Acme"),
            descriptor("bb", "Acme"),
            descriptor("cc", "Globex"),
        ])
        .unwrap();

        let names: Vec<_> = book.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Acme (aaaaa)", "Acme (bbbbb)", "Globex"]);
        assert_eq!(book.len(), 3);
    }

    #[test]
    fn test_peer_book_lookup() {
        let book = PeerBook::new(vec![descriptor("aa", "Acme")]).unwrap();
        let identity = extract_identity(&"aa".repeat(64)).unwrap();

        assert_eq!(book.position(&identity), Some(0));
        assert_eq!(book.get(&identity).unwrap().name, "Acme");
    }

    #[test]
    fn test_peer_book_rejects_duplicates() {
        let mut second = descriptor("aa", "Other");
        second.raw_address = format!("enode://{}@1.2.3.4:30303", "aa".repeat(64));

        let err = PeerBook::new(vec![descriptor("aa", "Acme"), second]).unwrap_err();
        assert!(matches!(err, PeerBookError::DuplicateEnode { .. }));
    }

    #[test]
    fn test_peer_book_rejects_bad_enode() {
        let err = PeerBook::new(vec![descriptor("aa", "Acme"), descriptor("zz", "Bad")])
            .unwrap_err();
        assert_eq!(err, PeerBookError::InvalidEnode { index: 1 });
    }

    #[test]
    fn test_direction_codes() {
        assert_eq!(Direction::from_inbound_flag(Some(true)).gauge_code(), 1);
        assert_eq!(Direction::from_inbound_flag(Some(false)).gauge_code(), 2);
        assert_eq!(Direction::from_inbound_flag(None).gauge_code(), 2);
    }
}
