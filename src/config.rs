//! Exporter Configuration
//!
//! Loaded from TOML, or from JSON when the file name ends in `.json`.
//! Peer entries use the legacy `config.json` key names:
//!
//! ```json
//! {
//!   "rpc_url": "http://quorum-node-0.quorum:8545",
//!   "peers": [
//!     {
//!       "enode": "<128 hex chars>",
//!       "company-name": "Acme",
//!       "enodeAddress": "10.0.0.2",
//!       "enodeAddressPort": "30303"
//!     }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

use crate::identity::host_name;
use crate::types::{PeerBook, PeerBookError, PeerDescriptor, ProbeTarget};

/// Helper module accepting a port as number or numeric string
mod port_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortRepr {
        Number(u16),
        Text(String),
    }

    pub fn serialize<S>(port: &Option<u16>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match port {
            Some(p) => serializer.serialize_u16(*p),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<PortRepr>::deserialize(deserializer)? {
            None => Ok(None),
            Some(PortRepr::Number(p)) => Ok(Some(p)),
            Some(PortRepr::Text(s)) => s
                .trim()
                .parse::<u16>()
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("invalid port: {:?}", s))),
        }
    }
}

/// Configuration errors; all fatal at startup
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("'rpc_url' is not set in config, e.g. 'http://quorum-node-0.quorum:8545'")]
    MissingRpcUrl,

    #[error("'rpc_url' {0:?} is not a valid URL with a host")]
    InvalidRpcUrl(String),

    #[error("'peers' is not set in config")]
    NoPeers,

    #[error("peer {name:?} must set both 'enodeAddress' and 'enodeAddressPort', or neither")]
    IncompleteProbeTarget { name: String },

    #[error("'{field}' must be greater than zero")]
    ZeroInterval { field: &'static str },

    #[error(transparent)]
    Peers(#[from] PeerBookError),
}

/// One configured peer entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerEntry {
    /// Bare 128 hex-char id or full enode URL
    pub enode: String,

    #[serde(rename = "company-name", alias = "name")]
    pub company_name: String,

    #[serde(rename = "enodeAddress", alias = "address", default)]
    pub address: Option<String>,

    #[serde(rename = "enodeAddressPort", alias = "port", default, with = "port_serde")]
    pub port: Option<u16>,
}

impl PeerEntry {
    fn probe_target(&self) -> Result<Option<ProbeTarget>, ConfigError> {
        let address = self.address.as_deref().map(str::trim).filter(|a| !a.is_empty());

        match (address, self.port) {
            (Some(address), Some(port)) => Ok(Some(ProbeTarget {
                address: address.to_string(),
                port,
            })),
            (None, None) => Ok(None),
            _ => Err(ConfigError::IncompleteProbeTarget {
                name: self.company_name.clone(),
            }),
        }
    }
}

/// Main configuration for the exporter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    // === Node ===

    /// JSON-RPC endpoint of the Quorum node
    pub rpc_url: String,

    /// Timeout for one `admin_peers` call (seconds)
    pub rpc_timeout_secs: u64,

    /// Port appended to the `instance` label (the node's metrics port)
    pub instance_port: u16,

    // === Polling ===

    /// Interval between reconciliation passes (seconds)
    pub poll_interval_secs: u64,

    /// Run the TCP egress connectivity probe
    pub probe_enabled: bool,

    /// Timeout for one TCP connect (seconds)
    pub probe_timeout_secs: u64,

    // === HTTP ===

    /// Port of the scrape endpoint
    pub listen_port: u16,

    // === Peers ===

    pub peers: Vec<PeerEntry>,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            rpc_timeout_secs: 5,
            instance_port: 9545,        // Quorum node default metrics port
            poll_interval_secs: 10,
            probe_enabled: true,
            probe_timeout_secs: 1,
            listen_port: 8000,
            peers: vec![],
        }
    }
}

impl ExporterConfig {
    /// Load configuration, JSON if the extension is `.json`, TOML otherwise
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(toml::from_str(&content)?)
        }
    }

    // Builder-style methods for CLI overrides

    pub fn with_listen_port(mut self, port: Option<u16>) -> Self {
        if let Some(port) = port {
            self.listen_port = port;
        }
        self
    }

    pub fn with_poll_interval(mut self, secs: Option<u64>) -> Self {
        if let Some(secs) = secs {
            self.poll_interval_secs = secs;
        }
        self
    }

    pub fn with_probe_disabled(mut self, disabled: bool) -> Self {
        if disabled {
            self.probe_enabled = false;
        }
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc_url.trim().is_empty() {
            return Err(ConfigError::MissingRpcUrl);
        }

        let parsed = Url::parse(&self.rpc_url)
            .map_err(|_| ConfigError::InvalidRpcUrl(self.rpc_url.clone()))?;
        if parsed.host_str().map(str::is_empty).unwrap_or(true) {
            return Err(ConfigError::InvalidRpcUrl(self.rpc_url.clone()));
        }

        for (field, value) in [
            ("poll_interval_secs", self.poll_interval_secs),
            ("rpc_timeout_secs", self.rpc_timeout_secs),
            ("probe_timeout_secs", self.probe_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroInterval { field });
            }
        }

        if self.peers.is_empty() {
            return Err(ConfigError::NoPeers);
        }

        // Identity and probe target checks
        self.peer_book()?;

        Ok(())
    }

    /// Build the peer book, assigning display names
    pub fn peer_book(&self) -> Result<PeerBook, ConfigError> {
        let descriptors = self
            .peers
            .iter()
            .map(|entry| {
                Ok(PeerDescriptor {
                    raw_address: entry.enode.clone(),
                    label: entry.company_name.clone(),
                    probe_target: entry.probe_target()?,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(PeerBook::new(descriptors)?)
    }

    /// `instance_name` label: the host of the RPC URL
    pub fn instance_name(&self) -> String {
        host_name(&self.rpc_url).unwrap_or_default()
    }
}
