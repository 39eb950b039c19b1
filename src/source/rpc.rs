//! JSON-RPC `admin_peers` source
//!
//! Queries the node for its connected peers. Each element of the result
//! looks like:
//!
//! ```json
//! {
//!   "enode": "enode://<128 hex>@10.0.0.2:30303?discport=0",
//!   "network": { "localAddress": "10.0.0.1:30303", "inbound": false },
//!   "protocols": { "eth": { "difficulty": 5 }, "istanbul": { "difficulty": 5 } }
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use super::{PeerSource, SourceError, SourceKind};
use crate::identity::host_name;
use crate::reconciler::reconcile;
use crate::snapshot::MetricSnapshot;
use crate::types::{Direction, ObservedPeer, PeerBook};

/// JSON-RPC request
#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    method: &'static str,
    params: serde_json::Value,
    id: u64,
}

/// JSON-RPC response
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

/// JSON-RPC error
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    #[serde(default)]
    code: i64,
    message: String,
}

/// One element of the `admin_peers` result
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdminPeer {
    #[serde(default)]
    enode: Option<String>,

    #[serde(default)]
    network: Option<AdminPeerNetwork>,

    /// Protocol values are objects once the handshake is done, strings before
    #[serde(default)]
    protocols: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdminPeerNetwork {
    #[serde(default)]
    local_address: Option<String>,

    #[serde(default)]
    inbound: Option<bool>,
}

/// `admin_peers` client
pub struct RpcSource {
    url: String,
    client: reqwest::Client,
    request_id: AtomicU64,

    /// Port appended to the `instance` label
    instance_port: u16,
}

impl RpcSource {
    pub fn new(url: &str, timeout: Duration, instance_port: u16) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            url: url.to_string(),
            client,
            request_id: AtomicU64::new(1),
            instance_port,
        })
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Fetch the raw `admin_peers` result
    async fn admin_peers(&self) -> Result<Vec<serde_json::Value>, SourceError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method: "admin_peers",
            params: serde_json::json!([]),
            id: self.next_id(),
        };

        let response = self.client.post(&self.url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(SourceError::Status(response.status().as_u16()));
        }

        let body: JsonRpcResponse = response.json().await?;

        if let Some(error) = body.error {
            return Err(SourceError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        Ok(body.result.unwrap_or_default())
    }

    /// Convert one raw result element, or `None` if it is malformed
    fn to_observed(&self, raw: serde_json::Value) -> Option<ObservedPeer> {
        let peer: AdminPeer = match serde_json::from_value(raw) {
            Ok(p) => p,
            Err(e) => {
                debug!("Skipping malformed admin_peers entry: {}", e);
                return None;
            }
        };

        let network = peer.network.unwrap_or_default();

        let instance = network
            .local_address
            .as_deref()
            .and_then(host_name)
            .map(|host| format!("{}:{}", host, self.instance_port))
            .unwrap_or_default();

        // Total difficulty can exceed u64 and then decodes as a float
        let head_blocks: BTreeMap<String, f64> = peer
            .protocols
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(protocol, info)| {
                let difficulty = info.get("difficulty")?.as_f64()?;
                Some((protocol, difficulty))
            })
            .collect();

        Some(ObservedPeer {
            raw_address: peer.enode,
            direction: Direction::from_inbound_flag(network.inbound),
            head_blocks,
            instance,
        })
    }
}

#[async_trait]
impl PeerSource for RpcSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Rpc
    }

    fn reports_peer_count(&self) -> bool {
        true
    }

    async fn observe(&self, _book: &PeerBook) -> Result<Vec<ObservedPeer>, SourceError> {
        let raw = self.admin_peers().await?;

        Ok(raw
            .into_iter()
            .filter_map(|entry| self.to_observed(entry))
            .collect())
    }

    fn project(&self, book: &PeerBook, observed: &[ObservedPeer], instance_name: &str) -> MetricSnapshot {
        reconcile(book, observed, instance_name)
    }
}
