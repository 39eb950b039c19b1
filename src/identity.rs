//! Peer Identity Resolution
//!
//! Extracts the 128 hex-char node id from enode URLs of the form
//! `enode://<id>@host:port?discport=0`, and host names from URLs or
//! bare `host:port` addresses.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::types::PeerIdentity;

/// Length of a node id in hex chars
pub const IDENTITY_LEN: usize = 128;

/// Length of the shortened id used in the `enode_short` label
pub const SHORT_FORM_LEN: usize = 20;

static IDENTITY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!("[0-9a-fA-F]{{{}}}", IDENTITY_LEN))
        .expect("identity pattern is a valid regex")
});

/// Extract the node id from a raw peer address.
///
/// Returns the first run of 128 hex chars, verbatim (no case folding),
/// or `None` if the address carries no such run.
pub fn extract_identity(raw_address: &str) -> Option<PeerIdentity> {
    IDENTITY_PATTERN
        .find(raw_address)
        .map(|m| PeerIdentity::new_unchecked(m.as_str().to_string()))
}

/// First 20 chars of the node id
pub fn short_form(identity: &PeerIdentity) -> &str {
    let id = identity.as_str();
    &id[..id.len().min(SHORT_FORM_LEN)]
}

/// Host part of a URL (`http://host:8545`) or bare address (`host:30303`).
///
/// IPv6 hosts are returned without brackets.
pub fn host_name(address: &str) -> Option<String> {
    let address = address.trim();
    if address.is_empty() {
        return None;
    }

    // `host:port` parses as scheme `host`, so fall back to a dummy scheme
    let host = Url::parse(address)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .or_else(|| {
            Url::parse(&format!("tcp://{}", address))
                .ok()
                .and_then(|url| url.host_str().map(str::to_string))
        })?;

    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}
