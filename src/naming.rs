//! Display name assignment for configured peers
//!
//! Several peers may be run by the same company. Those share a label, so
//! each of them gets the first 5 chars of its node id appended.

use std::collections::HashMap;

use crate::types::PeerIdentity;

/// Chars of the node id appended to a shared label
const DISAMBIGUATION_LEN: usize = 5;

/// Assign one display name per `(label, identity)` entry, in input order.
///
/// A label used once is kept as is. A label used `k > 1` times becomes
/// `"{label} ({id prefix})"` for all `k` entries. Two entries sharing both
/// a label and a 5-char id prefix still collide; that is not resolved.
pub fn assign_display_names(entries: &[(&str, &PeerIdentity)]) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for (label, _) in entries {
        *counts.entry(*label).or_insert(0) += 1;
    }

    entries
        .iter()
        .map(|(label, identity)| {
            if counts.get(label).copied().unwrap_or(0) > 1 {
                let prefix: String = identity.as_str().chars().take(DISAMBIGUATION_LEN).collect();
                format!("{} ({})", label, prefix)
            } else {
                label.to_string()
            }
        })
        .collect()
}
