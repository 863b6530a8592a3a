//! Topology Hash
//!
//! CRC32 over the lexicographically sorted string forms of node ids,
//! widened to 64 bits. The exact construction is part of the wire
//! contract with existing clusters and must not change.

use std::sync::Arc;
use types::GridNode;

/// Hash of a set of nodes, independent of input order.
pub fn topology_hash<'a>(nodes: impl IntoIterator<Item = &'a Arc<GridNode>>) -> u64 {
    let mut ids: Vec<String> = nodes.into_iter().map(|n| n.id().to_string()).collect();
    ids.sort_unstable();

    let mut hasher = crc32fast::Hasher::new();
    for id in &ids {
        hasher.update(id.as_bytes());
    }

    hasher.finalize() as u64
}
