//! Topology History
//!
//! Bounded map from topology version to snapshot. Written from the
//! transport callback, read by any thread resolving a historical view.
//! When capacity is exceeded the eldest version is evicted; queries for
//! versions older than the eldest retained entry fall back to that
//! eldest entry rather than failing.

use crate::snapshot::TopologySnapshot;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const DFLT_HISTORY_SIZE: usize = 100;

#[derive(Debug)]
pub struct TopologyHistory {
    entries: RwLock<BTreeMap<u64, Arc<TopologySnapshot>>>,
    capacity: usize,
}

impl TopologyHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Record a snapshot under its version, evicting the eldest entries
    /// beyond capacity. Re-inserting an already stored version replaces
    /// it (transport replays are idempotent).
    pub fn insert(&self, version: u64, snapshot: Arc<TopologySnapshot>) {
        let mut entries = self.entries.write();
        entries.insert(version, snapshot);
        while entries.len() > self.capacity {
            match entries.keys().next().copied() {
                Some(eldest) => entries.remove(&eldest),
                None => break,
            };
        }
    }

    /// Resolve the snapshot serving `version`: the exact entry when
    /// retained, otherwise the eldest entry at or above the request.
    pub fn resolve(&self, version: u64) -> Option<Arc<TopologySnapshot>> {
        let entries = self.entries.read();
        entries
            .get(&version)
            .or_else(|| entries.range(version..).next().map(|(_, snap)| snap))
            .cloned()
    }

    /// Apply `f` to every retained snapshot (alive-set rewind on
    /// leave/fail).
    pub fn for_each(&self, f: impl Fn(&TopologySnapshot)) {
        let snapshots: Vec<Arc<TopologySnapshot>> = self.entries.read().values().cloned().collect();
        for snap in snapshots {
            f(&snap);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every entry (reconnect resets the incarnation).
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
