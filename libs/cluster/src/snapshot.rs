//! Topology Snapshots
//!
//! A [`TopologySnapshot`] is the immutable view of the cluster at one
//! topology version: node lists, per-cache participation maps, a
//! version-indexed view and a fast id lookup. The only mutable parts are
//! the alive per-cache maps, pruned in place as nodes leave or fail so
//! that readers of historical snapshots never see a dead node as alive.
//!
//! Node lists are shared as `Arc<[Arc<GridNode>]>`; callers receive
//! cheap clones and must treat them as read-only.

use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use types::{CacheName, GridNode, ProductVersion};
use uuid::Uuid;

/// Shared read-only node list.
pub type NodeList = Arc<[Arc<GridNode>]>;

fn freeze(nodes: Vec<Arc<GridNode>>) -> NodeList {
    nodes.into()
}

fn empty() -> NodeList {
    Vec::new().into()
}

/// Immutable topology view at one version, plus mutable alive subsets.
#[derive(Debug)]
pub struct TopologySnapshot {
    version: u64,
    local: Arc<GridNode>,

    /// Non-daemon nodes, local (when non-daemon) first, insertion-stable.
    all_nodes: NodeList,
    /// Non-daemon remote nodes.
    remote_nodes: NodeList,
    /// Daemon nodes, local included.
    daemon_nodes: NodeList,

    all_cache_nodes: HashMap<CacheName, NodeList>,
    remote_cache_nodes: HashMap<CacheName, NodeList>,
    affinity_cache_nodes: HashMap<CacheName, NodeList>,
    near_enabled_caches: HashSet<CacheName>,

    /// version -> nodes whose software version is >= that key.
    nodes_by_version: BTreeMap<ProductVersion, NodeList>,

    /// Pruned in place on leave/fail, per-key atomic replacement.
    alive_cache_nodes: DashMap<CacheName, NodeList>,
    alive_remote_cache_nodes: DashMap<CacheName, NodeList>,

    node_map: HashMap<Uuid, Arc<GridNode>>,
    max_order: u64,
}

impl TopologySnapshot {
    /// Build a snapshot from the local node and the remotes as reported
    /// by the transport. `alive` is consulted once per node at build time.
    pub fn build(
        version: u64,
        local: Arc<GridNode>,
        remotes: &[Arc<GridNode>],
        alive: &dyn Fn(&GridNode) -> bool,
    ) -> Self {
        let mut all_nodes: Vec<Arc<GridNode>> = Vec::with_capacity(remotes.len() + 1);
        let mut remote_nodes: Vec<Arc<GridNode>> = Vec::with_capacity(remotes.len());
        let mut daemon_nodes: Vec<Arc<GridNode>> = Vec::new();

        if local.is_daemon() {
            daemon_nodes.push(Arc::clone(&local));
        } else {
            all_nodes.push(Arc::clone(&local));
        }

        for node in remotes {
            if node.is_daemon() {
                daemon_nodes.push(Arc::clone(node));
            } else {
                remote_nodes.push(Arc::clone(node));
                all_nodes.push(Arc::clone(node));
            }
        }

        let mut all_cache: HashMap<CacheName, Vec<Arc<GridNode>>> = HashMap::new();
        let mut remote_cache: HashMap<CacheName, Vec<Arc<GridNode>>> = HashMap::new();
        let mut affinity_cache: HashMap<CacheName, Vec<Arc<GridNode>>> = HashMap::new();
        let mut alive_cache: HashMap<CacheName, Vec<Arc<GridNode>>> = HashMap::new();
        let mut alive_remote_cache: HashMap<CacheName, Vec<Arc<GridNode>>> = HashMap::new();
        let mut near_enabled: HashSet<CacheName> = HashSet::new();
        let mut by_version: BTreeMap<ProductVersion, Vec<Arc<GridNode>>> = BTreeMap::new();
        let mut node_map: HashMap<Uuid, Arc<GridNode>> = HashMap::new();
        let mut max_order = 0u64;

        for node in &all_nodes {
            max_order = max_order.max(node.order());
            node_map.insert(node.id(), Arc::clone(node));

            let is_local = node.id() == local.id();
            let node_alive = alive(node);

            for attrs in node.cache_attributes() {
                let name = attrs.name().clone();

                all_cache
                    .entry(name.clone())
                    .or_default()
                    .push(Arc::clone(node));

                if attrs.is_affinity_node() {
                    affinity_cache
                        .entry(name.clone())
                        .or_default()
                        .push(Arc::clone(node));
                }

                if attrs.is_near_enabled() {
                    near_enabled.insert(name.clone());
                }

                if node_alive {
                    alive_cache
                        .entry(name.clone())
                        .or_default()
                        .push(Arc::clone(node));
                }

                if !is_local {
                    remote_cache
                        .entry(name.clone())
                        .or_default()
                        .push(Arc::clone(node));

                    if node_alive {
                        alive_remote_cache
                            .entry(name.clone())
                            .or_default()
                            .push(Arc::clone(node));
                    }
                }
            }

            by_version
                .entry(node.version())
                .or_default()
                .push(Arc::clone(node));
        }

        // Daemon nodes are indexed for id lookup but stay out of every
        // topology list.
        for node in &daemon_nodes {
            node_map.insert(node.id(), Arc::clone(node));
        }

        // Second pass: a node must appear under every version key at or
        // below its own, so "nodes with version >= v" is a single lookup.
        for node in &all_nodes {
            for (key, list) in by_version.iter_mut() {
                if *key < node.version() {
                    list.push(Arc::clone(node));
                }
            }
        }

        Self {
            version,
            local,
            all_nodes: freeze(all_nodes),
            remote_nodes: freeze(remote_nodes),
            daemon_nodes: freeze(daemon_nodes),
            all_cache_nodes: all_cache.into_iter().map(|(k, v)| (k, freeze(v))).collect(),
            remote_cache_nodes: remote_cache
                .into_iter()
                .map(|(k, v)| (k, freeze(v)))
                .collect(),
            affinity_cache_nodes: affinity_cache
                .into_iter()
                .map(|(k, v)| (k, freeze(v)))
                .collect(),
            near_enabled_caches: near_enabled,
            nodes_by_version: by_version.into_iter().map(|(k, v)| (k, freeze(v))).collect(),
            alive_cache_nodes: alive_cache
                .into_iter()
                .map(|(k, v)| (k, freeze(v)))
                .collect(),
            alive_remote_cache_nodes: alive_remote_cache
                .into_iter()
                .map(|(k, v)| (k, freeze(v)))
                .collect(),
            node_map,
            max_order,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn local(&self) -> &Arc<GridNode> {
        &self.local
    }

    pub fn max_order(&self) -> u64 {
        self.max_order
    }

    pub fn node(&self, id: Uuid) -> Option<Arc<GridNode>> {
        self.node_map.get(&id).cloned()
    }

    /// Non-daemon nodes with `order <= top_ver`; the full list when
    /// `top_ver` is `None` or at/above `max_order`.
    pub fn all_nodes(&self, top_ver: Option<u64>) -> Vec<Arc<GridNode>> {
        self.filtered(&self.all_nodes, top_ver)
    }

    pub fn remote_nodes(&self, top_ver: Option<u64>) -> Vec<Arc<GridNode>> {
        self.filtered(&self.remote_nodes, top_ver)
    }

    pub fn daemon_nodes(&self) -> Vec<Arc<GridNode>> {
        self.daemon_nodes.to_vec()
    }

    pub fn cache_nodes(&self, name: &CacheName, top_ver: Option<u64>) -> Vec<Arc<GridNode>> {
        self.filtered_map(&self.all_cache_nodes, name, top_ver)
    }

    pub fn remote_cache_nodes(&self, name: &CacheName, top_ver: Option<u64>) -> Vec<Arc<GridNode>> {
        self.filtered_map(&self.remote_cache_nodes, name, top_ver)
    }

    pub fn affinity_cache_nodes(
        &self,
        name: &CacheName,
        top_ver: Option<u64>,
    ) -> Vec<Arc<GridNode>> {
        self.filtered_map(&self.affinity_cache_nodes, name, top_ver)
    }

    pub fn alive_cache_nodes(&self, name: &CacheName, top_ver: Option<u64>) -> Vec<Arc<GridNode>> {
        let list = self
            .alive_cache_nodes
            .get(name)
            .map(|e| Arc::clone(e.value()))
            .unwrap_or_else(empty);
        self.filtered(&list, top_ver)
    }

    pub fn alive_remote_cache_nodes(
        &self,
        name: &CacheName,
        top_ver: Option<u64>,
    ) -> Vec<Arc<GridNode>> {
        let list = self
            .alive_remote_cache_nodes
            .get(name)
            .map(|e| Arc::clone(e.value()))
            .unwrap_or_else(empty);
        self.filtered(&list, top_ver)
    }

    /// Whether any node advertises a near cache for `name`.
    pub fn has_near_cache(&self, name: &CacheName) -> bool {
        self.near_enabled_caches.contains(name)
    }

    /// Nodes whose software version is at least `ver`.
    pub fn nodes_with_version_at_least(&self, ver: ProductVersion) -> Vec<Arc<GridNode>> {
        self.nodes_by_version
            .range(ver..)
            .next()
            .map(|(_, list)| list.to_vec())
            .unwrap_or_default()
    }

    /// Remove a departed node from the alive per-cache maps. Applied to
    /// the current snapshot and every retained history entry, so stale
    /// readers observe the departure immediately.
    pub(crate) fn prune_alive(&self, departed: &GridNode) {
        for attrs in departed.cache_attributes() {
            let name = attrs.name();
            for map in [&self.alive_cache_nodes, &self.alive_remote_cache_nodes] {
                if map.contains_key(name) {
                    map.alter(name, |_, list| {
                        list.iter()
                            .filter(|n| n.id() != departed.id())
                            .cloned()
                            .collect::<Vec<_>>()
                            .into()
                    });
                }
            }
        }
    }

    fn filtered(&self, list: &NodeList, top_ver: Option<u64>) -> Vec<Arc<GridNode>> {
        match top_ver {
            Some(ver) if ver < self.max_order => list
                .iter()
                .filter(|n| n.order() <= ver)
                .cloned()
                .collect(),
            _ => list.to_vec(),
        }
    }

    fn filtered_map(
        &self,
        map: &HashMap<CacheName, NodeList>,
        name: &CacheName,
        top_ver: Option<u64>,
    ) -> Vec<Arc<GridNode>> {
        match map.get(name) {
            Some(list) => self.filtered(list, top_ver),
            None => Vec::new(),
        }
    }
}
