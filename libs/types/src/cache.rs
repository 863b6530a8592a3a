//! Cache Participation
//!
//! Per-node, per-cache flags announced at join time. The nameless default
//! cache is modeled as its own [`CacheName`] variant rather than a
//! sentinel string, so it can key maps without colliding with user names.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Key identifying a cache in topology maps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheName {
    /// The default cache (configured without a name).
    Default,
    /// A named cache.
    Named(String),
}

impl CacheName {
    pub fn named(name: impl Into<String>) -> Self {
        CacheName::Named(name.into())
    }

    /// The user-visible name, `None` for the default cache.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CacheName::Default => None,
            CacheName::Named(s) => Some(s.as_str()),
        }
    }
}

impl From<Option<&str>> for CacheName {
    fn from(v: Option<&str>) -> Self {
        match v {
            None => CacheName::Default,
            Some(s) => CacheName::Named(s.to_string()),
        }
    }
}

impl fmt::Display for CacheName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheName::Default => f.write_str("<default>"),
            CacheName::Named(s) => f.write_str(s),
        }
    }
}

/// A node's participation flags for one cache.
///
/// Affinity participation and near-cache support are independent: a node
/// may keep a near cache for entries it is not an affinity owner of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheAttributes {
    name: CacheName,
    affinity_node: bool,
    near_enabled: bool,
}

impl CacheAttributes {
    pub fn new(name: CacheName, affinity_node: bool, near_enabled: bool) -> Self {
        Self {
            name,
            affinity_node,
            near_enabled,
        }
    }

    pub fn name(&self) -> &CacheName {
        &self.name
    }

    /// Whether the node stores affinity-assigned partitions for the cache.
    pub fn is_affinity_node(&self) -> bool {
        self.affinity_node
    }

    /// Whether the node keeps a near cache of remote entries.
    pub fn is_near_enabled(&self) -> bool {
        self.near_enabled
    }
}
