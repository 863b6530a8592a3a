//! Node Attributes
//!
//! Immutable string-keyed attribute map attached to every node at join
//! time. Values are read through typed accessors; unknown keys yield
//! `None`, never an error.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Well-known attribute keys exchanged at join time.
pub mod attr_keys {
    /// Deployment mode the node runs with (`PRIVATE`, `ISOLATED`,
    /// `SHARED`, `CONTINUOUS`). Must agree across non-daemon nodes.
    pub const DEPLOYMENT_MODE: &str = "lattice.deploy.mode";
    /// Whether peer class loading is enabled. Must agree across nodes.
    pub const PEER_CLASS_LOADING: &str = "lattice.peer.classloading.enabled";
    /// Data center the node belongs to (small integer id).
    pub const DATA_CENTER_ID: &str = "lattice.data.center.id";
    /// Libraries on the node's classpath, used for drift warnings only.
    pub const LIBRARIES: &str = "lattice.libs";
    /// MAC addresses of the node's interfaces.
    pub const MACS: &str = "lattice.macs";
    /// Whether the node prefers IPv4 sockets.
    pub const PREFER_IPV4: &str = "lattice.net.prefer.ipv4";
    /// OS user the node process runs as.
    pub const USER_NAME: &str = "lattice.user.name";
    pub const OS_NAME: &str = "lattice.os.name";
    pub const OS_ARCH: &str = "lattice.os.arch";
    pub const OS_VERSION: &str = "lattice.os.version";
}

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Str(String),
    StrList(Vec<String>),
    Bytes(Vec<u8>),
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::Str(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::Str(v)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(v: Vec<String>) -> Self {
        AttributeValue::StrList(v)
    }
}

/// Immutable attribute map carried by a [`crate::GridNode`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeAttributes {
    entries: HashMap<String, AttributeValue>,
}

impl NodeAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert used while assembling a node before join.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Typed accessor: boolean attribute, `None` if absent or another type.
    pub fn bool_attr(&self, key: &str) -> Option<bool> {
        match self.entries.get(key) {
            Some(AttributeValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    /// Typed accessor: integer attribute.
    pub fn int_attr(&self, key: &str) -> Option<i64> {
        match self.entries.get(key) {
            Some(AttributeValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// Typed accessor: string attribute.
    pub fn str_attr(&self, key: &str) -> Option<&str> {
        match self.entries.get(key) {
            Some(AttributeValue::Str(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Typed accessor: string-list attribute.
    pub fn str_list_attr(&self, key: &str) -> Option<&[String]> {
        match self.entries.get(key) {
            Some(AttributeValue::StrList(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors_return_none_for_missing_keys() {
        let attrs = NodeAttributes::new().with(attr_keys::PREFER_IPV4, true);

        assert_eq!(attrs.bool_attr(attr_keys::PREFER_IPV4), Some(true));
        assert_eq!(attrs.bool_attr("no.such.key"), None);
        assert_eq!(attrs.str_attr("no.such.key"), None);
        assert_eq!(attrs.int_attr("no.such.key"), None);
    }

    #[test]
    fn typed_accessors_return_none_on_type_mismatch() {
        let attrs = NodeAttributes::new().with(attr_keys::USER_NAME, "grid");

        assert_eq!(attrs.str_attr(attr_keys::USER_NAME), Some("grid"));
        assert_eq!(attrs.bool_attr(attr_keys::USER_NAME), None);
    }

    #[test]
    fn builder_overwrites_duplicate_keys() {
        let attrs = NodeAttributes::new()
            .with(attr_keys::DATA_CENTER_ID, 1i64)
            .with(attr_keys::DATA_CENTER_ID, 2i64);

        assert_eq!(attrs.int_attr(attr_keys::DATA_CENTER_ID), Some(2));
        assert_eq!(attrs.len(), 1);
    }
}
