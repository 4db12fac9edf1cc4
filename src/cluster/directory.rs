//! Node directory
//!
//! The directory is the authority on configured nodes. Membership only reads
//! it; how entries get there (config file, database, admin API) is up to the
//! implementation.

use crate::cluster::NodeId;
use crate::common::{Config, Error, NodeEntry, Result};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

/// Read access to the configured cluster nodes.
pub trait NodeDirectory: Send + Sync {
    /// Identity of the process asking.
    fn this_node(&self) -> NodeId;

    /// Every configured node, enabled or not.
    fn list_all(&self) -> Result<Vec<NodeId>>;

    /// Whether `node` is administratively enabled. Unknown nodes are not.
    fn is_enabled(&self, node: &NodeId) -> bool;

    /// Election priority of `node`; higher wins.
    fn priority(&self, node: &NodeId) -> i32;

    /// Base address used to reach `node`.
    fn address_of(&self, node: &NodeId) -> Result<String>;
}

/// In-memory directory seeded from configuration.
///
/// Entries can be changed at runtime (enable/disable, re-address); the next
/// membership refresh picks the change up.
pub struct StaticNodeDirectory {
    this_node: NodeId,
    nodes: RwLock<BTreeMap<NodeId, NodeEntry>>,
}

impl StaticNodeDirectory {
    pub fn new(this_node: NodeId, entries: impl IntoIterator<Item = NodeEntry>) -> Self {
        let nodes = entries.into_iter().map(|e| (e.id.clone(), e)).collect();
        Self {
            this_node,
            nodes: RwLock::new(nodes),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.node_id.clone(), config.nodes.iter().cloned())
    }

    pub fn set_enabled(&self, node: &NodeId, enabled: bool) -> Result<()> {
        self.update(node, |entry| entry.enabled = enabled)
    }

    pub fn set_priority(&self, node: &NodeId, priority: i32) -> Result<()> {
        self.update(node, |entry| entry.priority = priority)
    }

    pub fn set_address(&self, node: &NodeId, address: impl Into<String>) -> Result<()> {
        let address = address.into();
        self.update(node, |entry| entry.address = address)
    }

    fn update(&self, node: &NodeId, f: impl FnOnce(&mut NodeEntry)) -> Result<()> {
        let mut nodes = self.write();
        let entry = nodes
            .get_mut(node)
            .ok_or_else(|| Error::NodeNotFound(node.clone()))?;
        f(entry);
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<NodeId, NodeEntry>> {
        self.nodes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<NodeId, NodeEntry>> {
        self.nodes.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NodeDirectory for StaticNodeDirectory {
    fn this_node(&self) -> NodeId {
        self.this_node.clone()
    }

    fn list_all(&self) -> Result<Vec<NodeId>> {
        Ok(self.read().keys().cloned().collect())
    }

    fn is_enabled(&self, node: &NodeId) -> bool {
        self.read().get(node).is_some_and(|e| e.enabled)
    }

    fn priority(&self, node: &NodeId) -> i32 {
        self.read().get(node).map_or(0, |e| e.priority)
    }

    fn address_of(&self, node: &NodeId) -> Result<String> {
        self.read()
            .get(node)
            .map(|e| e.address.clone())
            .ok_or_else(|| Error::NodeNotFound(node.clone()))
    }
}
