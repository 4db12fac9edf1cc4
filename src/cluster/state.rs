//! Published cluster state
//!
//! The state is a single [`ClusterSnapshot`] behind a `watch` channel. Every
//! mutation is a modify-and-publish of the whole snapshot under the channel's
//! lock, so readers always see a complete snapshot and never a half-built set.
//! Subscribers are woken on each publish.

use crate::cluster::NodeId;
use crate::common::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tokio::sync::watch;

/// Outcome of the most recent probe of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeRecord {
    /// Round trip of a successful probe
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// Failure message of an unsuccessful probe
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

impl ProbeRecord {
    pub fn success(latency: Duration) -> Self {
        Self {
            latency_ms: Some(latency.as_millis() as u64),
            error: None,
            at: Utc::now(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            latency_ms: None,
            error: Some(error.into()),
            at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Membership, reachability and leadership as of the last refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub all_nodes: BTreeSet<NodeId>,
    pub enabled_nodes: BTreeSet<NodeId>,
    pub active_nodes: BTreeSet<NodeId>,
    pub master_node: Option<NodeId>,
    /// `None` until the first refresh completes
    pub update_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub probes: BTreeMap<NodeId, ProbeRecord>,
}

impl ClusterSnapshot {
    pub fn is_enabled(&self, node: &NodeId) -> bool {
        self.enabled_nodes.contains(node)
    }

    pub fn is_active(&self, node: &NodeId) -> bool {
        self.active_nodes.contains(node)
    }

    pub fn is_master(&self, node: &NodeId) -> bool {
        self.master_node.as_ref() == Some(node)
    }
}

/// Process-wide cluster state.
///
/// Only the membership refresher writes; everyone else reads.
#[derive(Debug)]
pub struct ClusterState {
    tx: watch::Sender<ClusterSnapshot>,
}

impl Default for ClusterState {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ClusterSnapshot::default());
        Self { tx }
    }

    // === Reads ===

    /// Consistent copy of the current snapshot.
    pub fn snapshot(&self) -> ClusterSnapshot {
        self.tx.borrow().clone()
    }

    /// Receiver woken on every publish.
    pub fn subscribe(&self) -> watch::Receiver<ClusterSnapshot> {
        self.tx.subscribe()
    }

    /// Current master, failing if no refresh has completed yet.
    pub fn master_node(&self) -> Result<Option<NodeId>> {
        let snapshot = self.tx.borrow();
        snapshot.update_time.ok_or(Error::NoClusterState)?;
        Ok(snapshot.master_node.clone())
    }

    /// Is `node` the current master?
    pub fn is_master(&self, node: &NodeId) -> Result<bool> {
        Ok(self.master_node()?.as_ref() == Some(node))
    }

    /// Enabled nodes that answered their last probe.
    pub fn enabled_active_nodes(&self) -> Result<BTreeSet<NodeId>> {
        let snapshot = self.tx.borrow();
        snapshot.update_time.ok_or(Error::NoClusterState)?;
        Ok(snapshot
            .active_nodes
            .intersection(&snapshot.enabled_nodes)
            .cloned()
            .collect())
    }

    // === Writes (membership refresher only) ===

    pub(crate) fn publish_all_nodes(&self, nodes: BTreeSet<NodeId>) {
        self.tx.send_modify(|s| s.all_nodes = nodes);
    }

    /// Publish the enabled set, dropping active nodes that are no longer in it.
    pub(crate) fn publish_enabled_nodes(&self, nodes: BTreeSet<NodeId>) {
        self.tx.send_modify(|s| {
            s.active_nodes.retain(|n| nodes.contains(n));
            s.probes.retain(|n, _| nodes.contains(n));
            s.enabled_nodes = nodes;
        });
    }

    /// Record a successful probe. Ignored if `node` has been disabled meanwhile.
    pub(crate) fn mark_active(&self, node: &NodeId, record: ProbeRecord) {
        self.tx.send_modify(|s| {
            if s.enabled_nodes.contains(node) {
                s.active_nodes.insert(node.clone());
                s.probes.insert(node.clone(), record);
            }
        });
    }

    /// Record a failed probe.
    pub(crate) fn mark_inactive(&self, node: &NodeId, record: ProbeRecord) {
        self.tx.send_modify(|s| {
            s.active_nodes.remove(node);
            if s.enabled_nodes.contains(node) {
                s.probes.insert(node.clone(), record);
            }
        });
    }

    pub(crate) fn publish_master(&self, master: Option<NodeId>) {
        self.tx.send_modify(|s| s.master_node = master);
    }

    /// Advance the update time; it never moves backwards.
    pub(crate) fn touch(&self) -> DateTime<Utc> {
        let now = Utc::now();
        let mut stamped = now;
        self.tx.send_modify(|s| {
            stamped = match s.update_time {
                Some(prev) if prev > now => prev,
                _ => now,
            };
            s.update_time = Some(stamped);
        });
        stamped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> BTreeSet<NodeId> {
        names.iter().map(|n| NodeId::from(*n)).collect()
    }

    #[test]
    fn test_reads_before_first_refresh() {
        let state = ClusterState::new();
        assert!(matches!(state.master_node(), Err(Error::NoClusterState)));
        assert!(matches!(
            state.enabled_active_nodes(),
            Err(Error::NoClusterState)
        ));
        assert!(state.snapshot().update_time.is_none());
    }

    #[test]
    fn test_disabling_prunes_active() {
        let state = ClusterState::new();
        state.publish_enabled_nodes(ids(&["a", "b", "c"]));
        for n in ["a", "b", "c"] {
            state.mark_active(&NodeId::from(n), ProbeRecord::success(Duration::ZERO));
        }

        state.publish_enabled_nodes(ids(&["a", "c"]));

        let snapshot = state.snapshot();
        assert_eq!(snapshot.active_nodes, ids(&["a", "c"]));
        assert!(!snapshot.probes.contains_key(&NodeId::from("b")));
    }

    #[test]
    fn test_late_success_for_disabled_node_is_ignored() {
        let state = ClusterState::new();
        state.publish_enabled_nodes(ids(&["a"]));
        state.mark_active(&NodeId::from("b"), ProbeRecord::success(Duration::ZERO));
        assert!(state.snapshot().active_nodes.is_empty());
    }

    #[test]
    fn test_mark_inactive_records_failure() {
        let state = ClusterState::new();
        let b = NodeId::from("b");
        state.publish_enabled_nodes(ids(&["b"]));
        state.mark_active(&b, ProbeRecord::success(Duration::from_millis(3)));
        state.mark_inactive(&b, ProbeRecord::failure("connection refused"));

        let snapshot = state.snapshot();
        assert!(!snapshot.is_active(&b));
        assert_eq!(
            snapshot.probes[&b].error.as_deref(),
            Some("connection refused")
        );
    }

    #[test]
    fn test_touch_is_monotonic() {
        let state = ClusterState::new();
        let first = state.touch();
        let second = state.touch();
        assert!(second >= first);
        assert_eq!(state.snapshot().update_time, Some(second));
    }

    #[test]
    fn test_leader_queries() {
        let state = ClusterState::new();
        state.publish_enabled_nodes(ids(&["a", "b"]));
        state.mark_active(&NodeId::from("a"), ProbeRecord::success(Duration::ZERO));
        state.publish_master(Some(NodeId::from("b")));
        state.touch();

        assert_eq!(state.master_node().unwrap(), Some(NodeId::from("b")));
        assert!(state.is_master(&NodeId::from("b")).unwrap());
        assert!(!state.is_master(&NodeId::from("a")).unwrap());
        assert_eq!(state.enabled_active_nodes().unwrap(), ids(&["a"]));
    }

    #[tokio::test]
    async fn test_subscribers_see_publishes() {
        let state = ClusterState::new();
        let mut rx = state.subscribe();
        state.publish_all_nodes(ids(&["a"]));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().all_nodes, ids(&["a"]));
    }
}
