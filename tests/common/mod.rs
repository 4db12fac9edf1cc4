//! In-process cluster harness shared by the integration tests

#![allow(dead_code)]

use nodemesh::cluster::{ClusterState, MembershipRefresher, NodeId, StaticNodeDirectory};
use nodemesh::common::{ClusterConfig, NodeEntry};
use nodemesh::rpc::{CallRouter, LoopbackTransport, ServiceRegistry, ServiceRegistryBuilder};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub struct TestNode {
    pub id: NodeId,
    pub directory: Arc<StaticNodeDirectory>,
    pub router: Arc<CallRouter>,
    pub refresher: Arc<MembershipRefresher>,
}

impl TestNode {
    pub fn state(&self) -> &Arc<ClusterState> {
        self.refresher.state()
    }
}

/// Nodes sharing one loopback transport; each keeps its own directory view.
pub struct TestCluster {
    pub transport: Arc<LoopbackTransport>,
    pub nodes: BTreeMap<NodeId, TestNode>,
}

pub fn entry(id: &str, priority: i32) -> NodeEntry {
    NodeEntry {
        id: NodeId::from(id),
        address: format!("loopback://{}", id),
        enabled: true,
        priority,
    }
}

impl TestCluster {
    /// Cluster of `(id, priority)` nodes with no quiet period.
    pub fn new(members: &[(&str, i32)]) -> Self {
        Self::with_quiet_period(members, Duration::ZERO)
    }

    pub fn with_quiet_period(members: &[(&str, i32)], quiet_period: Duration) -> Self {
        Self::build(members, quiet_period, |_| ServiceRegistryBuilder::new())
    }

    /// Cluster whose nodes serve the operations from `services`.
    pub fn build(
        members: &[(&str, i32)],
        quiet_period: Duration,
        services: impl Fn(&NodeId) -> ServiceRegistryBuilder,
    ) -> Self {
        let transport = Arc::new(LoopbackTransport::new());
        let entries: Vec<NodeEntry> = members.iter().map(|(id, p)| entry(id, *p)).collect();
        let config = ClusterConfig::default();

        let mut nodes = BTreeMap::new();
        for (id, _) in members {
            let id = NodeId::from(*id);
            let directory = Arc::new(StaticNodeDirectory::new(id.clone(), entries.clone()));
            let registry: Arc<ServiceRegistry> = Arc::new(services(&id).build());
            transport.attach(id.clone(), registry.clone());

            let router = Arc::new(CallRouter::new(
                directory.clone(),
                registry,
                transport.clone(),
                &config,
            ));
            let refresher = Arc::new(MembershipRefresher::new(
                directory.clone(),
                router.clone(),
                Arc::new(ClusterState::new()),
                quiet_period,
            ));
            nodes.insert(
                id.clone(),
                TestNode {
                    id,
                    directory,
                    router,
                    refresher,
                },
            );
        }

        Self { transport, nodes }
    }

    pub fn node(&self, id: &str) -> &TestNode {
        &self.nodes[&NodeId::from(id)]
    }
}

pub fn ids(names: &[&str]) -> std::collections::BTreeSet<NodeId> {
    names.iter().map(|n| NodeId::from(*n)).collect()
}
