//! In-process transport
//!
//! Delivers calls straight to the service registries of nodes attached to the
//! same transport. Used to run several nodes inside one process, and to
//! simulate unreachable or slow peers.

use crate::cluster::NodeId;
use crate::common::{Error, Result, TransportFailure};
use crate::rpc::envelope::{CallEnvelope, CallReply, RemoteFault};
use crate::rpc::proxy::{RemoteProxy, Transport};
use crate::rpc::registry::ServiceRegistry;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct Peers {
    registries: DashMap<NodeId, Arc<ServiceRegistry>>,
    unreachable: DashSet<NodeId>,
    latency: DashMap<NodeId, Duration>,
    opened: DashMap<NodeId, usize>,
}

#[derive(Default)]
pub struct LoopbackTransport {
    peers: Arc<Peers>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `node` answer calls with `registry`.
    pub fn attach(&self, node: NodeId, registry: Arc<ServiceRegistry>) {
        self.peers.registries.insert(node, registry);
    }

    /// Calls to `node` fail with a connection error until reconnected.
    pub fn disconnect(&self, node: &NodeId) {
        self.peers.unreachable.insert(node.clone());
    }

    pub fn reconnect(&self, node: &NodeId) {
        self.peers.unreachable.remove(node);
    }

    /// Delay every call to `node` by `delay`.
    pub fn set_latency(&self, node: &NodeId, delay: Duration) {
        self.peers.latency.insert(node.clone(), delay);
    }

    /// How many proxies have been opened to `node`.
    pub fn opened(&self, node: &NodeId) -> usize {
        self.peers.opened.get(node).map_or(0, |n| *n)
    }
}

impl Transport for LoopbackTransport {
    fn open(&self, target: &NodeId, address: &str) -> Result<Arc<dyn RemoteProxy>> {
        *self.peers.opened.entry(target.clone()).or_insert(0) += 1;
        Ok(Arc::new(LoopbackProxy {
            target: target.clone(),
            address: address.to_string(),
            peers: self.peers.clone(),
        }))
    }
}

struct LoopbackProxy {
    target: NodeId,
    address: String,
    peers: Arc<Peers>,
}

impl LoopbackProxy {
    fn refused(&self) -> Error {
        Error::Transport {
            node: self.target.clone(),
            kind: TransportFailure::Connect,
            message: format!("connection refused ({})", self.address),
        }
    }
}

#[async_trait]
impl RemoteProxy for LoopbackProxy {
    fn target(&self) -> &NodeId {
        &self.target
    }

    fn address(&self) -> &str {
        &self.address
    }

    async fn invoke(&self, envelope: &CallEnvelope) -> Result<CallReply> {
        let delay = self.peers.latency.get(&self.target).map(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.peers.unreachable.contains(&self.target) {
            return Err(self.refused());
        }
        let registry = self
            .peers
            .registries
            .get(&self.target)
            .map(|r| r.clone())
            .ok_or_else(|| self.refused())?;

        if envelope.target_node != self.target {
            let err = Error::RoutingInvariant {
                expected: self.target.clone(),
                actual: envelope.target_node.clone(),
            };
            return Ok(CallReply::Error(RemoteFault::from_error(&err, &self.target)));
        }

        Ok(match registry.invoke(envelope).await {
            Ok(value) => CallReply::Result(value),
            Err(e) => CallReply::Error(RemoteFault::from_error(&e, &self.target)),
        })
    }
}
