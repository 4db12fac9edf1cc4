//! Outbound call handles and their per-node cache

use crate::cluster::{NodeDirectory, NodeId};
use crate::common::Result;
use crate::rpc::envelope::{CallEnvelope, CallReply};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// A handle able to deliver calls to one remote node.
#[async_trait]
pub trait RemoteProxy: Send + Sync {
    fn target(&self) -> &NodeId;

    /// Address the handle was opened against.
    fn address(&self) -> &str;

    /// Deliver `envelope`. `Err` means the call never produced a reply
    /// (always a transport error); remote failures come back as
    /// [`CallReply::Error`].
    async fn invoke(&self, envelope: &CallEnvelope) -> Result<CallReply>;
}

/// Wire implementation: opens call handles to peers.
pub trait Transport: Send + Sync {
    fn open(&self, target: &NodeId, address: &str) -> Result<Arc<dyn RemoteProxy>>;
}

/// One [`RemoteProxy`] per target node, created on first use.
///
/// Creation goes through the map's entry API, which holds the shard lock, so
/// concurrent first calls to the same node construct exactly one proxy. A
/// proxy is replaced when the directory reports a new address for its node
/// and can be dropped explicitly with [`RemoteProxyCache::invalidate`].
pub struct RemoteProxyCache {
    transport: Arc<dyn Transport>,
    directory: Arc<dyn NodeDirectory>,
    proxies: DashMap<NodeId, Arc<dyn RemoteProxy>>,
}

impl RemoteProxyCache {
    pub fn new(transport: Arc<dyn Transport>, directory: Arc<dyn NodeDirectory>) -> Self {
        Self {
            transport,
            directory,
            proxies: DashMap::new(),
        }
    }

    pub fn get_or_create(&self, target: &NodeId) -> Result<Arc<dyn RemoteProxy>> {
        let address = self.directory.address_of(target)?;

        match self.proxies.entry(target.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().address() == address {
                    return Ok(entry.get().clone());
                }
                tracing::info!(
                    "Address of node {} changed from {} to {}, reopening proxy",
                    target,
                    entry.get().address(),
                    address
                );
                let proxy = self.transport.open(target, &address)?;
                entry.insert(proxy.clone());
                Ok(proxy)
            }
            Entry::Vacant(entry) => {
                tracing::debug!("Opening proxy to node {} at {}", target, address);
                let proxy = self.transport.open(target, &address)?;
                entry.insert(proxy.clone());
                Ok(proxy)
            }
        }
    }

    /// Forget the proxy for `target`; the next call opens a fresh one.
    pub fn invalidate(&self, target: &NodeId) -> bool {
        self.proxies.remove(target).is_some()
    }

    pub fn contains(&self, target: &NodeId) -> bool {
        self.proxies.contains_key(target)
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}
