//! Call routing
//!
//! Every call, probes included, goes through [`CallRouter::call`]. Calls to
//! this node are served straight from the local registry when
//! `use_local_call_for_self` is on; everything else goes through the cached
//! proxy for the target node. There is no retry here.

use crate::cluster::{NodeDirectory, NodeId};
use crate::common::{ClusterConfig, Error, Result};
use crate::rpc::envelope::{Arguments, CallEnvelope, CallReply};
use crate::rpc::proxy::{RemoteProxyCache, Transport};
use crate::rpc::registry::ServiceRegistry;
use serde_json::Value;
use std::sync::Arc;

pub struct CallRouter {
    directory: Arc<dyn NodeDirectory>,
    registry: Arc<ServiceRegistry>,
    proxies: RemoteProxyCache,
    use_local_call_for_self: bool,
}

impl CallRouter {
    pub fn new(
        directory: Arc<dyn NodeDirectory>,
        registry: Arc<ServiceRegistry>,
        transport: Arc<dyn Transport>,
        config: &ClusterConfig,
    ) -> Self {
        Self {
            proxies: RemoteProxyCache::new(transport, directory.clone()),
            directory,
            registry,
            use_local_call_for_self: config.use_local_call_for_self,
        }
    }

    pub fn this_node(&self) -> NodeId {
        self.directory.this_node()
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn proxies(&self) -> &RemoteProxyCache {
        &self.proxies
    }

    /// Call `service.operation` on `target`, locally or remotely.
    pub async fn call(
        &self,
        source: &NodeId,
        target: Option<&NodeId>,
        service: &str,
        operation: &str,
        args: Arguments,
    ) -> Result<Value> {
        let target = target.ok_or_else(|| {
            Error::Routing(format!("no target node for {}.{}", service, operation))
        })?;
        let envelope = CallEnvelope::new(source, target, service, operation, args);

        if self.use_local_call_for_self && *target == self.directory.this_node() {
            tracing::debug!("Local call {}.{} from {}", service, operation, source);
            return self.registry.invoke(&envelope).await;
        }

        self.call_remote(&envelope).await
    }

    /// Serve a call that must be addressed to this node.
    ///
    /// A call for any other node means a peer routed it wrongly; that is
    /// reported as a routing invariant violation and never retried.
    pub async fn call_local(&self, envelope: &CallEnvelope) -> Result<Value> {
        if envelope.target_node.as_str().is_empty() {
            return Err(Error::Routing(format!(
                "no target node for {}.{}",
                envelope.service_name, envelope.operation_name
            )));
        }
        let this_node = self.directory.this_node();
        if envelope.target_node != this_node {
            tracing::error!(
                "Call {}.{} from {} is addressed to {} but arrived at {}",
                envelope.service_name,
                envelope.operation_name,
                envelope.source_node,
                envelope.target_node,
                this_node
            );
            return Err(Error::RoutingInvariant {
                expected: this_node,
                actual: envelope.target_node.clone(),
            });
        }
        self.registry.invoke(envelope).await
    }

    async fn call_remote(&self, envelope: &CallEnvelope) -> Result<Value> {
        let target = &envelope.target_node;
        let proxy = self.proxies.get_or_create(target)?;
        tracing::debug!(
            "Remote call {}.{} to {} at {}",
            envelope.service_name,
            envelope.operation_name,
            target,
            proxy.address()
        );

        match proxy.invoke(envelope).await {
            Ok(CallReply::Result(value)) => Ok(value),
            Ok(CallReply::Error(fault)) => Err(fault.into_error(envelope)),
            Err(e) if e.is_connect_failure() => {
                tracing::warn!(
                    "Unable to connect to node {} at {}: {}",
                    target,
                    proxy.address(),
                    e
                );
                self.proxies.invalidate(target);
                Err(e)
            }
            Err(e) => {
                tracing::warn!(
                    "Call {}.{} to node {} failed: {}",
                    envelope.service_name,
                    envelope.operation_name,
                    target,
                    e
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::StaticNodeDirectory;
    use crate::common::NodeEntry;
    use crate::rpc::loopback::LoopbackTransport;
    use serde_json::json;

    struct Fixture {
        transport: Arc<LoopbackTransport>,
        router: CallRouter,
        a: NodeId,
        b: NodeId,
    }

    fn registry() -> Arc<ServiceRegistry> {
        Arc::new(
            ServiceRegistry::builder()
                .register("Echo", "echo", &["String"], |ctx| async move {
                    Ok::<_, anyhow::Error>(ctx.arguments[0].clone())
                })
                .register("Echo", "fail", &[], |_ctx| async move {
                    Err::<Value, _>(anyhow::anyhow!("index locked"))
                })
                .build(),
        )
    }

    fn fixture(use_local_call_for_self: bool) -> Fixture {
        let (a, b) = (NodeId::from("node-a"), NodeId::from("node-b"));
        let entries = [&a, &b].map(|id| NodeEntry {
            id: id.clone(),
            address: format!("loop://{}", id),
            enabled: true,
            priority: 1,
        });
        let directory = Arc::new(StaticNodeDirectory::new(a.clone(), entries));
        let transport = Arc::new(LoopbackTransport::new());
        let local = registry();
        transport.attach(a.clone(), local.clone());
        transport.attach(b.clone(), registry());

        let config = ClusterConfig {
            use_local_call_for_self,
            ..Default::default()
        };
        let router = CallRouter::new(directory, local, transport.clone(), &config);
        Fixture {
            transport,
            router,
            a,
            b,
        }
    }

    fn echo_args() -> Arguments {
        Arguments::new().with("String", json!("hello"))
    }

    #[tokio::test]
    async fn test_self_call_stays_local() {
        let f = fixture(true);
        let result = f
            .router
            .call(&f.a, Some(&f.a), "Echo", "echo", echo_args())
            .await
            .unwrap();
        assert_eq!(result, json!("hello"));
        assert_eq!(f.transport.opened(&f.a), 0);
        assert!(!f.router.proxies().contains(&f.a));
    }

    #[tokio::test]
    async fn test_self_call_goes_remote_when_optimization_off() {
        let f = fixture(false);
        f.router
            .call(&f.a, Some(&f.a), "Echo", "echo", echo_args())
            .await
            .unwrap();
        assert_eq!(f.transport.opened(&f.a), 1);
    }

    #[tokio::test]
    async fn test_missing_target() {
        let f = fixture(true);
        let err = f
            .router
            .call(&f.a, None, "Echo", "echo", echo_args())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Routing(_)));
    }

    #[tokio::test]
    async fn test_remote_call_reuses_proxy() {
        let f = fixture(true);
        for _ in 0..3 {
            let result = f
                .router
                .call(&f.a, Some(&f.b), "Echo", "echo", echo_args())
                .await
                .unwrap();
            assert_eq!(result, json!("hello"));
        }
        assert_eq!(f.transport.opened(&f.b), 1);
    }

    #[tokio::test]
    async fn test_unreachable_peer() {
        let f = fixture(true);
        f.router
            .call(&f.a, Some(&f.b), "Echo", "echo", echo_args())
            .await
            .unwrap();
        f.transport.disconnect(&f.b);

        let err = f
            .router
            .call(&f.a, Some(&f.b), "Echo", "echo", echo_args())
            .await
            .unwrap_err();
        assert!(err.is_connect_failure());
        assert!(!f.router.proxies().contains(&f.b));

        f.transport.reconnect(&f.b);
        f.router
            .call(&f.a, Some(&f.b), "Echo", "echo", echo_args())
            .await
            .unwrap();
        assert_eq!(f.transport.opened(&f.b), 2);
    }

    #[tokio::test]
    async fn test_remote_failure_is_mapped_back() {
        let f = fixture(true);
        let err = f
            .router
            .call(&f.a, Some(&f.b), "Echo", "fail", Arguments::new())
            .await
            .unwrap_err();
        match &err {
            Error::Invocation { message, .. } => assert_eq!(message, "index locked"),
            other => panic!("unexpected error: {:?}", other),
        }

        let err = f
            .router
            .call(&f.a, Some(&f.b), "Echo", "missing", Arguments::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoSuchOperation { .. }));
    }

    #[tokio::test]
    async fn test_call_local_rejects_foreign_target() {
        let f = fixture(true);
        let envelope = CallEnvelope::new(&f.b, &f.b, "Echo", "echo", echo_args());
        let err = f.router.call_local(&envelope).await.unwrap_err();
        assert!(matches!(
            err,
            Error::RoutingInvariant {
                ref expected,
                ref actual,
            } if *expected == f.a && *actual == f.b
        ));

        let envelope = CallEnvelope::new(&f.b, &f.a, "Echo", "echo", echo_args());
        assert_eq!(f.router.call_local(&envelope).await.unwrap(), json!("hello"));
    }
}
