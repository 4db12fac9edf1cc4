//! Call routing between nodes over the loopback transport

mod common;

use anyhow::Context;
use common::TestCluster;
use nodemesh::cluster::{NodeId, RefreshMode};
use nodemesh::common::TransportFailure;
use nodemesh::rpc::{Arguments, CallContext, ServiceRegistryBuilder};
use nodemesh::Error;
use serde_json::{json, Value};
use std::time::Duration;

fn index_services(node: &NodeId) -> ServiceRegistryBuilder {
    let owner = node.clone();
    ServiceRegistryBuilder::new()
        .register("Index", "shardOwner", &["String"], move |ctx: CallContext| {
            let owner = owner.clone();
            async move {
                let shard: String = ctx.arg(0)?;
                Ok::<_, anyhow::Error>(json!({
                    "shard": shard,
                    "owner": owner,
                    "asked_by": ctx.source_node,
                }))
            }
        })
        .register("Index", "flush", &["String"], |ctx: CallContext| async move {
            let shard: String = ctx.arg(0)?;
            let cause = anyhow::anyhow!("disk full");
            Err::<Value, anyhow::Error>(cause.context(format!("flushing {}", shard)))
        })
        .register("Index", "count", &[], |_ctx: CallContext| async move {
            let n: u64 = "42".parse().context("bad count")?;
            Ok::<_, anyhow::Error>(json!(n))
        })
}

fn index_cluster() -> TestCluster {
    TestCluster::build(&[("node-a", 1), ("node-b", 1)], Duration::ZERO, index_services)
}

fn shard(name: &str) -> Arguments {
    Arguments::new().with("String", json!(name))
}

#[tokio::test]
async fn test_remote_call_reaches_target() {
    let cluster = index_cluster();
    let a = cluster.node("node-a");
    let b = NodeId::from("node-b");

    let reply = a
        .router
        .call(&a.id, Some(&b), "Index", "shardOwner", shard("s1"))
        .await
        .unwrap();
    assert_eq!(reply["owner"], "node-b");
    assert_eq!(reply["asked_by"], "node-a");
    assert!(a.router.proxies().contains(&b));
}

#[tokio::test]
async fn test_self_call_stays_local() {
    let cluster = index_cluster();
    let a = cluster.node("node-a");

    let reply = a
        .router
        .call(&a.id, Some(&a.id), "Index", "shardOwner", shard("s1"))
        .await
        .unwrap();
    assert_eq!(reply["owner"], "node-a");
    assert!(a.router.proxies().is_empty());
    assert_eq!(cluster.transport.opened(&a.id), 0);
}

#[tokio::test]
async fn test_missing_target_is_a_routing_error() {
    let cluster = TestCluster::new(&[("node-a", 1)]);
    let a = cluster.node("node-a");

    let err = a
        .router
        .call(&a.id, None, "Index", "count", Arguments::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Routing(_)));
}

#[tokio::test]
async fn test_operations_resolve_by_signature() {
    let cluster = index_cluster();
    let a = cluster.node("node-a");
    let b = NodeId::from("node-b");

    let count = a
        .router
        .call(&a.id, Some(&b), "Index", "count", Arguments::new())
        .await
        .unwrap();
    assert_eq!(count, json!(42));

    // Same name, different argument types
    let err = a
        .router
        .call(&a.id, Some(&b), "Index", "count", shard("s1"))
        .await
        .unwrap_err();
    match err {
        Error::NoSuchOperation {
            service, operation, ..
        } => {
            assert_eq!(service, "Index");
            assert_eq!(operation, "count");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_remote_failure_keeps_cause_chain() {
    let cluster = index_cluster();
    let a = cluster.node("node-a");

    let err = a
        .router
        .call(&a.id, Some(&NodeId::from("node-b")), "Index", "flush", shard("s9"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Invocation { .. }));
    let chain = err.cause_chain();
    assert!(chain.iter().any(|c| c.contains("disk full")), "chain: {:?}", chain);
}

#[tokio::test]
async fn test_unreachable_target_leaves_state_alone() {
    let cluster = index_cluster();
    let a = cluster.node("node-a");
    let b = NodeId::from("node-b");

    a.refresher
        .refresh(RefreshMode::Full)
        .await
        .unwrap()
        .settled(None)
        .await
        .unwrap();
    let before = a.state().snapshot();
    assert!(before.is_active(&b));

    cluster.transport.disconnect(&b);
    let err = a
        .router
        .call(&a.id, Some(&b), "Index", "shardOwner", shard("s1"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Transport {
            kind: TransportFailure::Connect,
            ..
        }
    ));
    assert!(err.is_transport());

    // Ordinary calls never touch membership; the broken proxy is dropped
    assert_eq!(a.state().snapshot(), before);
    assert!(!a.router.proxies().contains(&b));

    cluster.transport.reconnect(&b);
    a.router
        .call(&a.id, Some(&b), "Index", "shardOwner", shard("s1"))
        .await
        .unwrap();
    assert_eq!(cluster.transport.opened(&b), 2);
}

#[tokio::test]
async fn test_misrouted_call_is_rejected() {
    let cluster = TestCluster::new(&[("node-a", 1), ("node-b", 1)]);
    let a = cluster.node("node-a");
    let b = cluster.node("node-b");

    let envelope = nodemesh::rpc::CallEnvelope::new(
        &a.id,
        &NodeId::from("node-c"),
        nodemesh::rpc::NODE_HEALTH_SERVICE,
        nodemesh::rpc::PING_OPERATION,
        Arguments::new().with(nodemesh::rpc::NODE_ID_TYPE, json!("node-a")),
    );

    let err = b.router.call_local(&envelope).await.unwrap_err();
    match err {
        Error::RoutingInvariant { expected, actual } => {
            assert_eq!(expected, NodeId::from("node-b"));
            assert_eq!(actual, NodeId::from("node-c"));
        }
        other => panic!("unexpected error: {}", other),
    }
}
