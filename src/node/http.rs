//! HTTP API of a node
//!
//! - `POST /cluster/call`: inbound calls from peers (must target this node)
//! - `POST /cluster/invoke`: route a call to any node from this one
//! - `GET /cluster/state`: current cluster snapshot
//! - `GET /cluster/master`: current master node
//! - `GET /cluster/nodes`: per-node status with last probe result
//! - `POST /cluster/refresh`: run a refresh cycle now
//! - `GET /health/live`: liveness

use crate::cluster::{MembershipRefresher, NodeDirectory, NodeId, ProbeRecord, RefreshMode};
use crate::common::{Error, NodeStatus};
use crate::rpc::http_client::CALL_PATH;
use crate::rpc::{Arguments, CallEnvelope, CallReply, CallRouter, RemoteFault};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct NodeState {
    pub directory: Arc<dyn NodeDirectory>,
    pub router: Arc<CallRouter>,
    pub refresher: Arc<MembershipRefresher>,
}

pub fn create_router(state: NodeState) -> Router {
    Router::new()
        .route(CALL_PATH, post(inbound_call))
        .route("/cluster/invoke", post(invoke))
        .route("/cluster/state", get(cluster_state))
        .route("/cluster/master", get(master))
        .route("/cluster/nodes", get(list_nodes))
        .route("/cluster/refresh", post(refresh))
        .route("/health/live", get(health_live))
        .with_state(state)
}

fn error_response(e: &Error) -> Response {
    (
        e.to_http_status(),
        Json(json!({ "error": e.to_string(), "causes": e.cause_chain() })),
    )
        .into_response()
}

async fn inbound_call(
    State(state): State<NodeState>,
    Json(envelope): Json<CallEnvelope>,
) -> Response {
    match state.router.call_local(&envelope).await {
        Ok(value) => (StatusCode::OK, Json(CallReply::Result(value))).into_response(),
        Err(e) => {
            let fault = RemoteFault::from_error(&e, &state.router.this_node());
            (e.to_http_status(), Json(CallReply::Error(fault))).into_response()
        }
    }
}

/// Body of `POST /cluster/invoke`
#[derive(Debug, Deserialize)]
pub struct InvokeRequest {
    pub target: Option<NodeId>,
    pub service: String,
    pub operation: String,
    #[serde(default)]
    pub argument_types: Vec<String>,
    #[serde(default)]
    pub arguments: Vec<Value>,
}

async fn invoke(State(state): State<NodeState>, Json(req): Json<InvokeRequest>) -> Response {
    let source = state.router.this_node();
    let args = Arguments {
        types: req.argument_types,
        values: req.arguments,
    };
    match state
        .router
        .call(&source, req.target.as_ref(), &req.service, &req.operation, args)
        .await
    {
        Ok(value) => Json(json!({ "result": value })).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn cluster_state(State(state): State<NodeState>) -> Response {
    Json(state.refresher.state().snapshot()).into_response()
}

async fn master(State(state): State<NodeState>) -> Response {
    match state.refresher.state().master_node() {
        Ok(master) => Json(json!({ "master": master })).into_response(),
        Err(e) => error_response(&e),
    }
}

/// One row of `GET /cluster/nodes`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeView {
    pub id: NodeId,
    pub address: Option<String>,
    pub enabled: bool,
    pub priority: i32,
    pub status: NodeStatus,
    pub master: bool,
    pub this_node: bool,
    pub last_probe: Option<ProbeRecord>,
}

async fn list_nodes(State(state): State<NodeState>) -> Response {
    let nodes = match state.directory.list_all() {
        Ok(nodes) => nodes,
        Err(e) => return error_response(&e),
    };
    let snapshot = state.refresher.state().snapshot();
    let this_node = state.directory.this_node();

    let views: Vec<NodeView> = nodes
        .into_iter()
        .map(|id| {
            let enabled = state.directory.is_enabled(&id);
            NodeView {
                address: state.directory.address_of(&id).ok(),
                enabled,
                priority: state.directory.priority(&id),
                status: NodeStatus::from_flags(enabled, snapshot.is_active(&id)),
                master: snapshot.is_master(&id),
                this_node: id == this_node,
                last_probe: snapshot.probes.get(&id).cloned(),
                id,
            }
        })
        .collect();
    Json(views).into_response()
}

#[derive(Debug, Default, Deserialize)]
struct RefreshParams {
    /// Wait for every probe before answering
    #[serde(default)]
    settle: bool,
    /// Skip probes and election
    #[serde(default)]
    membership_only: bool,
    /// Bound on the settle wait
    timeout_ms: Option<u64>,
}

async fn refresh(State(state): State<NodeState>, Query(params): Query<RefreshParams>) -> Response {
    let mode = if params.membership_only {
        RefreshMode::MembershipOnly
    } else {
        RefreshMode::Full
    };
    let handle = match state.refresher.refresh(mode).await {
        Ok(handle) => handle,
        Err(e) => return error_response(&e),
    };
    let submitted = handle.submitted();

    if params.settle {
        if let Err(e) = handle
            .settled(params.timeout_ms.map(Duration::from_millis))
            .await
        {
            return error_response(&e);
        }
    }

    Json(json!({
        "submitted": submitted,
        "settled": params.settle,
        "state": state.refresher.state().snapshot(),
    }))
    .into_response()
}

async fn health_live(State(state): State<NodeState>) -> impl IntoResponse {
    Json(json!({ "status": "alive", "node": state.router.this_node() }))
}
