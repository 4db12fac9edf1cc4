//! # nodemesh
//!
//! Cluster plumbing for nodes of a clustered data-processing service:
//! - which peers exist and are administratively enabled
//! - which of them answered the last reachability probe
//! - which enabled node is master (highest priority, ties to the smallest id)
//! - one call path for invoking `service.operation` on any node, this one included
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐   list/enabled/priority   ┌─────────────────┐
//! │ MembershipRefresher  │ ─────────────────────────▶│  NodeDirectory  │
//! │  (timer / on demand) │                           └─────────────────┘
//! └───┬─────────────┬────┘
//!     │ publish     │ NodeHealth.ping (one task per peer)
//! ┌───▼──────────┐ ┌▼───────────────┐  self   ┌──────────────────┐
//! │ ClusterState │ │   CallRouter   │ ──────▶ │ ServiceRegistry  │
//! │  (snapshot)  │ └───────┬────────┘         └──────────────────┘
//! └──────────────┘         │ peers
//!                  ┌───────▼────────┐         ┌──────────────────┐
//!                  │RemoteProxyCache│ ──────▶ │    Transport     │
//!                  └────────────────┘         │ (HTTP, loopback) │
//!                                             └──────────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start a node
//! ```bash
//! NODEMESH_CONFIG=./node-a.toml nodemesh-node serve --id node-a --bind 0.0.0.0:7400
//! ```
//!
//! ### Inspect the cluster
//! ```bash
//! nodemesh --node http://localhost:7400 nodes
//! nodemesh --node http://localhost:7400 refresh --settle
//! nodemesh --node http://localhost:7400 call NodeHealth ping --target node-b --arg NodeId='"node-a"'
//! ```

pub mod cluster;
pub mod common;
pub mod node;
pub mod rpc;

// Re-export commonly used types
pub use cluster::{ClusterSnapshot, ClusterState, MembershipRefresher, NodeDirectory, NodeId};
pub use common::{Config, Error, Result};
pub use node::NodeServer;
pub use rpc::{CallRouter, ServiceRegistry};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
