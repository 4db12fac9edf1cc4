//! Cluster membership
//!
//! - `directory`: which nodes exist, whether they are enabled, their priority and address
//! - `state`: the published snapshot of membership, reachability and leadership
//! - `membership`: the refresher that recomputes the snapshot by probing peers

pub mod directory;
pub mod membership;
pub mod state;

pub use directory::{NodeDirectory, StaticNodeDirectory};
pub use membership::{elect_master, MembershipRefresher, ProbeOutcome, RefreshHandle, RefreshMode};
pub use state::{ClusterSnapshot, ClusterState, ProbeRecord};

use serde::{Deserialize, Serialize};

/// Stable identifier of a cluster member.
///
/// Ordered by its string form so node sets iterate the same way everywhere.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
