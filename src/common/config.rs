//! Configuration for a nodemesh node
//!
//! Values come from an optional TOML file (path taken from `NODEMESH_CONFIG`,
//! `config.toml` otherwise), overlaid with `NODEMESH__*` environment
//! variables. Binaries apply their CLI flags on top and then call
//! [`Config::validate`].

use crate::cluster::NodeId;
use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "NODEMESH_CONFIG";

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Identity of this process in the cluster
    #[serde(default)]
    pub node_id: NodeId,

    /// Bind address for the node HTTP API
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Membership and call routing settings
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Every configured node, this one included
    #[serde(default)]
    pub nodes: Vec<NodeEntry>,
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 7400))
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Membership and call routing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Short-circuit calls whose target is this node
    #[serde(default = "default_true")]
    pub use_local_call_for_self: bool,

    /// Read timeout for outbound calls (none = transport default)
    #[serde(default)]
    pub remote_call_read_timeout_ms: Option<u64>,

    /// Skip TLS hostname verification on outbound calls
    #[serde(default)]
    pub ignore_tls_hostname_verification: bool,

    /// Period between membership refreshes
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_ms: u64,

    /// Delay before the first probe wave
    #[serde(default = "default_quiet_period")]
    pub quiet_period_ms: u64,
}

fn default_true() -> bool {
    true
}
fn default_refresh_interval() -> u64 {
    10_000
}
fn default_quiet_period() -> u64 {
    2_000
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            use_local_call_for_self: true,
            remote_call_read_timeout_ms: None,
            ignore_tls_hostname_verification: false,
            refresh_interval_ms: default_refresh_interval(),
            quiet_period_ms: default_quiet_period(),
        }
    }
}

impl ClusterConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.remote_call_read_timeout_ms.map(Duration::from_millis)
    }
}

/// One configured cluster member
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeEntry {
    pub id: NodeId,

    /// Base URL of the node API, e.g. `http://10.0.0.5:7400`
    pub address: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Higher wins the master election
    #[serde(default = "default_priority")]
    pub priority: i32,
}

fn default_priority() -> i32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: NodeId::default(),
            bind_addr: default_bind_addr(),
            log_level: default_log_level(),
            cluster: ClusterConfig::default(),
            nodes: Vec::new(),
        }
    }
}

impl Config {
    /// Load from the file named by `NODEMESH_CONFIG` (or `config.toml`).
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from(path)
    }

    /// Load from `path`; a missing file yields defaults plus environment.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("NODEMESH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Reject configurations a node cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.node_id.as_str().is_empty() {
            return Err(Error::InvalidConfig("node_id must be set".into()));
        }
        if self.cluster.refresh_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "cluster.refresh_interval_ms must be positive".into(),
            ));
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.id.as_str().is_empty() {
                return Err(Error::InvalidConfig("node entry with empty id".into()));
            }
            if !seen.insert(&node.id) {
                return Err(Error::InvalidConfig(format!("duplicate node id: {}", node.id)));
            }
        }
        if !seen.contains(&self.node_id) {
            return Err(Error::InvalidConfig(format!(
                "node_id {} is not listed in nodes",
                self.node_id
            )));
        }

        Ok(())
    }
}
