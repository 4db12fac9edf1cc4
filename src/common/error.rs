//! Error types for nodemesh

use crate::cluster::NodeId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Boxed cause carried by invocation errors.
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// How a call to a peer failed at the transport level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    /// The peer could not be reached at all.
    Connect,
    /// The peer accepted the connection but did not answer in time.
    Timeout,
    /// Anything else: bad status, undecodable reply, TLS, ...
    Protocol,
}

impl std::fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportFailure::Connect => write!(f, "connect"),
            TransportFailure::Timeout => write!(f, "timeout"),
            TransportFailure::Protocol => write!(f, "protocol"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    // === Routing Errors ===
    #[error("Routing error: {0}")]
    Routing(String),

    #[error("Local call for node {actual} received by node {expected}")]
    RoutingInvariant { expected: NodeId, actual: NodeId },

    // === Invocation Errors ===
    #[error("No such operation: {service}.{operation}({})", .arg_types.join(", "))]
    NoSuchOperation {
        service: String,
        operation: String,
        arg_types: Vec<String>,
    },

    #[error("{service}.{operation} failed: {message}")]
    Invocation {
        service: String,
        operation: String,
        message: String,
        #[source]
        source: Option<Cause>,
    },

    // === Network Errors ===
    #[error("Transport error ({kind}) calling {node}: {message}")]
    Transport {
        node: NodeId,
        kind: TransportFailure,
        message: String,
    },

    // === Membership Errors ===
    #[error("Refresh interrupted")]
    Interrupted,

    #[error("Cluster state has not been computed yet")]
    NoClusterState,

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation timeout: {0}")]
    Timeout(String),
}

impl Error {
    /// Was this a failure to reach a peer?
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }

    /// Is this a peer that could not be connected to at all?
    pub fn is_connect_failure(&self) -> bool {
        matches!(
            self,
            Error::Transport {
                kind: TransportFailure::Connect,
                ..
            }
        )
    }

    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Error::Routing(_) | Error::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            Error::RoutingInvariant { .. } => StatusCode::MISDIRECTED_REQUEST,
            Error::NoSuchOperation { .. } | Error::NodeNotFound(_) => StatusCode::NOT_FOUND,
            Error::NoClusterState => StatusCode::SERVICE_UNAVAILABLE,
            Error::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            Error::Transport {
                kind: TransportFailure::Timeout,
                ..
            } => StatusCode::GATEWAY_TIMEOUT,
            Error::Transport { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Messages of every error in the `source()` chain, outermost first.
    pub fn cause_chain(&self) -> Vec<String> {
        let mut causes = Vec::new();
        let mut current = std::error::Error::source(self);
        while let Some(err) = current {
            causes.push(err.to_string());
            current = err.source();
        }
        causes
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}
