//! Call envelope exchanged between nodes
//!
//! A request names the service, operation and argument types; the reply is
//! either `{"result": ...}` or `{"error": {...}}`.

use crate::cluster::NodeId;
use crate::common::{Cause, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Positional call arguments with their declared type names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Arguments {
    pub types: Vec<String>,
    pub values: Vec<Value>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw JSON argument.
    pub fn with(mut self, type_name: impl Into<String>, value: Value) -> Self {
        self.types.push(type_name.into());
        self.values.push(value);
        self
    }

    /// Append any serializable argument.
    pub fn with_serialized<T: Serialize>(
        self,
        type_name: impl Into<String>,
        value: &T,
    ) -> Result<Self> {
        let value = serde_json::to_value(value)
            .map_err(|e| Error::Internal(format!("Serialize error: {}", e)))?;
        Ok(self.with(type_name, value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One call as it travels to the target node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEnvelope {
    pub source_node: NodeId,
    pub target_node: NodeId,
    pub service_name: String,
    pub operation_name: String,
    #[serde(default)]
    pub argument_types: Vec<String>,
    #[serde(default)]
    pub arguments: Vec<Value>,
}

impl CallEnvelope {
    pub fn new(
        source: &NodeId,
        target: &NodeId,
        service: &str,
        operation: &str,
        args: Arguments,
    ) -> Self {
        Self {
            source_node: source.clone(),
            target_node: target.clone(),
            service_name: service.to_string(),
            operation_name: operation.to_string(),
            argument_types: args.types,
            arguments: args.values,
        }
    }
}

/// Outcome of a call as carried back over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallReply {
    Result(Value),
    Error(RemoteFault),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    NoSuchOperation,
    Invocation,
    Routing,
    RoutingInvariant,
    Other,
}

/// An error raised on the remote node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFault {
    pub kind: FaultKind,
    pub message: String,
    /// Cause chain below `message`, outermost first
    #[serde(default)]
    pub causes: Vec<String>,
    /// Node that raised the fault
    pub node: NodeId,
}

impl RemoteFault {
    pub fn from_error(err: &Error, node: &NodeId) -> Self {
        let (kind, message) = match err {
            Error::NoSuchOperation { .. } => (FaultKind::NoSuchOperation, err.to_string()),
            Error::Invocation { message, .. } => (FaultKind::Invocation, message.clone()),
            Error::Routing(message) => (FaultKind::Routing, message.clone()),
            Error::RoutingInvariant { .. } => (FaultKind::RoutingInvariant, err.to_string()),
            _ => (FaultKind::Other, err.to_string()),
        };
        Self {
            kind,
            message,
            causes: err.cause_chain(),
            node: node.clone(),
        }
    }

    /// Rebuild the local error for a call that failed remotely.
    pub fn into_error(self, envelope: &CallEnvelope) -> Error {
        match self.kind {
            FaultKind::NoSuchOperation => Error::NoSuchOperation {
                service: envelope.service_name.clone(),
                operation: envelope.operation_name.clone(),
                arg_types: envelope.argument_types.clone(),
            },
            FaultKind::Routing => Error::Routing(self.message),
            FaultKind::RoutingInvariant => Error::RoutingInvariant {
                expected: self.node,
                actual: envelope.target_node.clone(),
            },
            FaultKind::Invocation | FaultKind::Other => Error::Invocation {
                service: envelope.service_name.clone(),
                operation: envelope.operation_name.clone(),
                message: self.message,
                source: RemoteCause::chain(self.causes),
            },
        }
    }
}

/// Cause reconstructed from a remote cause chain.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct RemoteCause {
    message: String,
    #[source]
    next: Option<Box<RemoteCause>>,
}

impl RemoteCause {
    fn chain(causes: Vec<String>) -> Option<Cause> {
        causes
            .into_iter()
            .rev()
            .fold(None::<Box<RemoteCause>>, |next, message| {
                Some(Box::new(RemoteCause { message, next }))
            })
            .map(|cause| cause as Cause)
    }
}
