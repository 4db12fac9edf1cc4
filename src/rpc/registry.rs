//! Local service registry
//!
//! Maps `(service, operation, argument types)` to an async handler. The table
//! is assembled once at startup with [`ServiceRegistryBuilder`] and is
//! read-only afterwards, so it is shared through an `Arc` without locking.

use crate::cluster::NodeId;
use crate::common::{Error, Result};
use crate::rpc::envelope::CallEnvelope;
use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Service answering reachability probes.
pub const NODE_HEALTH_SERVICE: &str = "NodeHealth";
/// Probe operation; takes the caller's node id, returns null.
pub const PING_OPERATION: &str = "ping";
/// Declared type of node id arguments.
pub const NODE_ID_TYPE: &str = "NodeId";

pub type HandlerFuture = BoxFuture<'static, anyhow::Result<Value>>;
pub type Handler = Arc<dyn Fn(CallContext) -> HandlerFuture + Send + Sync>;

/// What a handler gets to see of a call.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub source_node: NodeId,
    pub arguments: Vec<Value>,
}

impl CallContext {
    /// Decode positional argument `index`.
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> anyhow::Result<T> {
        let value = self
            .arguments
            .get(index)
            .ok_or_else(|| anyhow::anyhow!("missing argument {}", index))?;
        Ok(serde_json::from_value(value.clone())?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct OperationKey {
    service: String,
    operation: String,
    arg_types: Vec<String>,
}

impl OperationKey {
    fn new(service: &str, operation: &str, arg_types: &[String]) -> Self {
        Self {
            service: service.to_string(),
            operation: operation.to_string(),
            arg_types: arg_types.to_vec(),
        }
    }
}

/// Startup-time builder for [`ServiceRegistry`].
#[derive(Default)]
pub struct ServiceRegistryBuilder {
    handlers: HashMap<OperationKey, Handler>,
}

impl ServiceRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `service.operation(arg_types...)`.
    ///
    /// A later registration for the same signature replaces the earlier one.
    pub fn register<F, Fut>(
        mut self,
        service: &str,
        operation: &str,
        arg_types: &[&str],
        handler: F,
    ) -> Self
    where
        F: Fn(CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let arg_types: Vec<String> = arg_types.iter().map(|t| t.to_string()).collect();
        let key = OperationKey::new(service, operation, &arg_types);
        let handler: Handler =
            Arc::new(move |ctx: CallContext| -> HandlerFuture { Box::pin(handler(ctx)) });
        if self.handlers.insert(key, handler).is_some() {
            tracing::warn!("Replacing handler for {}.{}", service, operation);
        }
        self
    }

    /// Freeze the table. The probe operation is always present.
    pub fn build(self) -> ServiceRegistry {
        let registry = self.register(NODE_HEALTH_SERVICE, PING_OPERATION, &[NODE_ID_TYPE], ping);
        tracing::debug!("Service registry built with {} operations", registry.handlers.len());
        ServiceRegistry {
            handlers: registry.handlers,
        }
    }
}

async fn ping(ctx: CallContext) -> anyhow::Result<Value> {
    let caller: NodeId = ctx.arg(0)?;
    tracing::trace!("Ping from {}", caller);
    Ok(Value::Null)
}

/// Immutable table of locally callable operations.
pub struct ServiceRegistry {
    handlers: HashMap<OperationKey, Handler>,
}

impl ServiceRegistry {
    pub fn builder() -> ServiceRegistryBuilder {
        ServiceRegistryBuilder::new()
    }

    pub fn resolve(&self, service: &str, operation: &str, arg_types: &[String]) -> Option<Handler> {
        self.handlers
            .get(&OperationKey::new(service, operation, arg_types))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run the operation named by `envelope` on this node.
    pub async fn invoke(&self, envelope: &CallEnvelope) -> Result<Value> {
        let handler = self
            .resolve(
                &envelope.service_name,
                &envelope.operation_name,
                &envelope.argument_types,
            )
            .ok_or_else(|| Error::NoSuchOperation {
                service: envelope.service_name.clone(),
                operation: envelope.operation_name.clone(),
                arg_types: envelope.argument_types.clone(),
            })?;

        let ctx = CallContext {
            source_node: envelope.source_node.clone(),
            arguments: envelope.arguments.clone(),
        };
        handler(ctx).await.map_err(|e| Error::Invocation {
            service: envelope.service_name.clone(),
            operation: envelope.operation_name.clone(),
            message: e.to_string(),
            source: Some(e.into()),
        })
    }
}
