//! HTTP transport: JSON call envelopes posted to `{address}/cluster/call`

use crate::cluster::NodeId;
use crate::common::{ClusterConfig, Error, Result, TransportFailure};
use crate::rpc::envelope::{CallEnvelope, CallReply};
use crate::rpc::proxy::{RemoteProxy, Transport};
use async_trait::async_trait;
use std::sync::Arc;

/// Path the node API serves inbound calls on.
pub const CALL_PATH: &str = "/cluster/call";

/// Opens [`HttpProxy`] handles sharing one connection pool.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &ClusterConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .danger_accept_invalid_hostnames(config.ignore_tls_hostname_verification);
        if let Some(timeout) = config.read_timeout() {
            builder = builder.read_timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::InvalidConfig(format!("HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn open(&self, target: &NodeId, address: &str) -> Result<Arc<dyn RemoteProxy>> {
        let base = address.trim_end_matches('/');
        if base.is_empty() {
            return Err(Error::InvalidConfig(format!("node {} has no address", target)));
        }
        Ok(Arc::new(HttpProxy {
            target: target.clone(),
            address: address.to_string(),
            url: format!("{}{}", base, CALL_PATH),
            client: self.client.clone(),
        }))
    }
}

pub struct HttpProxy {
    target: NodeId,
    address: String,
    url: String,
    client: reqwest::Client,
}

impl HttpProxy {
    fn transport_error(&self, e: reqwest::Error) -> Error {
        let kind = if e.is_connect() {
            TransportFailure::Connect
        } else if is_timeout(&e) {
            TransportFailure::Timeout
        } else {
            TransportFailure::Protocol
        };
        Error::Transport {
            node: self.target.clone(),
            kind,
            message: e.to_string(),
        }
    }
}

/// Read timeouts can surface as an I/O error deep in the source chain.
fn is_timeout(e: &reqwest::Error) -> bool {
    if e.is_timeout() {
        return true;
    }
    let mut source = std::error::Error::source(e);
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::TimedOut {
                return true;
            }
        }
        source = err.source();
    }
    false
}

#[async_trait]
impl RemoteProxy for HttpProxy {
    fn target(&self) -> &NodeId {
        &self.target
    }

    fn address(&self) -> &str {
        &self.address
    }

    async fn invoke(&self, envelope: &CallEnvelope) -> Result<CallReply> {
        let response = self
            .client
            .post(&self.url)
            .json(envelope)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;

        // Failed calls come back with an error status and a reply body.
        serde_json::from_slice::<CallReply>(&body).map_err(|e| Error::Transport {
            node: self.target.clone(),
            kind: TransportFailure::Protocol,
            message: format!("unexpected reply (HTTP {}): {}", status, e),
        })
    }
}
