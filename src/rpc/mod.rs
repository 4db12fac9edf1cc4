//! Node-to-node calls
//!
//! - `registry`: operations this node serves
//! - `router`: local-vs-remote dispatch for every call, probes included
//! - `proxy`: per-node outbound handles and the transport seam
//! - `http_client`, `loopback`: transports

pub mod envelope;
pub mod http_client;
pub mod loopback;
pub mod proxy;
pub mod registry;
pub mod router;

pub use envelope::{Arguments, CallEnvelope, CallReply, FaultKind, RemoteFault};
pub use http_client::HttpTransport;
pub use loopback::LoopbackTransport;
pub use proxy::{RemoteProxy, RemoteProxyCache, Transport};
pub use registry::{
    CallContext, ServiceRegistry, ServiceRegistryBuilder, NODE_HEALTH_SERVICE, NODE_ID_TYPE,
    PING_OPERATION,
};
pub use router::CallRouter;
