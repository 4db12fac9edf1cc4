//! Node server

use crate::cluster::{ClusterState, MembershipRefresher, NodeDirectory, StaticNodeDirectory};
use crate::common::{Config, Result};
use crate::node::http::{create_router, NodeState};
use crate::rpc::{CallRouter, HttpTransport, ServiceRegistryBuilder, Transport};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Components of a running node, wired together.
pub struct NodeParts {
    pub directory: Arc<dyn NodeDirectory>,
    pub router: Arc<CallRouter>,
    pub refresher: Arc<MembershipRefresher>,
}

impl NodeParts {
    /// Wire a node from its collaborators.
    pub fn assemble(
        config: &Config,
        directory: Arc<dyn NodeDirectory>,
        services: ServiceRegistryBuilder,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let registry = Arc::new(services.build());
        let router = Arc::new(CallRouter::new(
            directory.clone(),
            registry,
            transport,
            &config.cluster,
        ));
        let refresher = Arc::new(MembershipRefresher::new(
            directory.clone(),
            router.clone(),
            Arc::new(ClusterState::new()),
            config.cluster.quiet_period(),
        ));
        Self {
            directory,
            router,
            refresher,
        }
    }

    pub fn http_state(&self) -> NodeState {
        NodeState {
            directory: self.directory.clone(),
            router: self.router.clone(),
            refresher: self.refresher.clone(),
        }
    }
}

pub struct NodeServer {
    config: Config,
    services: ServiceRegistryBuilder,
}

impl NodeServer {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            services: ServiceRegistryBuilder::new(),
        }
    }

    /// Operations this node serves besides the built-in probe.
    pub fn with_services(mut self, services: ServiceRegistryBuilder) -> Self {
        self.services = services;
        self
    }

    pub async fn serve(self) -> Result<()> {
        self.config.validate()?;
        let cluster = &self.config.cluster;

        tracing::info!("Starting node: {}", self.config.node_id);
        tracing::info!("  HTTP API: {}", self.config.bind_addr);
        tracing::info!("  Configured nodes: {}", self.config.nodes.len());
        tracing::info!("  Refresh interval: {:?}", cluster.refresh_interval());
        tracing::info!("  Quiet period: {:?}", cluster.quiet_period());
        tracing::info!("  Local calls for self: {}", cluster.use_local_call_for_self);

        let directory = Arc::new(StaticNodeDirectory::from_config(&self.config));
        let transport = Arc::new(HttpTransport::new(cluster)?);
        let refresh_interval = cluster.refresh_interval();
        let parts = NodeParts::assemble(&self.config, directory, self.services, transport);

        let refresh_handle = parts.refresher.clone().start(refresh_interval);

        let app = create_router(parts.http_state()).layer(TraceLayer::new_for_http());
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        tracing::info!("✓ Node ready");

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await;
        if let Err(e) = &served {
            tracing::error!("HTTP server error: {}", e);
        }

        parts.refresher.interrupt();
        if let Err(e) = refresh_handle.await {
            tracing::error!("Membership refresher task failed: {}", e);
        }
        tracing::info!("Node {} stopped", self.config.node_id);

        Ok(served?)
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
