use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::dashboard::{run_dashboard, DashboardState};
use crate::grpc::GrpcServer;
use crate::query::JobRegistry;

/// Main node that owns the job registry and runs the serving components
pub struct Node {
    pub config: ServerConfig,
    pub registry: Arc<JobRegistry>,
}

impl Node {
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(JobRegistry::with_capacity(
            config.policy.max_jobs,
            config.policy.expiry_factor,
        ));
        Self { config, registry }
    }

    /// Run the node until `shutdown` is cancelled.
    ///
    /// 1. Optionally spawns the web dashboard server
    /// 2. Runs the gRPC server (blocking)
    /// 3. Interrupts in-flight executors and waits for them to exit
    ///
    /// # Errors
    ///
    /// Returns an error if the gRPC server fails to start or encounters a fatal error.
    /// The dashboard runs as a spawned task and logs its own errors.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_dashboard(&shutdown);

        let registry = self.registry.clone();
        let result = GrpcServer::new(self.config, self.registry)
            .run(shutdown)
            .await;

        registry.shutdown().await;
        tracing::info!("Node stopped");
        result?;
        Ok(())
    }

    /// Like [`Node::run`], serving gRPC on an already bound listener.
    pub async fn run_with_listener(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_dashboard(&shutdown);

        let registry = self.registry.clone();
        let result = GrpcServer::new(self.config, self.registry)
            .run_with_listener(listener, shutdown)
            .await;

        registry.shutdown().await;
        result?;
        Ok(())
    }

    fn spawn_dashboard(&self, shutdown: &CancellationToken) {
        let Some(dashboard_addr) = self.config.dashboard_addr else {
            return;
        };
        let state = DashboardState {
            registry: self.registry.clone(),
            catalog: self.config.catalog.clone(),
        };
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            run_dashboard(dashboard_addr, state, shutdown).await;
        });
    }
}
