use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

use crate::config::ServerConfig;
use crate::grpc::flight_service::PollService;
use crate::proto::flight_poll_service_server::FlightPollServiceServer;
use crate::query::JobRegistry;

pub struct GrpcServer {
    addr: SocketAddr,
    config: ServerConfig,
    registry: Arc<JobRegistry>,
}

impl GrpcServer {
    pub fn new(config: ServerConfig, registry: Arc<JobRegistry>) -> Self {
        Self {
            addr: config.listen_addr,
            config,
            registry,
        }
    }

    fn service(&self, shutdown: &CancellationToken) -> FlightPollServiceServer<PollService> {
        FlightPollServiceServer::new(PollService::new(
            &self.config,
            self.registry.clone(),
            shutdown.child_token(),
        ))
    }

    /// Serve on the configured address until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), tonic::transport::Error> {
        tracing::info!(addr = %self.addr, "Starting gRPC server");

        Server::builder()
            .add_service(self.service(&shutdown))
            .serve_with_shutdown(self.addr, shutdown.cancelled_owned())
            .await
    }

    /// Serve on an already bound listener until `shutdown` is cancelled.
    pub async fn run_with_listener(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), tonic::transport::Error> {
        tracing::info!(addr = ?listener.local_addr().ok(), "Starting gRPC server");

        Server::builder()
            .add_service(self.service(&shutdown))
            .serve_with_incoming_shutdown(
                TcpListenerStream::new(listener),
                shutdown.cancelled_owned(),
            )
            .await
    }
}
