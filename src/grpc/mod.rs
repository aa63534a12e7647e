//! gRPC surface: the poll/retrieval service and its server.

pub mod flight_service;
pub mod server;

pub use flight_service::PollService;
pub use server::GrpcServer;
