pub mod config;
pub mod dashboard;
pub mod dataset;
pub mod error;
pub mod grpc;
pub mod metrics;
pub mod node;
pub mod query;
pub mod shutdown;
pub mod worker;

// Re-export generated protobuf types
pub mod proto {
    tonic::include_proto!("flightpoll");
}
