use thiserror::Error;
use tonic::Status;

#[derive(Error, Debug)]
pub enum FlightPollError {
    #[error("Unknown query: {0}")]
    QueryNotFound(String),

    #[error("Poll handle not found: {0}")]
    HandleNotFound(String),

    #[error("Ticket not found: {0}")]
    TicketNotFound(String),

    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("Query expired: {0}")]
    Expired(String),

    #[error("Request cancelled: {0}")]
    Cancelled(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Query registry is at capacity ({0} jobs)")]
    RegistryFull(usize),

    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<FlightPollError> for Status {
    fn from(err: FlightPollError) -> Self {
        let message = err.to_string();
        match err {
            FlightPollError::QueryNotFound(_)
            | FlightPollError::HandleNotFound(_)
            | FlightPollError::TicketNotFound(_)
            | FlightPollError::DatasetNotFound(_) => Status::not_found(message),
            FlightPollError::Expired(_) | FlightPollError::Cancelled(_) => {
                Status::cancelled(message)
            }
            FlightPollError::InvalidArgument(_) => Status::invalid_argument(message),
            FlightPollError::RegistryFull(_) => Status::resource_exhausted(message),
            FlightPollError::Unimplemented(_) => Status::unimplemented(message),
            FlightPollError::Internal(_) => Status::internal(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, FlightPollError>;
