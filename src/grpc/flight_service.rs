use std::pin::Pin;
use std::sync::Arc;

use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};

use crate::config::ServerConfig;
use crate::dataset::{Batch, ResultTicket, RetrievalHandler, StaticDataset, VALUE_COLUMN};
use crate::error::{FlightPollError, Result};
use crate::metrics;
use crate::proto::flight_poll_service_server::FlightPollService;
use crate::proto::query_descriptor::Kind;
use crate::proto::{
    Action, ActionResult, Endpoint, Field, ListDatasetsRequest, PollInfo, QueryDescriptor,
    RecordBatch, ResultInfo, Schema, Ticket,
};
use crate::query::{JobHandle, JobRegistry, PollHandler, PollOutcome, PollRequest};

/// Bytes per row of the single `int32` column.
const ROW_BYTES: i64 = 4;

/// gRPC service for polling queries and redeeming their results
pub struct PollService {
    poll: PollHandler,
    retrieval: RetrievalHandler,
    location: String,
    /// Cancels in-progress retrievals on server shutdown
    shutdown: CancellationToken,
}

impl PollService {
    pub fn new(
        config: &ServerConfig,
        registry: Arc<JobRegistry>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            poll: PollHandler::new(registry, config.catalog.clone(), config.policy.clone()),
            retrieval: RetrievalHandler::new(
                config.datasets.clone(),
                config.catalog.clone(),
            ),
            location: config.advertised_location.clone(),
            shutdown,
        }
    }

    fn endpoint(&self, ticket: &ResultTicket) -> Result<Endpoint> {
        Ok(Endpoint {
            ticket: Some(Ticket {
                ticket: ticket.encode()?,
            }),
            locations: vec![self.location.clone()],
        })
    }

    fn poll_info(&self, outcome: PollOutcome) -> Result<PollInfo> {
        match outcome {
            PollOutcome::Running {
                handle,
                query,
                progress,
                expires_at,
            } => Ok(PollInfo {
                info: Some(ResultInfo {
                    schema: Some(value_schema()),
                    descriptor: Some(query_descriptor(query)),
                    endpoints: Vec::new(),
                    total_records: -1,
                    total_bytes: -1,
                }),
                descriptor: Some(handle_descriptor(handle)),
                progress: Some(progress),
                expiration_time_ms: Some(expires_at.timestamp_millis()),
            }),
            PollOutcome::Completed {
                query,
                ticket,
                rows,
            } => Ok(PollInfo {
                info: Some(ResultInfo {
                    schema: Some(value_schema()),
                    descriptor: Some(query_descriptor(query)),
                    endpoints: vec![self.endpoint(&ticket)?],
                    total_records: rows as i64,
                    total_bytes: rows as i64 * ROW_BYTES,
                }),
                descriptor: None,
                progress: Some(1.0),
                expiration_time_ms: None,
            }),
        }
    }

    fn dataset_info(&self, dataset: StaticDataset) -> Result<ResultInfo> {
        let ticket = ResultTicket::Dataset { name: dataset };
        let rows = self.retrieval.plan(&ticket).rows as i64;
        Ok(ResultInfo {
            schema: Some(value_schema()),
            descriptor: Some(QueryDescriptor {
                kind: Some(Kind::Dataset(dataset.name().to_string())),
            }),
            endpoints: vec![self.endpoint(&ticket)?],
            total_records: rows,
            total_bytes: -1,
        })
    }
}

type BatchStream =
    Pin<Box<dyn tokio_stream::Stream<Item = std::result::Result<RecordBatch, Status>> + Send>>;
type ResultInfoStream =
    Pin<Box<dyn tokio_stream::Stream<Item = std::result::Result<ResultInfo, Status>> + Send>>;

#[tonic::async_trait]
impl FlightPollService for PollService {
    type DoGetStream = BatchStream;
    type ListDatasetsStream = ResultInfoStream;

    async fn poll_query(
        &self,
        request: Request<QueryDescriptor>,
    ) -> std::result::Result<Response<PollInfo>, Status> {
        let req = match request.into_inner().kind {
            Some(Kind::Query(name)) => PollRequest::Submit(name),
            Some(Kind::PollHandle(handle)) => PollRequest::Continue(
                handle
                    .parse::<JobHandle>()
                    .map_err(|_| FlightPollError::HandleNotFound(handle.clone()))?,
            ),
            Some(Kind::Dataset(name)) => {
                return Err(Status::invalid_argument(format!(
                    "Dataset {name} is not a pollable query; use GetDatasetInfo"
                )));
            }
            None => return Err(Status::invalid_argument("Query descriptor cannot be empty")),
        };

        let outcome = self.poll.poll(req).await?;
        Ok(Response::new(self.poll_info(outcome)?))
    }

    async fn do_get(
        &self,
        request: Request<Ticket>,
    ) -> std::result::Result<Response<Self::DoGetStream>, Status> {
        let decoded = ResultTicket::decode(&request.into_inner().ticket)
            .and_then(|ticket| self.retrieval.validate(&ticket).map(|()| ticket));
        let ticket = match decoded {
            Ok(ticket) => ticket,
            Err(e) => {
                tracing::warn!(error = %e, "Rejected unknown ticket");
                metrics::record_retrieval("unknown", "not_found");
                return Err(e.into());
            }
        };

        let kind = ticket.kind();
        tracing::info!(kind, ticket = ?ticket, "Retrieval started");

        let (tx, rx) = tokio::sync::mpsc::channel(16);
        let retrieval = self.retrieval.clone();
        let cancel = self.shutdown.child_token();

        tokio::spawn(async move {
            match retrieval.stream(&ticket, &tx, &cancel).await {
                Ok(rows) => {
                    tracing::info!(kind, rows, "Retrieval completed");
                    metrics::record_retrieval(kind, "completed");
                }
                Err(e) => {
                    tracing::warn!(kind, error = %e, "Retrieval aborted");
                    metrics::record_retrieval(kind, "cancelled");
                    // Fails silently if the peer is already gone
                    let _ = tx.send(Err(e)).await;
                }
            }
        });

        let stream = ReceiverStream::new(rx)
            .map(|item| item.map(batch_to_proto).map_err(Status::from));
        Ok(Response::new(Box::pin(stream) as Self::DoGetStream))
    }

    async fn get_dataset_info(
        &self,
        request: Request<QueryDescriptor>,
    ) -> std::result::Result<Response<ResultInfo>, Status> {
        let name = match request.into_inner().kind {
            Some(Kind::Dataset(name)) | Some(Kind::Query(name)) => name,
            Some(Kind::PollHandle(_)) => {
                return Err(Status::invalid_argument(
                    "Poll handles are advanced with PollQuery",
                ));
            }
            None => return Err(Status::invalid_argument("Query descriptor cannot be empty")),
        };

        let dataset: StaticDataset = name.parse()?;
        Ok(Response::new(self.dataset_info(dataset)?))
    }

    async fn list_datasets(
        &self,
        _request: Request<ListDatasetsRequest>,
    ) -> std::result::Result<Response<Self::ListDatasetsStream>, Status> {
        let infos = StaticDataset::ALL
            .into_iter()
            .map(|dataset| self.dataset_info(dataset).map_err(Status::from))
            .collect::<Vec<_>>();

        let stream = tokio_stream::iter(infos);
        Ok(Response::new(Box::pin(stream) as Self::ListDatasetsStream))
    }

    async fn do_action(
        &self,
        request: Request<Action>,
    ) -> std::result::Result<Response<ActionResult>, Status> {
        let action = request.into_inner();
        match action.r#type.as_str() {
            "echo" => Ok(Response::new(ActionResult { body: action.body })),
            other => {
                tracing::debug!(action = other, "Unsupported action");
                Err(FlightPollError::Unimplemented(format!("Unknown action: {other}")).into())
            }
        }
    }
}

/// Schema shared by every dataset: one nullable `int32` column.
pub fn value_schema() -> Schema {
    Schema {
        fields: vec![Field {
            name: VALUE_COLUMN.to_string(),
            data_type: "int32".to_string(),
            nullable: true,
        }],
    }
}

fn query_descriptor(query: String) -> QueryDescriptor {
    QueryDescriptor {
        kind: Some(Kind::Query(query)),
    }
}

fn handle_descriptor(handle: JobHandle) -> QueryDescriptor {
    QueryDescriptor {
        kind: Some(Kind::PollHandle(handle.to_string())),
    }
}

fn batch_to_proto(batch: Batch) -> RecordBatch {
    RecordBatch {
        batch_index: batch.index,
        values: batch.values,
    }
}
