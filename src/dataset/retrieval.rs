use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::DatasetConfig;
use crate::dataset::{Batch, DatasetPlan, ResultTicket};
use crate::error::{FlightPollError, Result};
use crate::query::QueryCatalog;

/// Serves tickets as ordered batches over a channel.
///
/// The receiving side of the channel belongs to the caller. Dropping it is
/// treated as peer cancellation, the same as cancelling `cancel`.
#[derive(Debug, Clone)]
pub struct RetrievalHandler {
    config: DatasetConfig,
    catalog: QueryCatalog,
}

impl RetrievalHandler {
    pub fn new(config: DatasetConfig, catalog: QueryCatalog) -> Self {
        Self { config, catalog }
    }

    /// Check that a query ticket names a known class with that class's row
    /// count. Anything else was not issued by this server.
    pub fn validate(&self, ticket: &ResultTicket) -> Result<()> {
        let ResultTicket::Query { query, job, rows } = ticket else {
            return Ok(());
        };
        match self.catalog.lookup(query) {
            Ok(class) if class.rows == *rows => Ok(()),
            _ => Err(FlightPollError::TicketNotFound(format!(
                "{query} (job {job}, {rows} rows)"
            ))),
        }
    }

    pub fn plan(&self, ticket: &ResultTicket) -> DatasetPlan {
        DatasetPlan::for_ticket(ticket, &self.config)
    }

    /// Emit the ticket's dataset. Returns the number of rows sent.
    ///
    /// A requested delay runs before the first batch and is abandoned as soon
    /// as cancellation is observed, in which case nothing is sent.
    pub async fn stream(
        &self,
        ticket: &ResultTicket,
        tx: &mpsc::Sender<Result<Batch>>,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        self.validate(ticket)?;
        let plan = self.plan(ticket);

        if let Some(delay) = plan.delay {
            tracing::info!(
                kind = ticket.kind(),
                delay_secs = delay.as_secs_f64(),
                "Delaying first batch"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    return Err(FlightPollError::Cancelled(
                        "retrieval cancelled during delay".to_string(),
                    ));
                }
                _ = tx.closed() => {
                    return Err(FlightPollError::Cancelled(
                        "peer disconnected during delay".to_string(),
                    ));
                }
            }
        }

        let mut sent = 0;
        for batch in plan.batches() {
            if cancel.is_cancelled() || tx.is_closed() {
                return Err(FlightPollError::Cancelled(format!(
                    "retrieval cancelled after {sent} rows"
                )));
            }
            let rows = batch.values.len();
            if tx.send(Ok(batch)).await.is_err() {
                return Err(FlightPollError::Cancelled(format!(
                    "peer disconnected after {sent} rows"
                )));
            }
            sent += rows;
        }

        tracing::debug!(kind = ticket.kind(), rows = sent, "Dataset stream completed");
        Ok(sent)
    }
}
