use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::config::QueryPolicy;
use crate::dataset::ResultTicket;
use crate::error::{FlightPollError, Result};
use crate::metrics;
use crate::query::catalog::QueryCatalog;
use crate::query::job::{JobHandle, JobStatus};
use crate::query::progress;
use crate::query::registry::JobRegistry;
use crate::worker::QueryExecutor;

/// The two shapes of a poll call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollRequest {
    /// Start a new job for a named query class.
    Submit(String),
    /// Advance a job from a handle issued by an earlier response.
    Continue(JobHandle),
}

/// What a poll call reports back.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Still running; poll again with `handle`.
    Running {
        handle: JobHandle,
        query: String,
        progress: f64,
        expires_at: DateTime<Utc>,
    },
    /// Finished; the job has been removed and `ticket` redeems the result.
    Completed {
        query: String,
        ticket: ResultTicket,
        rows: usize,
    },
}

impl PollOutcome {
    pub fn handle(&self) -> Option<JobHandle> {
        match self {
            PollOutcome::Running { handle, .. } => Some(*handle),
            PollOutcome::Completed { .. } => None,
        }
    }

    pub fn progress(&self) -> f64 {
        match self {
            PollOutcome::Running { progress, .. } => *progress,
            PollOutcome::Completed { .. } => 1.0,
        }
    }
}

/// Starts jobs and translates their state into poll responses.
///
/// Terminal states are delivered at most once: the caller that observes
/// `Completed` or expiry also removes the job, and later polls of the same
/// handle are `HandleNotFound`.
#[derive(Debug, Clone)]
pub struct PollHandler {
    registry: Arc<JobRegistry>,
    catalog: QueryCatalog,
    executor: QueryExecutor,
    policy: QueryPolicy,
}

impl PollHandler {
    pub fn new(registry: Arc<JobRegistry>, catalog: QueryCatalog, policy: QueryPolicy) -> Self {
        Self {
            registry,
            catalog,
            executor: QueryExecutor::new(policy.clone()),
            policy,
        }
    }

    pub async fn poll(&self, request: PollRequest) -> Result<PollOutcome> {
        let result = match &request {
            PollRequest::Submit(name) => self.submit(name).await,
            PollRequest::Continue(handle) => self.advance(handle).await,
        };
        metrics::record_poll(match &result {
            Ok(PollOutcome::Running { .. }) => "running",
            Ok(PollOutcome::Completed { .. }) => "completed",
            Err(FlightPollError::Expired(_)) => "expired",
            Err(_) => "error",
        });
        result
    }

    /// Validate the query class, register a job and start its executor.
    pub async fn submit(&self, name: &str) -> Result<PollOutcome> {
        let class = self.catalog.lookup(name)?.clone();

        self.reap_expired().await;

        let job = self.registry.create(class)?;
        let executor = self.executor.clone();
        let running = job.clone();
        self.registry.spawn(async move {
            executor.run(running).await;
        });

        tracing::info!(
            handle = %job.handle,
            query = %job.query.name,
            expires_at = %job.expires_at_utc,
            "Query submitted"
        );
        metrics::record_submitted(&job.query.name);
        metrics::set_in_flight(self.registry.len());

        Ok(PollOutcome::Running {
            handle: job.handle,
            query: job.query.name.clone(),
            progress: 0.0,
            expires_at: job.expires_at_utc,
        })
    }

    /// Report on a previously submitted job.
    pub async fn advance(&self, handle: &JobHandle) -> Result<PollOutcome> {
        let job = self.registry.get(handle)?;
        let now = Instant::now();

        if job.is_expired_at(now) {
            if self.registry.remove(handle).is_some() {
                job.expire().await;
                tracing::warn!(handle = %handle, query = %job.query.name, "Query expired");
                metrics::record_expired(&job.query.name);
                metrics::set_in_flight(self.registry.len());
            }
            return Err(FlightPollError::Expired(handle.to_string()));
        }

        let snapshot = job.snapshot().await;
        match snapshot.status {
            JobStatus::Running => {
                // Completion is only ever signalled by status, so a running job
                // whose estimate has reached 1.0 is still reported below it.
                let estimate = progress::estimate(job.submitted_at, job.declared_duration(), now);
                let progress = estimate
                    .progress
                    .max(snapshot.progress)
                    .min(self.policy.running_progress_ceiling);

                Ok(PollOutcome::Running {
                    handle: job.handle,
                    query: job.query.name.clone(),
                    progress,
                    expires_at: job.expires_at_utc,
                })
            }
            JobStatus::Completed => {
                if self.registry.remove(handle).is_none() {
                    // Another caller took delivery first
                    return Err(FlightPollError::HandleNotFound(handle.to_string()));
                }
                metrics::set_in_flight(self.registry.len());

                let ticket = snapshot.ticket.ok_or_else(|| {
                    FlightPollError::Internal(format!("{handle} completed without a result"))
                })?;
                tracing::info!(handle = %handle, query = %job.query.name, "Query result delivered");

                Ok(PollOutcome::Completed {
                    query: job.query.name.clone(),
                    rows: job.query.rows,
                    ticket,
                })
            }
            JobStatus::Expired => {
                self.registry.remove(handle);
                Err(FlightPollError::Expired(handle.to_string()))
            }
        }
    }

    /// Drop jobs nobody came back for. Runs on each submission.
    async fn reap_expired(&self) {
        let reaped = self.registry.reap_expired(Instant::now());
        for job in &reaped {
            job.expire().await;
            tracing::info!(handle = %job.handle, query = %job.query.name, "Reaped abandoned query");
            metrics::record_expired(&job.query.name);
        }
    }
}
