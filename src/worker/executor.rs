use std::sync::Arc;

use tokio::time::Instant;

use crate::config::QueryPolicy;
use crate::dataset;
use crate::error::FlightPollError;
use crate::metrics;
use crate::query::progress;
use crate::query::Job;

/// How an executor run ended.
#[derive(Debug)]
pub enum ExecutionOutcome {
    /// The result was published and the job is `Completed`.
    Completed,
    /// The job's token was cancelled first; the job is left as it was.
    Interrupted,
    /// The job reached a terminal state (expiry) before the result was ready.
    Superseded,
    /// Materializing the result failed; the job stays `Running` until it expires.
    Failed(FlightPollError),
}

/// Drives a job from submission to completion.
///
/// Progress is written at a bounded number of checkpoints spread over the
/// declared duration rather than continuously.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    policy: QueryPolicy,
}

impl QueryExecutor {
    pub fn new(policy: QueryPolicy) -> Self {
        Self { policy }
    }

    pub async fn run(&self, job: Arc<Job>) -> ExecutionOutcome {
        let declared = job.declared_duration();
        let checkpoints = self.policy.checkpoints_for(declared);
        let interval = declared / checkpoints;
        let cancel = job.cancel_token().clone();

        tracing::info!(
            handle = %job.handle,
            query = %job.query.name,
            declared_secs = declared.as_secs_f64(),
            checkpoints,
            "Executing query"
        );

        loop {
            let now = Instant::now();
            if progress::estimate(job.submitted_at, declared, now).is_complete {
                break;
            }

            let remaining = declared.saturating_sub(now.saturating_duration_since(job.submitted_at));
            tokio::select! {
                _ = tokio::time::sleep(interval.min(remaining)) => {}
                _ = cancel.cancelled() => {
                    tracing::warn!(handle = %job.handle, "Query executor interrupted");
                    metrics::record_interrupted(&job.query.name);
                    return ExecutionOutcome::Interrupted;
                }
            }

            let estimate = progress::estimate(job.submitted_at, declared, Instant::now());
            if job.record_progress(estimate.progress).await {
                tracing::debug!(
                    handle = %job.handle,
                    progress = estimate.progress,
                    "Query checkpoint"
                );
            }
        }

        let ticket = match dataset::materialize(&job) {
            Ok(ticket) => ticket,
            Err(e) => {
                tracing::error!(handle = %job.handle, error = %e, "Failed to materialize result");
                return ExecutionOutcome::Failed(e);
            }
        };

        if job.complete(ticket).await {
            let elapsed = job.submitted_at.elapsed().as_secs_f64();
            tracing::info!(handle = %job.handle, elapsed_secs = elapsed, "Query completed");
            metrics::record_completed(&job.query.name, elapsed);
            ExecutionOutcome::Completed
        } else {
            tracing::debug!(handle = %job.handle, "Query reached a terminal state before completion");
            ExecutionOutcome::Superseded
        }
    }
}
