use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::dataset::ResultTicket;
use crate::query::catalog::QueryClass;

/// Expiry bound used when the configured window overflows the clock.
const MAX_EXPIRY_WINDOW: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Opaque, process-unique identifier for a submitted query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobHandle(u64);

impl JobHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

impl FromStr for JobHandle {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("job-")
            .and_then(|id| id.parse().ok())
            .map(JobHandle)
            .ok_or(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Running,
    Completed,
    Expired,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Expired => write!(f, "expired"),
        }
    }
}

/// Mutable part of a job. The result lives inside `Completed`, so a
/// completed job without a ticket cannot be represented.
#[derive(Debug, Clone)]
enum JobState {
    Running { progress: f64 },
    Completed { ticket: ResultTicket },
    Expired { progress: f64 },
}

/// Consistent read of a job's mutable state.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub status: JobStatus,
    pub progress: f64,
    pub ticket: Option<ResultTicket>,
}

/// One tracked asynchronous query.
#[derive(Debug)]
pub struct Job {
    pub handle: JobHandle,
    pub query: QueryClass,
    pub submitted_at: Instant,
    pub expires_at: Instant,
    pub created_at: DateTime<Utc>,
    pub expires_at_utc: DateTime<Utc>,
    state: RwLock<JobState>,
    cancel: CancellationToken,
}

impl Job {
    /// Create a running job that expires after `expiry_factor` declared durations.
    pub fn new(
        handle: JobHandle,
        query: QueryClass,
        expiry_factor: u32,
        cancel: CancellationToken,
    ) -> Self {
        let submitted_at = Instant::now();
        let created_at = Utc::now();
        let window = query.duration.saturating_mul(expiry_factor);

        Self {
            handle,
            submitted_at,
            expires_at: submitted_at
                .checked_add(window)
                .unwrap_or_else(|| submitted_at + MAX_EXPIRY_WINDOW),
            created_at,
            expires_at_utc: chrono::Duration::from_std(window)
                .ok()
                .and_then(|w| created_at.checked_add_signed(w))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            query,
            state: RwLock::new(JobState::Running { progress: 0.0 }),
            cancel,
        }
    }

    pub fn declared_duration(&self) -> Duration {
        self.query.duration
    }

    /// True once `now` is strictly past the expiry bound.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now > self.expires_at
    }

    /// Token cancelled when the job is expired, removed, or the server shuts down.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub async fn snapshot(&self) -> JobSnapshot {
        match &*self.state.read().await {
            JobState::Running { progress } => JobSnapshot {
                status: JobStatus::Running,
                progress: *progress,
                ticket: None,
            },
            JobState::Completed { ticket } => JobSnapshot {
                status: JobStatus::Completed,
                progress: 1.0,
                ticket: Some(ticket.clone()),
            },
            JobState::Expired { progress } => JobSnapshot {
                status: JobStatus::Expired,
                progress: *progress,
                ticket: None,
            },
        }
    }

    pub async fn status(&self) -> JobStatus {
        self.snapshot().await.status
    }

    /// Raise stored progress. Lower values and non-running jobs are ignored.
    pub async fn record_progress(&self, progress: f64) -> bool {
        let mut state = self.state.write().await;
        match &mut *state {
            JobState::Running { progress: current } if progress > *current => {
                *current = progress.min(1.0);
                true
            }
            _ => false,
        }
    }

    /// Transition `Running -> Completed`, publishing the ticket in the same write.
    pub async fn complete(&self, ticket: ResultTicket) -> bool {
        let mut state = self.state.write().await;
        match &*state {
            JobState::Running { .. } => {
                *state = JobState::Completed { ticket };
                true
            }
            _ => false,
        }
    }

    /// Transition `Running -> Expired` and stop the executor.
    pub async fn expire(&self) -> bool {
        let transitioned = {
            let mut state = self.state.write().await;
            match &*state {
                JobState::Running { progress } => {
                    *state = JobState::Expired {
                        progress: *progress,
                    };
                    true
                }
                _ => false,
            }
        };
        self.cancel.cancel();
        transitioned
    }
}
