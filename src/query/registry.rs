use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::{FlightPollError, Result};
use crate::query::catalog::QueryClass;
use crate::query::job::{Job, JobHandle};

const DEFAULT_MAX_JOBS: usize = 10_000;
const DEFAULT_EXPIRY_FACTOR: u32 = 2;

/// Concurrent store of in-flight jobs keyed by handle.
///
/// Map operations are individually atomic and sharded, so unrelated jobs never
/// contend on a single lock. Each job carries its own state lock.
#[derive(Debug)]
pub struct JobRegistry {
    jobs: DashMap<JobHandle, Arc<Job>>,
    next_id: AtomicU64,
    /// Reserved slots; taken before insert and released on removal.
    occupied: AtomicUsize,
    max_jobs: usize,
    expiry_factor: u32,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_JOBS, DEFAULT_EXPIRY_FACTOR)
    }

    pub fn with_capacity(max_jobs: usize, expiry_factor: u32) -> Self {
        Self {
            jobs: DashMap::new(),
            next_id: AtomicU64::new(1),
            occupied: AtomicUsize::new(0),
            max_jobs,
            expiry_factor,
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// Register a new running job for `query`.
    ///
    /// Handles come from a process-lifetime counter and are never reused.
    /// Capacity is reserved atomically, so concurrent callers never exceed
    /// `max_jobs`.
    pub fn create(&self, query: QueryClass) -> Result<Arc<Job>> {
        self.occupied
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_jobs).then_some(n + 1)
            })
            .map_err(|_| FlightPollError::RegistryFull(self.max_jobs))?;

        let handle = JobHandle::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let job = Arc::new(Job::new(
            handle,
            query,
            self.expiry_factor,
            self.shutdown.child_token(),
        ));
        self.jobs.insert(handle, job.clone());
        Ok(job)
    }

    pub fn get(&self, handle: &JobHandle) -> Result<Arc<Job>> {
        self.jobs
            .get(handle)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| FlightPollError::HandleNotFound(handle.to_string()))
    }

    /// Remove a job. Returns `None` if another caller already removed it.
    pub fn remove(&self, handle: &JobHandle) -> Option<Arc<Job>> {
        let (_, job) = self.jobs.remove(handle)?;
        self.occupied.fetch_sub(1, Ordering::AcqRel);
        Some(job)
    }

    /// Remove every job already past its expiry bound and return them.
    pub fn reap_expired(&self, now: Instant) -> Vec<Arc<Job>> {
        let expired: Vec<JobHandle> = self
            .jobs
            .iter()
            .filter(|entry| entry.value().is_expired_at(now))
            .map(|entry| *entry.key())
            .collect();

        expired
            .into_iter()
            .filter_map(|handle| self.remove(&handle))
            .collect()
    }

    /// All tracked jobs ordered by submission.
    pub fn jobs(&self) -> Vec<Arc<Job>> {
        let mut jobs: Vec<Arc<Job>> = self.jobs.iter().map(|e| e.value().clone()).collect();
        jobs.sort_by_key(|job| job.handle);
        jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.occupied.load(Ordering::Acquire) >= self.max_jobs
    }

    /// Run a job's background task on the registry's tracker.
    pub fn spawn<F>(&self, task: F) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(task)
    }

    /// Cancel every job's executor and wait for them to stop.
    ///
    /// Jobs stay registered in whatever state they were in.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }
}
