use std::collections::HashSet;
use std::time::Duration;

use flight_poll::error::FlightPollError;
use flight_poll::query::{JobHandle, JobRegistry, JobStatus, QueryClass};

fn short() -> QueryClass {
    QueryClass::new("short", Duration::from_secs(60), 1_000)
}

#[tokio::test]
async fn test_handles_are_unique() {
    let registry = JobRegistry::new();

    let handles: HashSet<JobHandle> = (0..100)
        .map(|_| registry.create(short()).unwrap().handle)
        .collect();

    assert_eq!(handles.len(), 100);
    assert_eq!(registry.len(), 100);
}

#[tokio::test]
async fn test_handles_are_not_reused_after_removal() {
    let registry = JobRegistry::new();
    let first = registry.create(short()).unwrap().handle;
    registry.remove(&first);

    let second = registry.create(short()).unwrap().handle;

    assert_ne!(first, second);
    assert!(matches!(
        registry.get(&first),
        Err(FlightPollError::HandleNotFound(_))
    ));
}

#[tokio::test]
async fn test_new_job_is_running_with_expiry() {
    let registry = JobRegistry::with_capacity(10, 3);
    let job = registry.create(short()).unwrap();

    assert_eq!(job.status().await, JobStatus::Running);
    assert_eq!(job.expires_at - job.submitted_at, Duration::from_secs(180));
    assert_eq!(
        (job.expires_at_utc - job.created_at).num_seconds(),
        180
    );
}

#[tokio::test]
async fn test_remove_only_succeeds_once() {
    let registry = JobRegistry::new();
    let handle = registry.create(short()).unwrap().handle;

    assert!(registry.remove(&handle).is_some());
    assert!(registry.remove(&handle).is_none());
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_capacity_is_enforced() {
    let registry = JobRegistry::with_capacity(2, 2);
    registry.create(short()).unwrap();
    registry.create(short()).unwrap();

    assert!(registry.is_full());
    assert!(matches!(
        registry.create(short()),
        Err(FlightPollError::RegistryFull(2))
    ));

    let handle = registry.jobs()[0].handle;
    registry.remove(&handle);
    assert!(registry.create(short()).is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_reap_expired_removes_only_expired_jobs() {
    let registry = JobRegistry::new();
    let old = registry.create(short()).unwrap().handle;
    tokio::time::sleep(Duration::from_secs(100)).await;
    let fresh = registry.create(short()).unwrap().handle;
    tokio::time::sleep(Duration::from_secs(30)).await;

    let reaped = registry.reap_expired(tokio::time::Instant::now());

    assert_eq!(reaped.len(), 1);
    assert_eq!(reaped[0].handle, old);
    assert!(registry.get(&fresh).is_ok());
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_jobs_are_ordered_by_submission() {
    let registry = JobRegistry::new();
    let created: Vec<JobHandle> = (0..5)
        .map(|_| registry.create(short()).unwrap().handle)
        .collect();

    let listed: Vec<JobHandle> = registry.jobs().iter().map(|j| j.handle).collect();

    assert_eq!(listed, created);
}

#[tokio::test]
async fn test_shutdown_cancels_job_tokens() {
    let registry = JobRegistry::new();
    let job = registry.create(short()).unwrap();
    assert!(!job.cancel_token().is_cancelled());

    registry.shutdown().await;

    assert!(job.cancel_token().is_cancelled());
    assert_eq!(job.status().await, JobStatus::Running);
}

#[tokio::test]
async fn test_concurrent_creates_from_many_tasks() {
    let registry = std::sync::Arc::new(JobRegistry::new());

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            (0..50)
                .map(|_| registry.create(short()).unwrap().handle)
                .collect::<Vec<_>>()
        }));
    }

    let mut all = HashSet::new();
    for task in tasks {
        all.extend(task.await.unwrap());
    }

    assert_eq!(all.len(), 400);
    assert_eq!(registry.len(), 400);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_never_exceed_capacity() {
    let registry = std::sync::Arc::new(JobRegistry::with_capacity(50, 2));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            (0..20)
                .filter(|_| registry.create(short()).is_ok())
                .count()
        }));
    }

    let mut created = 0;
    for task in tasks {
        created += task.await.unwrap();
    }

    assert_eq!(created, 50);
    assert_eq!(registry.len(), 50);
    assert!(registry.is_full());

    // Removal frees exactly one slot
    let handle = registry.jobs()[0].handle;
    registry.remove(&handle);
    assert!(registry.create(short()).is_ok());
    assert!(registry.create(short()).is_err());
}
