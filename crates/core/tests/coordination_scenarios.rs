//! Coordinator scenarios wired to the real job table.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dlsync_core::{
    testing::{fixtures, MemoryStorage},
    AggregatorConfig, JobStatus, JobStore, JobUpdate, PersistenceConfig, PersistenceScheduler,
    RetryConfig, RetryCoordinator, RetryError, StateSink, UpdateAggregator,
};

#[tokio::test(start_paused = true)]
async fn test_progress_burst_lands_as_one_commit() {
    let store = Arc::new(JobStore::new());
    let job = fixtures::job("https://example.com/abc");
    let id = job.id.clone();
    store.insert(job);
    let revision = store.revision();

    let aggregator = UpdateAggregator::new(
        AggregatorConfig::default(),
        Arc::clone(&store) as Arc<dyn StateSink>,
    );
    for pct in [30.0, 45.0, 60.0] {
        aggregator.queue_update(JobUpdate::new(&id).progress(pct));
        tokio::time::sleep(Duration::from_millis(15)).await;
    }
    assert_eq!(store.get(&id).unwrap().progress, 0.0);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(store.get(&id).unwrap().progress, 60.0);
    assert_eq!(store.revision(), revision + 1);
}

#[tokio::test(start_paused = true)]
async fn test_status_change_is_visible_before_debounce() {
    let store = Arc::new(JobStore::new());
    let job = fixtures::job("https://example.com/abc");
    let id = job.id.clone();
    store.insert(job);

    let aggregator = UpdateAggregator::new(
        AggregatorConfig::default(),
        Arc::clone(&store) as Arc<dyn StateSink>,
    );
    aggregator.queue_update(JobUpdate::new(&id).progress(100.0));
    aggregator.queue_update(JobUpdate::new(&id).status(JobStatus::Completed));

    let job = store.get(&id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100.0);
    assert_eq!(aggregator.pending_jobs(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_four_failures_then_circuit_open() {
    let coordinator = RetryCoordinator::new(RetryConfig::default());
    let calls = Arc::new(AtomicU32::new(0));

    let op = {
        let calls = Arc::clone(&calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>("engine unreachable") }
        }
    };

    let first = coordinator.execute("K", op.clone()).await.unwrap_err();
    assert!(matches!(first, RetryError::Exhausted { attempts: 4, .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 4);

    tokio::time::sleep(Duration::from_secs(30)).await;
    let second = coordinator.execute("K", op).await.unwrap_err();
    assert!(second.is_circuit_open());
    assert_eq!(second.to_string(), "circuit open for K: try again in 30s");
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn test_burst_of_mutations_written_once_per_interval() {
    let store = Arc::new(JobStore::new());
    let storage = Arc::new(MemoryStorage::new());
    let scheduler = PersistenceScheduler::new(
        PersistenceConfig::default(),
        "download-store",
        Arc::clone(&store),
        storage.clone(),
    );
    let watcher = scheduler.spawn_watcher();

    let job = fixtures::job("https://example.com/abc");
    let id = job.id.clone();
    store.insert(job);
    for pct in 1..=20 {
        store
            .apply_update(JobUpdate::new(&id).progress(f64::from(pct)))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    // 4s of mutations: one write at the 5s mark.
    assert_eq!(storage.writes(), 0);
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(storage.writes(), 1);
    assert!(!scheduler.is_dirty());

    watcher.abort();
}
