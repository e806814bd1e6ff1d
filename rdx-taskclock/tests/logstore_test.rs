mod common;

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use taskclock::error::LogStoreError;
use taskclock::logstore::{
    FileBackend, LogBackend, LogEntry, LogKind, LogStore, MemoryBackend, LOG_STORAGE_KEY, MAX_LOGS,
};

#[tokio::test]
async fn keeps_newest_two_hundred_entries_newest_first() {
    let log = LogStore::in_memory();
    for i in 0..MAX_LOGS + 5 {
        log.info(format!("entry {i}"), None).await;
    }

    let logs = log.list().await;
    assert_eq!(logs.len(), MAX_LOGS);
    assert_eq!(logs[0].message, format!("entry {}", MAX_LOGS + 4));
    assert_eq!(logs[MAX_LOGS - 1].message, "entry 5");
    assert!(logs.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
}

#[tokio::test]
async fn entry_ids_are_unique() {
    let log = LogStore::in_memory();
    for _ in 0..50 {
        log.success("same millisecond", Some("burst")).await;
    }
    let mut ids: Vec<String> = log.list().await.into_iter().map(|e| e.id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 50);
}

#[tokio::test]
async fn late_subscriber_gets_current_snapshot_then_updates() {
    let log = Arc::new(LogStore::in_memory());
    log.info("before", Some("t")).await;

    let seen: Arc<Mutex<Vec<Vec<String>>>> = Arc::default();
    let sink = seen.clone();
    let subscription = log
        .subscribe(move |logs| {
            let messages = logs.iter().map(|e| e.message.clone()).collect();
            sink.lock().expect("sink").push(messages);
        })
        .await;

    log.warning("after", Some("t")).await;
    log.clear().await;

    let seen = seen.lock().expect("sink").clone();
    assert_eq!(
        seen,
        vec![
            vec!["before".to_string()],
            vec!["after".to_string(), "before".to_string()],
            Vec::<String>::new(),
        ]
    );
    assert!(subscription.unsubscribe());
    assert_eq!(log.subscriber_count(), 0);
}

#[tokio::test]
async fn unsubscribed_listener_is_not_called() {
    let log = Arc::new(LogStore::in_memory());
    let calls = Arc::new(Mutex::new(0usize));
    let counter = calls.clone();
    let subscription = log
        .subscribe(move |_| *counter.lock().expect("counter") += 1)
        .await;
    let id = subscription.id();

    assert!(log.unsubscribe(id));
    assert!(!log.unsubscribe(id));
    log.error("nobody listens", None).await;

    // Only the initial snapshot.
    assert_eq!(*calls.lock().expect("counter"), 1);
}

#[tokio::test]
async fn clear_empties_the_persisted_log() {
    let log = LogStore::in_memory();
    log.info("one", None).await;
    log.info("two", None).await;
    log.clear().await;
    assert!(log.list().await.is_empty());
}

#[tokio::test]
async fn file_backend_survives_a_restart() {
    let dir = tempfile::tempdir().expect("tempdir");

    let first = LogStore::new(Arc::new(FileBackend::new(dir.path())));
    first.info("scheduled", Some("8:30 task")).await;
    first.success("wake", Some("8:30 task")).await;
    drop(first);

    let raw = std::fs::read_to_string(dir.path().join(format!("{LOG_STORAGE_KEY}.json")))
        .expect("log file written");
    let persisted: Vec<LogEntry> = serde_json::from_str(&raw).expect("valid JSON array");
    assert_eq!(persisted.len(), 2);
    assert!(raw.contains("\"taskTitle\":\"8:30 task\""));
    assert!(raw.contains("\"type\":\"success\""));

    let second = LogStore::new(Arc::new(FileBackend::new(dir.path())));
    let logs = second.list().await;
    assert_eq!(logs[0].message, "wake");
    assert_eq!(logs[0].kind, LogKind::Success);
    assert_eq!(logs[1].message, "scheduled");
}

#[tokio::test]
async fn corrupt_log_is_replaced_on_next_append() {
    let backend = Arc::new(MemoryBackend::new());
    backend
        .set(LOG_STORAGE_KEY, "{not json")
        .await
        .expect("seed corrupt value");

    let log = LogStore::new(backend);
    log.info("fresh start", None).await;

    let logs = log.list().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].message, "fresh start");
}

/// A backend whose writes can be switched off.
#[derive(Default)]
struct FlakyBackend {
    inner: MemoryBackend,
    failing: AtomicBool,
}

#[async_trait]
impl LogBackend for FlakyBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, LogStoreError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), LogStoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(std::io::Error::other("disk full").into());
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), LogStoreError> {
        self.inner.remove(key).await
    }
}

#[tokio::test]
async fn failed_write_is_swallowed_and_not_broadcast() {
    let backend = Arc::new(FlakyBackend::default());
    let log = Arc::new(LogStore::new(backend.clone()));
    log.info("kept", None).await;

    let notified = Arc::new(Mutex::new(0usize));
    let counter = notified.clone();
    log.subscribe(move |_| *counter.lock().expect("counter") += 1)
        .await;

    backend.failing.store(true, Ordering::SeqCst);
    log.error("lost", None).await;
    backend.failing.store(false, Ordering::SeqCst);

    let logs = log.list().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].message, "kept");
    // Initial snapshot only.
    assert_eq!(*notified.lock().expect("counter"), 1);
}

#[tokio::test]
async fn capacity_is_clamped() {
    let log = LogStore::with_capacity(Arc::new(MemoryBackend::new()), 10_000);
    assert_eq!(log.capacity(), MAX_LOGS);

    let small = LogStore::with_capacity(Arc::new(MemoryBackend::new()), 3);
    for i in 0..5 {
        small.info(format!("{i}"), None).await;
    }
    let messages: Vec<String> = small.list().await.into_iter().map(|e| e.message).collect();
    assert_eq!(messages, vec!["4", "3", "2"]);
}

#[tokio::test]
async fn panicking_subscriber_does_not_break_logging() {
    let log = Arc::new(LogStore::in_memory());
    let _broken = log.subscribe(|_| panic!("listener bug")).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let _healthy = log
        .subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await;

    log.info("first", Some("t")).await;
    log.error("second", Some("t")).await;

    let messages: Vec<String> = log.list().await.into_iter().map(|e| e.message).collect();
    assert_eq!(messages, vec!["second", "first"]);
    // Initial snapshot plus one delivery per append.
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(log.subscriber_count(), 2);
}

fn ids(logs: &[LogEntry]) -> Vec<String> {
    logs.iter().map(|e| e.id.clone()).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_are_serialized() {
    let log = Arc::new(LogStore::in_memory());
    let snapshots: Arc<Mutex<Vec<Vec<LogEntry>>>> = Arc::default();
    let sink = snapshots.clone();
    let _subscription = log
        .subscribe(move |logs| sink.lock().expect("sink").push(logs.to_vec()))
        .await;

    let mut tasks = Vec::new();
    for writer in 0..5 {
        let log = log.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..10 {
                log.info(format!("writer {writer} entry {i}"), Some("race"))
                    .await;
                tokio::task::yield_now().await;
            }
        }));
    }
    for reader in 0..3 {
        let log = log.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..10 {
                let logs = log.list().await;
                assert!(logs.len() <= MAX_LOGS);
                assert!(logs.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
                if reader == 0 {
                    log.clear().await;
                    break;
                }
                tokio::task::yield_now().await;
            }
        }));
    }
    for task in tasks {
        task.await.expect("task");
    }

    let snapshots = snapshots.lock().expect("sink").clone();
    let deliveries = &snapshots[1..];
    // One delivery per append plus one for the clear.
    assert_eq!(deliveries.len(), 51);
    assert_eq!(deliveries.iter().filter(|s| s.is_empty()).count(), 1);

    // Each delivery is the previous list with exactly one entry prepended,
    // or the empty list from the clear.
    for pair in snapshots.windows(2) {
        let (before, after) = (&pair[0], &pair[1]);
        if after.is_empty() {
            continue;
        }
        assert_eq!(ids(&after[1..]), ids(before));
    }

    let appended: HashSet<String> = deliveries
        .iter()
        .filter_map(|s| s.first())
        .map(|e| e.id.clone())
        .collect();
    assert_eq!(appended.len(), 50);

    let persisted = log.list().await;
    assert!(persisted.len() <= MAX_LOGS);
    assert!(persisted.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    let persisted_ids: HashSet<String> = persisted.iter().map(|e| e.id.clone()).collect();
    assert_eq!(persisted_ids.len(), persisted.len());
    assert!(persisted_ids.is_subset(&appended));
    assert_eq!(ids(&persisted), ids(snapshots.last().expect("snapshot")));
}
