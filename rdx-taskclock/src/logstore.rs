//! The durable, bounded, observable event log.
//!
//! Everything the scheduler and the drivers do ends up here, because most of
//! it happens while nobody is looking at the screen. The log is a single
//! JSON array stored under [`LOG_STORAGE_KEY`] in a key-value backend, newest
//! entry first, never longer than [`MAX_LOGS`].
//!
//! Appends are fail-soft: a storage failure is reported through `tracing` and
//! swallowed, so logging can never be the reason an automation step aborts.

use crate::common::SubscriberId;
use crate::error::LogStoreError;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, error, warn};

/// Upper bound on the number of persisted entries.
pub const MAX_LOGS: usize = 200;

/// Fixed key the log array is stored under.
pub const LOG_STORAGE_KEY: &str = "task_logs";

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Info,
    Success,
    Error,
    Warning,
}

/// One immutable record in the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Process-unique id: creation millis plus a process-wide sequence number.
    pub id: String,
    /// Creation time in epoch milliseconds.
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_title: Option<String>,
}

static ENTRY_SEQ: AtomicU64 = AtomicU64::new(0);

impl LogEntry {
    fn new(message: String, kind: LogKind, task_title: Option<String>) -> Self {
        let timestamp = Utc::now().timestamp_millis();
        let seq = ENTRY_SEQ.fetch_add(1, Ordering::Relaxed);
        Self {
            id: format!("{timestamp}-{seq:06}"),
            timestamp,
            kind,
            message,
            task_title,
        }
    }
}

/// Key-value storage the log array is persisted in.
#[async_trait]
pub trait LogBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, LogStoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), LogStoreError>;
    async fn remove(&self, key: &str) -> Result<(), LogStoreError>;
}

/// Stores each key as `<dir>/<key>.json`.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash mid-write leaves the previous array intact.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl LogBackend for FileBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, LogStoreError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), LogStoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let target = self.path_for(key);
        let staging = self.dir.join(format!(".{key}.json.tmp"));
        tokio::fs::write(&staging, value).await?;
        tokio::fs::rename(&staging, &target).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), LogStoreError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Volatile backend, used by tests and by the shell's `--memory` mode.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LogBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, LogStoreError> {
        Ok(self.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), LogStoreError> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), LogStoreError> {
        self.lock().remove(key);
        Ok(())
    }
}

impl MemoryBackend {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A callback receiving the full, newest-first log after every change.
pub type LogListener = Arc<dyn Fn(&[LogEntry]) + Send + Sync>;

/// The event log service.
///
/// Every append and clear is a read-modify-write of the whole persisted array
/// performed under one async mutex, and subscribers are notified before that
/// mutex is released. Subscribers therefore always observe the same sequence
/// that was just persisted, in the order the writes happened.
pub struct LogStore {
    backend: Arc<dyn LogBackend>,
    capacity: usize,
    write_lock: tokio::sync::Mutex<()>,
    subscribers: Mutex<SlotMap<SubscriberId, LogListener>>,
}

impl LogStore {
    /// Creates a store holding at most [`MAX_LOGS`] entries.
    pub fn new(backend: Arc<dyn LogBackend>) -> Self {
        Self::with_capacity(backend, MAX_LOGS)
    }

    /// Creates a store with a smaller retention bound. Values above
    /// [`MAX_LOGS`] are clamped.
    pub fn with_capacity(backend: Arc<dyn LogBackend>, capacity: usize) -> Self {
        Self {
            backend,
            capacity: capacity.clamp(1, MAX_LOGS),
            write_lock: tokio::sync::Mutex::new(()),
            subscribers: Mutex::new(SlotMap::with_key()),
        }
    }

    /// Convenience constructor for a volatile store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Prepends one entry, evicting the oldest past the retention bound.
    ///
    /// Never fails. A storage failure is reported through `tracing` and the
    /// entry is dropped without notifying subscribers.
    pub async fn append(&self, message: impl Into<String>, kind: LogKind, task_title: Option<&str>) {
        let _guard = self.write_lock.lock().await;
        // Stamped under the lock so persisted order matches timestamp order.
        let entry = LogEntry::new(message.into(), kind, task_title.map(str::to_string));
        debug!(kind = ?entry.kind, title = ?entry.task_title, "{}", entry.message);

        let mut logs = match self.load().await {
            Ok(logs) => logs,
            Err(LogStoreError::Corrupt(e)) => {
                warn!("Persisted log is unreadable, starting a fresh one: {}", e);
                Vec::new()
            }
            Err(e) => {
                error!("Failed to read log before append, entry dropped: {}", e);
                return;
            }
        };
        logs.insert(0, entry);
        logs.truncate(self.capacity);

        if let Err(e) = self.persist(&logs).await {
            error!("Failed to persist log entry: {}", e);
            return;
        }
        self.notify(&logs);
    }

    /// Shorthand for an info-level entry.
    pub async fn info(&self, message: impl Into<String>, task_title: Option<&str>) {
        self.append(message, LogKind::Info, task_title).await;
    }

    /// Shorthand for a success-level entry.
    pub async fn success(&self, message: impl Into<String>, task_title: Option<&str>) {
        self.append(message, LogKind::Success, task_title).await;
    }

    /// Shorthand for a warning-level entry.
    pub async fn warning(&self, message: impl Into<String>, task_title: Option<&str>) {
        self.append(message, LogKind::Warning, task_title).await;
    }

    /// Shorthand for an error-level entry.
    pub async fn error(&self, message: impl Into<String>, task_title: Option<&str>) {
        self.append(message, LogKind::Error, task_title).await;
    }

    /// Returns the persisted entries, newest first.
    ///
    /// An unreadable log is reported and treated as empty.
    pub async fn list(&self) -> Vec<LogEntry> {
        let _guard = self.write_lock.lock().await;
        self.load_or_empty().await
    }

    /// Removes every entry and notifies subscribers with an empty sequence.
    pub async fn clear(&self) {
        let _guard = self.write_lock.lock().await;
        if let Err(e) = self.backend.remove(LOG_STORAGE_KEY).await {
            error!("Failed to clear logs: {}", e);
            return;
        }
        self.notify(&[]);
    }

    /// Registers a listener and immediately hands it the current snapshot.
    ///
    /// Registration and the initial delivery happen under the write lock, so
    /// no append can slip between them.
    pub async fn subscribe(
        self: &Arc<Self>,
        listener: impl Fn(&[LogEntry]) + Send + Sync + 'static,
    ) -> Subscription {
        let listener: LogListener = Arc::new(listener);
        let _guard = self.write_lock.lock().await;
        let id = self.lock_subscribers().insert(listener.clone());
        let snapshot = self.load_or_empty().await;
        deliver(&listener, snapshot.as_slice());
        Subscription {
            id,
            store: Arc::downgrade(self),
        }
    }

    /// Removes a listener. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.lock_subscribers().remove(id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock_subscribers().len()
    }

    async fn load(&self) -> Result<Vec<LogEntry>, LogStoreError> {
        match self.backend.get(LOG_STORAGE_KEY).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    async fn load_or_empty(&self) -> Vec<LogEntry> {
        self.load().await.unwrap_or_else(|e| {
            error!("Failed to read logs: {}", e);
            Vec::new()
        })
    }

    async fn persist(&self, logs: &[LogEntry]) -> Result<(), LogStoreError> {
        let raw = serde_json::to_string(logs)?;
        self.backend.set(LOG_STORAGE_KEY, &raw).await
    }

    fn notify(&self, logs: &[LogEntry]) {
        // Listeners run outside the registry lock so they may unsubscribe.
        let listeners: Vec<LogListener> = self.lock_subscribers().values().cloned().collect();
        for listener in listeners {
            deliver(&listener, logs);
        }
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, SlotMap<SubscriberId, LogListener>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Calls one listener, containing a panic so it cannot unwind into the logger.
fn deliver(listener: &LogListener, logs: &[LogEntry]) {
    if catch_unwind(AssertUnwindSafe(|| listener(logs))).is_err() {
        error!("Log subscriber panicked while handling {} entries", logs.len());
    }
}

/// Handle returned by [`LogStore::subscribe`].
///
/// Dropping it keeps the listener registered; call [`Subscription::unsubscribe`]
/// to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    store: Weak<LogStore>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Removes the listener. Returns `false` if the store is gone or the
    /// listener was already removed.
    pub fn unsubscribe(self) -> bool {
        self.store
            .upgrade()
            .map(|store| store.unsubscribe(self.id))
            .unwrap_or(false)
    }
}
