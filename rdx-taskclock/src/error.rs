//! Error taxonomies for the driver layer, the scheduler and the log store.

use std::io;

/// Failure of a device action driver.
///
/// Drivers convert every failure into one of these variants at their boundary,
/// log it, and hand it back to the orchestrator for step bookkeeping. None of
/// them is ever allowed to escape into the scheduler loop as a panic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    /// A required OS grant is missing (background execution, gesture engine,
    /// lock-screen dismissal).
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The capability exists but is not usable right now (engine detached,
    /// shell channel missing, display size unknown).
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// The package or profile addressed by the call does not exist.
    #[error("target not found: {0}")]
    TargetNotFound(String),

    /// Reading or writing through the host failed in a way that may succeed
    /// on retry.
    #[error("transient I/O failure: {0}")]
    TransientIo(String),
}

impl From<io::Error> for DriverError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => DriverError::ResourceUnavailable(err.to_string()),
            io::ErrorKind::PermissionDenied => DriverError::PermissionDenied(err.to_string()),
            _ => DriverError::TransientIo(err.to_string()),
        }
    }
}

/// Failure of the background scheduler's control surface.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The host refused the foreground-execution grant. The scheduler stays
    /// stopped and may be started again later.
    #[error("foreground execution not granted: {0}")]
    PermissionDenied(#[source] DriverError),
}

/// Failure of a log store backend. Never surfaced by `LogStore::append`.
#[derive(Debug, thiserror::Error)]
pub enum LogStoreError {
    #[error("log storage I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("persisted log is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}
