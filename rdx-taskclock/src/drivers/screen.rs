//! Lights the display and gets the host app in front of the lock screen.

use super::Reporter;
use crate::error::DriverError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Default time a wake handle keeps the display lit.
pub const DEFAULT_WAKE_HOLD: Duration = Duration::from_secs(10);

/// Platform operations the screen waker is built from.
#[async_trait]
pub trait WakeHost: Send + Sync {
    /// Moves the host application to the foreground.
    async fn bring_to_foreground(&self) -> Result<(), DriverError>;

    /// Acquires a display-waking handle that releases itself after `hold`.
    async fn acquire_wake(&self, hold: Duration) -> Result<Box<dyn WakeHandle>, DriverError>;

    /// Marks the foreground surface as shown over the lock screen and asks the
    /// platform to dismiss the keyguard if it can do so without credentials.
    async fn unlock(&self) -> Result<(), DriverError>;
}

/// An exclusive, time-bounded handle forcing the display on.
#[async_trait]
pub trait WakeHandle: Send + Sync {
    fn is_held(&self) -> bool;
    async fn release(&mut self) -> Result<(), DriverError>;
}

/// Outcome of each independent wake step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeReport {
    pub foreground: Result<(), DriverError>,
    pub wake_lock: Result<(), DriverError>,
    pub unlock: Result<(), DriverError>,
}

impl WakeReport {
    /// The wake step decides the overall result; the other two are advisory.
    pub fn outcome(&self) -> Result<(), DriverError> {
        self.wake_lock.clone()
    }
}

/// Screen waker driver.
///
/// Holds at most one wake handle at a time. A handle still held from a
/// previous call is released before a new one is acquired.
pub struct ScreenWaker {
    host: Box<dyn WakeHost>,
    reporter: Reporter,
    hold: Duration,
    current: Mutex<Option<Box<dyn WakeHandle>>>,
}

impl ScreenWaker {
    pub fn new(host: Box<dyn WakeHost>, reporter: Reporter, hold: Duration) -> Self {
        Self {
            host,
            reporter,
            hold,
            current: Mutex::new(None),
        }
    }

    /// Runs the three wake steps in order. Each is attempted and logged
    /// regardless of how the others went.
    pub async fn wake(&self) -> WakeReport {
        let foreground = self.host.bring_to_foreground().await;
        match &foreground {
            Ok(()) => self.reporter.success("host app brought to foreground").await,
            Err(e) => self.reporter.error(format!("bring to foreground failed: {e}")).await,
        }

        let wake_lock = self.acquire().await;
        match &wake_lock {
            Ok(()) => {
                self.reporter
                    .success(format!("wake lock acquired for {}s", self.hold.as_secs()))
                    .await;
                self.reporter.toast("Wake command sent");
            }
            Err(e) => {
                self.reporter.error(format!("wake lock failed: {e}")).await;
                self.reporter.toast(&format!("Wake failed: {e}"));
            }
        }

        let unlock = self.host.unlock().await;
        match &unlock {
            Ok(()) => self.reporter.success("lock screen dismissal requested").await,
            Err(e) => self.reporter.warning(format!("lock screen dismissal failed: {e}")).await,
        }

        WakeReport {
            foreground,
            wake_lock,
            unlock,
        }
    }

    /// Whether a wake handle is currently held.
    pub async fn is_holding(&self) -> bool {
        self.current
            .lock()
            .await
            .as_ref()
            .map(|handle| handle.is_held())
            .unwrap_or(false)
    }

    async fn acquire(&self) -> Result<(), DriverError> {
        let mut current = self.current.lock().await;
        if let Some(mut stale) = current.take() {
            if stale.is_held() {
                debug!("Releasing previously held wake handle");
                if let Err(e) = stale.release().await {
                    // Never hold two handles at once.
                    warn!("Failed to release stale wake handle: {}", e);
                    *current = Some(stale);
                    return Err(e);
                }
            }
        }
        let handle = self.host.acquire_wake(self.hold).await?;
        *current = Some(handle);
        Ok(())
    }
}
