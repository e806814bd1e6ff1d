//! Device action drivers.
//!
//! Each driver wraps one physical capability behind a small trait seam so the
//! same driver logic can run against a real device (through
//! [`shell::ShellDevice`]) or against fakes in tests:
//!
//! - [`screen::ScreenWaker`] lights the display and gets past the lock screen.
//! - [`gesture::GestureSimulator`] synthesizes swipes and taps, preferring an
//!   attached gesture engine and falling back to shell input injection.
//! - [`launcher::AppLauncher`] enumerates and starts apps across user profiles.
//!
//! Drivers never panic on device failure. They log the failure to the
//! `LogStore`, raise a notification, and return a [`DriverError`] to the
//! caller for bookkeeping.
//!
//! [`DriverError`]: crate::error::DriverError

pub mod gesture;
pub mod launcher;
pub mod screen;
pub mod shell;

use crate::logstore::LogStore;
use crate::notify::Notifier;
use std::sync::Arc;

/// The two side channels every driver reports through.
#[derive(Clone)]
pub struct Reporter {
    log: Arc<LogStore>,
    notifier: Arc<dyn Notifier>,
    title: &'static str,
}

impl Reporter {
    pub fn new(log: Arc<LogStore>, notifier: Arc<dyn Notifier>, title: &'static str) -> Self {
        Self {
            log,
            notifier,
            title,
        }
    }

    pub fn log(&self) -> &Arc<LogStore> {
        &self.log
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.log.info(message, Some(self.title)).await;
    }

    pub async fn success(&self, message: impl Into<String>) {
        self.log.success(message, Some(self.title)).await;
    }

    pub async fn warning(&self, message: impl Into<String>) {
        self.log.warning(message, Some(self.title)).await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.log.error(message, Some(self.title)).await;
    }

    pub fn toast(&self, message: &str) {
        self.notifier.notify(message);
    }
}
