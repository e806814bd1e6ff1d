//! # Taskclock
//!
//! A background scheduler that wakes a phone, gets it past the lock screen and
//! drives it through a short sequence of device actions at fixed times of day.
//!
//! ## Core Concepts
//!
//! - **BackgroundScheduler**: A poll loop that reads the wall clock once per
//!   interval and fires every trigger matching the current `HH:MM`. The loop
//!   never waits on the actions it fires.
//! - **Orchestrator**: Runs an `ActionSequence` step by step against the device
//!   drivers, logging a start and a result entry for every step.
//! - **Drivers**: `ScreenWaker`, `GestureSimulator` and `AppLauncher`, each
//!   behind a small trait seam so a real device or a fake can stand behind it.
//! - **LogStore**: A bounded, newest-first, persisted event log that the
//!   scheduler, the orchestrator and the drivers all write to, and that
//!   observers can subscribe to.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use taskclock::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // 1. Load the configuration, falling back to defaults.
//!     let config = TaskclockConfig::load(None)?;
//!
//!     // 2. Wire the drivers, the orchestrator and the scheduler.
//!     let services = Services::build(&config, Arc::new(TracingNotifier)).await;
//!
//!     // 3. Watch the scheduler before starting it.
//!     let mut events = services.scheduler.subscribe_events();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Scheduler event: {:?}", event);
//!         }
//!     });
//!
//!     // 4. Run until Ctrl+C.
//!     services.scheduler.start().await?;
//!     tokio::signal::ctrl_c().await?;
//!     services.scheduler.stop().await;
//!
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Taskclock";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Declare all the modules in the crate.
pub mod clock;
pub mod common;
pub mod components;
pub mod config;
pub mod drivers;
pub mod error;
pub mod events;
pub mod logstore;
pub mod notify;
pub mod orchestrator;
pub mod scheduler;
pub mod services;

/// A prelude module for easy importing of the most common Taskclock types.
pub mod prelude {
    pub use crate::clock::{SystemClock, TimeOfDay, WallClock};
    pub use crate::common::{SubscriberId, TimerId, TriggerId, UserSerial};
    pub use crate::components::sequence::{Action, ActionSequence, Step};
    pub use crate::components::trigger::{ScheduledTrigger, TimeOfDaySet, TriggerMatcher};
    pub use crate::config::TaskclockConfig;
    pub use crate::drivers::gesture::{EngineSlot, GestureEngine, GestureOutcome, GestureSimulator};
    pub use crate::drivers::launcher::{AppLauncher, InstalledApp};
    pub use crate::drivers::screen::ScreenWaker;
    pub use crate::error::{DriverError, SchedulerError};
    pub use crate::events::SchedulerEvent;
    pub use crate::logstore::{LogEntry, LogKind, LogStore};
    pub use crate::notify::{ChannelNotifier, Notifier, TracingNotifier};
    pub use crate::orchestrator::{Devices, Orchestrator, RunReport};
    pub use crate::scheduler::{BackgroundScheduler, SchedulerState};
    pub use crate::services::Services;
}
