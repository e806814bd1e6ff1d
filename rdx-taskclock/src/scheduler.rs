//! The background scheduler that polls the wall clock and fires triggers.

use crate::clock::{TimeOfDay, WallClock};
use crate::common::{TimerId, TriggerId};
use crate::components::sequence::ActionSequence;
use crate::components::trigger::{ScheduledTrigger, TriggerWatcher};
use crate::error::{DriverError, SchedulerError};
use crate::events::SchedulerEvent;
use crate::logstore::LogStore;
use crate::orchestrator::Orchestrator;
use async_trait::async_trait;
use slotmap::SlotMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Default time between two clock checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Task title for the scheduler's own log entries.
pub const SYSTEM_TITLE: &str = "system";

/// Lifecycle of the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Host permission needed before the loop may run in the background, e.g. a
/// persistent-notification grant for a foreground service.
#[async_trait]
pub trait ForegroundGrant: Send + Sync {
    async fn request(&self) -> Result<(), DriverError>;
}

/// For hosts with no such permission model.
#[derive(Debug, Clone, Default)]
pub struct AlwaysGranted;

#[async_trait]
impl ForegroundGrant for AlwaysGranted {
    async fn request(&self) -> Result<(), DriverError> {
        Ok(())
    }
}

struct RunningLoop {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

/// The background scheduler.
///
/// Owns the `Stopped → Starting → Running → Stopping → Stopped` lifecycle and
/// the single poll loop. Every poll reads the wall clock, and each trigger
/// matching the current minute has its sequence handed to the orchestrator on
/// a task of its own, so a slow sequence never delays the next poll.
///
/// The struct is a cheap handle: clones share the same loop, triggers, and
/// state.
#[derive(Clone)]
pub struct BackgroundScheduler {
    poll_interval: Duration,
    clock: Arc<dyn WallClock>,
    orchestrator: Arc<Orchestrator>,
    log: Arc<LogStore>,
    grant: Arc<dyn ForegroundGrant>,
    state: Arc<watch::Sender<SchedulerState>>,
    running: Arc<Mutex<Option<RunningLoop>>>,
    event_sender: broadcast::Sender<SchedulerEvent>,
    triggers: Arc<RwLock<SlotMap<TriggerId, TriggerWatcher>>>,
    timers: Arc<std::sync::Mutex<SlotMap<TimerId, JoinHandle<()>>>>,
}

// Core implementation block for internal logic.
impl BackgroundScheduler {
    /// Creates a stopped scheduler polling every `poll_interval`.
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        clock: Arc<dyn WallClock>,
        poll_interval: Duration,
    ) -> Self {
        let (event_sender, _) = broadcast::channel(64);
        let (state, _) = watch::channel(SchedulerState::Stopped);
        let log = orchestrator.log().clone();
        let poll_interval = if poll_interval.is_zero() {
            warn!("poll interval was 0, defaulting to {:?}", DEFAULT_POLL_INTERVAL);
            DEFAULT_POLL_INTERVAL
        } else {
            poll_interval
        };

        Self {
            poll_interval,
            clock,
            orchestrator,
            log,
            grant: Arc::new(AlwaysGranted),
            state: Arc::new(state),
            running: Arc::new(Mutex::new(None)),
            event_sender,
            triggers: Arc::new(RwLock::new(SlotMap::with_key())),
            timers: Arc::new(std::sync::Mutex::new(SlotMap::with_key())),
        }
    }

    /// Replaces the foreground-execution precondition.
    pub fn with_grant(mut self, grant: Arc<dyn ForegroundGrant>) -> Self {
        self.grant = grant;
        self
    }

    fn set_state(&self, state: SchedulerState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("Scheduler state {:?} -> {:?}", previous, state);
        }
    }

    async fn poll_loop(self, mut shutdown_rx: broadcast::Receiver<()>) {
        self.log
            .info("background scheduler started", Some(SYSTEM_TITLE))
            .await;
        self.event_sender.send(SchedulerEvent::Started).ok();

        while self.state() == SchedulerState::Running {
            // A panicking tick is contained by its own task.
            match tokio::spawn(self.clone().tick()).await {
                Ok(fired) => trace!("Tick complete, {} trigger(s) fired", fired),
                Err(e) => {
                    error!("Background tick failed: {}", e);
                    self.log
                        .error(format!("background tick failed: {e}"), Some(SYSTEM_TITLE))
                        .await;
                }
            }

            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        self.log
            .info("background scheduler stopped", Some(SYSTEM_TITLE))
            .await;
        self.set_state(SchedulerState::Stopped);
        self.event_sender.send(SchedulerEvent::Stopped).ok();
        info!("Background scheduler has shut down.");
    }

    async fn tick(self) -> usize {
        let now = self.clock.now();
        let minute = TimeOfDay::of(&now);
        trace!("Polling at {}", minute);

        let due: Vec<(TriggerId, ScheduledTrigger)> = {
            let mut triggers = self.triggers.write().await;
            triggers
                .iter_mut()
                .filter_map(|(id, watcher)| {
                    watcher
                        .check_and_mark(&now)
                        .then(|| (id, watcher.trigger.clone()))
                })
                .collect()
        };

        let fired = due.len();
        for (id, trigger) in due {
            info!("Trigger '{}' fired at {}", trigger.title, minute);
            self.log
                .info(format!("trigger {minute} fired"), Some(&trigger.title))
                .await;
            self.event_sender
                .send(SchedulerEvent::TriggerFired {
                    id,
                    title: trigger.title.clone(),
                    minute,
                })
                .ok();

            let orchestrator = self.orchestrator.clone();
            tokio::spawn(async move {
                orchestrator.run(&trigger.title, &trigger.sequence).await;
            });
        }
        fired
    }

    fn lock_timers(&self) -> std::sync::MutexGuard<'_, SlotMap<TimerId, JoinHandle<()>>> {
        self.timers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// Public API implementation block.
impl BackgroundScheduler {
    /// Starts the poll loop.
    ///
    /// A no-op when the loop is already running. Requests the foreground
    /// grant first; a refusal is logged, leaves the scheduler `Stopped`, and
    /// is returned so the caller can ask again later.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!("start() ignored, scheduler is {:?}", self.state());
            return Ok(());
        }

        self.set_state(SchedulerState::Starting);
        if let Err(e) = self.grant.request().await {
            warn!("Foreground execution refused: {}", e);
            self.log
                .error(
                    format!("background scheduler not started: {e}"),
                    Some(SYSTEM_TITLE),
                )
                .await;
            self.set_state(SchedulerState::Stopped);
            return Err(SchedulerError::PermissionDenied(e));
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        self.set_state(SchedulerState::Running);
        let handle = tokio::spawn(self.clone().poll_loop(shutdown_rx));
        info!(
            "Background scheduler running, polling every {:?}.",
            self.poll_interval
        );
        *running = Some(RunningLoop {
            shutdown_tx,
            handle,
        });
        Ok(())
    }

    /// Stops the poll loop and waits for it to exit.
    ///
    /// A no-op when already stopped. Sequences already handed to the
    /// orchestrator keep running and logging on their own.
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        let Some(RunningLoop {
            shutdown_tx,
            handle,
        }) = running.take()
        else {
            return;
        };

        info!("Stopping background scheduler...");
        self.set_state(SchedulerState::Stopping);
        if shutdown_tx.send(()).is_err() {
            error!("Failed to send shutdown signal, the poll loop already exited.");
        }
        if let Err(e) = handle.await {
            error!("Poll loop ended abnormally: {}", e);
        }
        self.set_state(SchedulerState::Stopped);
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == SchedulerState::Running
    }

    /// Watches lifecycle transitions.
    pub fn watch_state(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Registers a trigger. Takes effect on the next poll.
    pub async fn add_trigger(&self, trigger: ScheduledTrigger) -> TriggerId {
        info!(
            "Trigger '{}' registered for {}",
            trigger.title,
            trigger.matcher.describe()
        );
        let id = self
            .triggers
            .write()
            .await
            .insert(TriggerWatcher::new(trigger));
        self.event_sender
            .send(SchedulerEvent::TriggerAdded { id })
            .ok();
        id
    }

    /// Removes a trigger. Returns `true` if it was registered.
    pub async fn remove_trigger(&self, id: TriggerId) -> bool {
        let was_removed = self.triggers.write().await.remove(id).is_some();
        if was_removed {
            self.event_sender
                .send(SchedulerEvent::TriggerRemoved { id })
                .ok();
        }
        was_removed
    }

    /// Currently registered triggers.
    pub async fn triggers(&self) -> Vec<(TriggerId, ScheduledTrigger)> {
        self.triggers
            .read()
            .await
            .iter()
            .map(|(id, watcher)| (id, watcher.trigger.clone()))
            .collect()
    }

    /// Runs `sequence` once after `delay`, whether or not the poll loop is
    /// running.
    pub fn schedule_once(
        &self,
        delay: Duration,
        title: impl Into<String>,
        sequence: ActionSequence,
    ) -> TimerId {
        let title = title.into();
        let scheduler = self.clone();
        let mut timers = self.lock_timers();
        timers.insert_with_key(move |id| {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                scheduler.lock_timers().remove(id);
                info!("One-shot timer '{}' fired", title);
                scheduler
                    .event_sender
                    .send(SchedulerEvent::TimerFired {
                        id,
                        title: title.clone(),
                    })
                    .ok();
                scheduler.log.info("one-shot timer fired", Some(&title)).await;
                scheduler.orchestrator.run(&title, &sequence).await;
            })
        })
    }

    /// Cancels a pending one-shot timer. Returns `false` if it already fired.
    pub fn cancel_once(&self, id: TimerId) -> bool {
        match self.lock_timers().remove(id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn pending_timers(&self) -> usize {
        self.lock_timers().len()
    }

    /// Subscribes to the `SchedulerEvent` stream.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.event_sender.subscribe()
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }
}
