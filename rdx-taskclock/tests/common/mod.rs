//! Fakes shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use taskclock::clock::WallClock;
use taskclock::common::UserSerial;
use taskclock::drivers::gesture::{
    DisplayInfo, DisplaySize, EngineSlot, GestureEngine, GestureOutcome, GestureSimulator,
    GestureSpec, GestureTiming,
};
use taskclock::drivers::launcher::{AppLauncher, LaunchableActivity, ProfileCatalog};
use taskclock::drivers::screen::{ScreenWaker, WakeHandle, WakeHost};
use taskclock::drivers::shell::{ShellChannel, ShellOutput};
use taskclock::drivers::Reporter;
use taskclock::error::DriverError;
use taskclock::logstore::{LogEntry, LogStore};
use taskclock::notify::Notifier;
use taskclock::orchestrator::{Devices, Orchestrator};
use tokio::sync::oneshot;

pub fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, mo, d)
        .expect("valid date")
        .and_hms_opt(h, mi, 0)
        .expect("valid time")
}

/// A wall clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
        })
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().expect("clock lock") = now;
    }
}

impl WallClock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().expect("clock lock")
    }
}

/// Records every toast.
#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().expect("notifier lock").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.messages
            .lock()
            .expect("notifier lock")
            .push(message.to_string());
    }
}

/// Counters and switches behind [`FakeWakeHost`].
#[derive(Default)]
pub struct WakeCounters {
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
    pub fail_foreground: AtomicBool,
    pub fail_wake: AtomicBool,
    pub fail_release: AtomicBool,
}

pub struct FakeWakeHost {
    pub counters: Arc<WakeCounters>,
}

#[async_trait]
impl WakeHost for FakeWakeHost {
    async fn bring_to_foreground(&self) -> Result<(), DriverError> {
        if self.counters.fail_foreground.load(Ordering::SeqCst) {
            return Err(DriverError::PermissionDenied("overlay not granted".into()));
        }
        Ok(())
    }

    async fn acquire_wake(&self, _hold: Duration) -> Result<Box<dyn WakeHandle>, DriverError> {
        if self.counters.fail_wake.load(Ordering::SeqCst) {
            return Err(DriverError::ResourceUnavailable("power service gone".into()));
        }
        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeWakeHandle {
            counters: self.counters.clone(),
            held: true,
        }))
    }

    async fn unlock(&self) -> Result<(), DriverError> {
        Ok(())
    }
}

struct FakeWakeHandle {
    counters: Arc<WakeCounters>,
    held: bool,
}

#[async_trait]
impl WakeHandle for FakeWakeHandle {
    fn is_held(&self) -> bool {
        self.held
    }

    async fn release(&mut self) -> Result<(), DriverError> {
        if self.counters.fail_release.load(Ordering::SeqCst) {
            return Err(DriverError::TransientIo("release refused".into()));
        }
        self.held = false;
        self.counters.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    Complete,
    Cancel,
    Reject,
}

/// A gesture engine that answers every gesture the same way.
pub struct FakeEngine {
    pub mode: EngineMode,
    pub dispatched: Mutex<Vec<GestureSpec>>,
}

impl FakeEngine {
    pub fn new(mode: EngineMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            dispatched: Mutex::new(Vec::new()),
        })
    }

    pub fn dispatched(&self) -> Vec<GestureSpec> {
        self.dispatched.lock().expect("engine lock").clone()
    }
}

#[async_trait]
impl GestureEngine for FakeEngine {
    async fn dispatch(
        &self,
        gesture: GestureSpec,
    ) -> Result<oneshot::Receiver<GestureOutcome>, DriverError> {
        if self.mode == EngineMode::Reject {
            return Err(DriverError::ResourceUnavailable("dispatch rejected".into()));
        }
        self.dispatched.lock().expect("engine lock").push(gesture);
        let (tx, rx) = oneshot::channel();
        let outcome = match self.mode {
            EngineMode::Cancel => GestureOutcome::Cancelled,
            _ => GestureOutcome::Completed,
        };
        tx.send(outcome).ok();
        Ok(rx)
    }
}

/// A gesture engine that accepts every gesture and never reports back.
#[derive(Default)]
pub struct SilentEngine {
    pending: Mutex<Vec<oneshot::Sender<GestureOutcome>>>,
}

impl SilentEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().expect("engine lock").len()
    }
}

#[async_trait]
impl GestureEngine for SilentEngine {
    async fn dispatch(
        &self,
        _gesture: GestureSpec,
    ) -> Result<oneshot::Receiver<GestureOutcome>, DriverError> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().expect("engine lock").push(tx);
        Ok(rx)
    }
}

/// A shell channel that records commands and answers from a script.
#[derive(Default)]
pub struct FakeShell {
    pub commands: Mutex<Vec<String>>,
    /// `(command prefix, output)`; the first matching prefix wins.
    pub responses: Mutex<Vec<(String, ShellOutput)>>,
}

impl FakeShell {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, prefix: &str, status: i32, stdout: &str, stderr: &str) {
        self.responses.lock().expect("shell lock").push((
            prefix.to_string(),
            ShellOutput {
                status,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            },
        ));
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().expect("shell lock").clone()
    }
}

#[async_trait]
impl ShellChannel for FakeShell {
    async fn exec(&self, command: &[String]) -> Result<ShellOutput, DriverError> {
        let line = command.join(" ");
        self.commands.lock().expect("shell lock").push(line.clone());
        let responses = self.responses.lock().expect("shell lock");
        Ok(responses
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default())
    }
}

pub struct FakeDisplay;

#[async_trait]
impl DisplayInfo for FakeDisplay {
    async fn display_size(&self) -> Result<DisplaySize, DriverError> {
        Ok(DisplaySize {
            width: 1000,
            height: 2000,
        })
    }
}

/// Two profiles: the primary one (0) with mail and chat, a work profile (10)
/// with mail only.
#[derive(Default)]
pub struct FakeCatalog {
    pub started: Arc<Mutex<Vec<(UserSerial, String)>>>,
}

#[async_trait]
impl ProfileCatalog for FakeCatalog {
    async fn profiles(&self) -> Result<Vec<UserSerial>, DriverError> {
        Ok(vec![UserSerial(0), UserSerial(10)])
    }

    async fn launchable_activities(
        &self,
        profile: UserSerial,
        package: Option<&str>,
    ) -> Result<Vec<LaunchableActivity>, DriverError> {
        let activity = |pkg: &str, label: &str| LaunchableActivity {
            package_name: pkg.to_string(),
            label: label.to_string(),
            component: format!("{pkg}/.Main"),
        };
        let all = match profile.0 {
            0 => vec![activity("com.example.mail", "Mail"), activity("com.example.chat", "Chat")],
            10 => vec![activity("com.example.mail", "Mail")],
            _ => return Err(DriverError::TargetNotFound(format!("user {profile}"))),
        };
        Ok(all
            .into_iter()
            .filter(|a| package.map_or(true, |p| a.package_name == p))
            .collect())
    }

    async fn start_activity(&self, profile: UserSerial, component: &str) -> Result<(), DriverError> {
        self.started
            .lock()
            .expect("catalog lock")
            .push((profile, component.to_string()));
        Ok(())
    }
}

/// Every driver wired to fakes around one in-memory log.
pub struct Rig {
    pub log: Arc<LogStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub wake: Arc<WakeCounters>,
    pub shell: Arc<FakeShell>,
    pub engine_slot: Arc<EngineSlot>,
    pub started: Arc<Mutex<Vec<(UserSerial, String)>>>,
    pub orchestrator: Arc<Orchestrator>,
}

impl Rig {
    pub fn new() -> Self {
        let log = Arc::new(LogStore::in_memory());
        let notifier = Arc::new(RecordingNotifier::default());
        let wake = Arc::new(WakeCounters::default());
        let shell = FakeShell::new();
        let engine_slot = Arc::new(EngineSlot::new());
        let catalog = FakeCatalog::default();
        let started = catalog.started.clone();

        let reporter = |title| Reporter::new(log.clone(), notifier.clone(), title);
        let devices = Devices {
            screen: Arc::new(ScreenWaker::new(
                Box::new(FakeWakeHost {
                    counters: wake.clone(),
                }),
                reporter("screen waker"),
                Duration::from_secs(10),
            )),
            gestures: Arc::new(GestureSimulator::new(
                engine_slot.clone(),
                shell.clone(),
                Box::new(FakeDisplay),
                reporter("gesture"),
                GestureTiming::default(),
            )),
            launcher: Arc::new(AppLauncher::new(Box::new(catalog), reporter("app launcher"))),
        };
        let orchestrator = Arc::new(Orchestrator::new(devices, log.clone()));

        Self {
            log,
            notifier,
            wake,
            shell,
            engine_slot,
            started,
            orchestrator,
        }
    }

    pub fn devices(&self) -> &Devices {
        self.orchestrator.devices()
    }

    /// Entries under `title`, oldest first.
    pub async fn entries_for(&self, title: &str) -> Vec<LogEntry> {
        entries_for(&self.log, title).await
    }
}

/// Entries under `title`, oldest first.
pub async fn entries_for(log: &LogStore, title: &str) -> Vec<LogEntry> {
    let mut entries: Vec<LogEntry> = log
        .list()
        .await
        .into_iter()
        .filter(|e| e.task_title.as_deref() == Some(title))
        .collect();
    entries.reverse();
    entries
}

/// Polls the log until `title` has at least `count` entries.
pub async fn wait_for_entries(log: &LogStore, title: &str, count: usize) -> Vec<LogEntry> {
    for _ in 0..500 {
        let entries = entries_for(log, title).await;
        if entries.len() >= count {
            return entries;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {count} entries under '{title}'");
}

/// `message` of each entry.
pub fn messages(entries: &[LogEntry]) -> Vec<&str> {
    entries.iter().map(|e| e.message.as_str()).collect()
}
