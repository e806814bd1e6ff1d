//! Touch gesture synthesis with a gesture-engine / shell fallback.
//!
//! Every call picks exactly one strategy:
//!
//! - [`Strategy::Engine`] when a gesture engine is attached and accepts the
//!   gesture. The call returns once dispatch is accepted; completion or
//!   cancellation arrives later on a oneshot channel and is logged by a
//!   watcher task.
//! - [`Strategy::Shell`] when no engine is attached, or the attached engine
//!   rejected the dispatch. The equivalent `input` command runs on a spawned
//!   task so the caller never waits for the process.
//!
//! Either way the terminal outcome is always written to the log.

use super::shell::ShellChannel;
use super::Reporter;
use crate::error::DriverError;
use async_trait::async_trait;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const SWIPE_DURATION: Duration = Duration::from_millis(300);
pub const TAP_DURATION: Duration = Duration::from_millis(50);
pub const COMPLETION_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    Swipe,
    Tap,
}

/// A single straight stroke from `start` to `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GestureSpec {
    pub kind: GestureKind,
    pub start: Point,
    pub end: Point,
    pub duration: Duration,
}

impl GestureSpec {
    /// Upward swipe through the middle 60% of the screen.
    pub fn swipe_up(display: DisplaySize, duration: Duration) -> Self {
        let center_x = (display.width / 2) as i32;
        Self {
            kind: GestureKind::Swipe,
            start: Point::new(center_x, (display.height as f64 * 0.8) as i32),
            end: Point::new(center_x, (display.height as f64 * 0.2) as i32),
            duration,
        }
    }

    /// Zero-length stroke at one point.
    pub fn tap(at: Point, duration: Duration) -> Self {
        Self {
            kind: GestureKind::Tap,
            start: at,
            end: at,
            duration,
        }
    }

    pub fn is_tap(&self) -> bool {
        self.kind == GestureKind::Tap
    }

    /// The equivalent `input` command for the shell channel.
    pub fn shell_command(&self) -> Vec<String> {
        match self.kind {
            GestureKind::Tap => vec![
                "input".into(),
                "tap".into(),
                self.start.x.to_string(),
                self.start.y.to_string(),
            ],
            GestureKind::Swipe => vec![
                "input".into(),
                "swipe".into(),
                self.start.x.to_string(),
                self.start.y.to_string(),
                self.end.x.to_string(),
                self.end.y.to_string(),
                self.duration.as_millis().to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplaySize {
    pub width: u32,
    pub height: u32,
}

/// Reports the current display size in pixels.
#[async_trait]
pub trait DisplayInfo: Send + Sync {
    async fn display_size(&self) -> Result<DisplaySize, DriverError>;
}

/// Terminal outcome of a gesture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GestureOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

/// A permission-granted touch synthesis capability.
#[async_trait]
pub trait GestureEngine: Send + Sync {
    /// Submits a gesture. `Ok` means the engine accepted it; the receiver
    /// resolves once the gesture completed or was cancelled.
    async fn dispatch(
        &self,
        gesture: GestureSpec,
    ) -> Result<oneshot::Receiver<GestureOutcome>, DriverError>;
}

/// The slot a gesture engine attaches to while it is running.
#[derive(Default)]
pub struct EngineSlot {
    engine: RwLock<Option<Arc<dyn GestureEngine>>>,
}

impl EngineSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, engine: Arc<dyn GestureEngine>) {
        *self.write() = Some(engine);
    }

    pub fn detach(&self) {
        *self.write() = None;
    }

    pub fn current(&self) -> Option<Arc<dyn GestureEngine>> {
        self.engine
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_attached(&self) -> bool {
        self.current().is_some()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<Arc<dyn GestureEngine>>> {
        self.engine
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Which way a gesture was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Engine,
    Shell,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Engine => write!(f, "gesture engine"),
            Strategy::Shell => write!(f, "shell"),
        }
    }
}

/// Picks the strategy for one call from the engine's availability.
pub fn select_strategy(engine_attached: bool) -> Strategy {
    if engine_attached {
        Strategy::Engine
    } else {
        Strategy::Shell
    }
}

/// A gesture that has been handed off, with its eventual outcome.
pub struct GestureDispatch {
    pub strategy: Strategy,
    pub gesture: GestureSpec,
    outcome: JoinHandle<GestureOutcome>,
}

impl GestureDispatch {
    /// Waits for the terminal outcome. Dropping the dispatch instead leaves
    /// the gesture running and logging on its own.
    pub async fn outcome(self) -> GestureOutcome {
        self.outcome
            .await
            .unwrap_or_else(|e| GestureOutcome::Failed(format!("outcome task failed: {e}")))
    }
}

/// Tunables for gesture geometry.
#[derive(Debug, Clone, Copy)]
pub struct GestureTiming {
    pub swipe: Duration,
    pub tap: Duration,
    /// Used when the display cannot be queried.
    pub fallback_display: DisplaySize,
    /// How long an accepted engine gesture may go without reporting back.
    pub completion_timeout: Duration,
}

impl Default for GestureTiming {
    fn default() -> Self {
        Self {
            swipe: SWIPE_DURATION,
            tap: TAP_DURATION,
            fallback_display: DisplaySize {
                width: 1080,
                height: 2400,
            },
            completion_timeout: COMPLETION_TIMEOUT,
        }
    }
}

/// Gesture simulator driver.
pub struct GestureSimulator {
    engine: Arc<EngineSlot>,
    shell: Arc<dyn ShellChannel>,
    display: Box<dyn DisplayInfo>,
    reporter: Reporter,
    timing: GestureTiming,
}

impl GestureSimulator {
    pub fn new(
        engine: Arc<EngineSlot>,
        shell: Arc<dyn ShellChannel>,
        display: Box<dyn DisplayInfo>,
        reporter: Reporter,
        timing: GestureTiming,
    ) -> Self {
        Self {
            engine,
            shell,
            display,
            reporter,
            timing,
        }
    }

    pub fn is_engine_available(&self) -> bool {
        self.engine.is_attached()
    }

    pub fn engine_slot(&self) -> &Arc<EngineSlot> {
        &self.engine
    }

    /// Swipes up from 80% to 20% of the display height.
    pub async fn swipe_up(&self) -> GestureDispatch {
        let display = match self.display.display_size().await {
            Ok(size) => size,
            Err(e) => {
                warn!("Display size unavailable, using fallback: {}", e);
                self.timing.fallback_display
            }
        };
        let spec = GestureSpec::swipe_up(display, self.timing.swipe);
        self.perform("swipeUp", spec).await
    }

    /// Taps once at the given point.
    pub async fn tap(&self, x: i32, y: i32) -> GestureDispatch {
        let spec = GestureSpec::tap(Point::new(x, y), self.timing.tap);
        self.perform("tap", spec).await
    }

    async fn perform(&self, label: &'static str, spec: GestureSpec) -> GestureDispatch {
        let engine = self.engine.current();
        if let (Strategy::Engine, Some(engine)) = (select_strategy(engine.is_some()), engine) {
            match engine.dispatch(spec).await {
                Ok(done) => {
                    self.reporter.toast(&format!("Simulating {label} via gesture engine"));
                    return self.watch_engine(label, spec, done);
                }
                Err(e) => {
                    self.reporter
                        .warning(format!("{label} rejected by gesture engine: {e}, falling back to shell"))
                        .await;
                }
            }
        }
        self.spawn_shell(label, spec)
    }

    fn watch_engine(
        &self,
        label: &'static str,
        spec: GestureSpec,
        done: oneshot::Receiver<GestureOutcome>,
    ) -> GestureDispatch {
        let reporter = self.reporter.clone();
        let limit = self.timing.completion_timeout;
        let outcome = tokio::spawn(async move {
            let outcome = match tokio::time::timeout(limit, done).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(_)) => {
                    GestureOutcome::Failed("gesture engine dropped the result".to_string())
                }
                Err(_) => GestureOutcome::Failed(format!(
                    "no completion reported within {}ms",
                    limit.as_millis()
                )),
            };
            match &outcome {
                GestureOutcome::Completed => {
                    reporter.success(format!("{label} completed via gesture engine")).await
                }
                GestureOutcome::Cancelled => {
                    reporter.warning(format!("{label} cancelled by gesture engine")).await
                }
                GestureOutcome::Failed(reason) => {
                    reporter
                        .error(format!("{label} failed via gesture engine: {reason}"))
                        .await
                }
            }
            outcome
        });
        GestureDispatch {
            strategy: Strategy::Engine,
            gesture: spec,
            outcome,
        }
    }

    fn spawn_shell(&self, label: &'static str, spec: GestureSpec) -> GestureDispatch {
        let shell = self.shell.clone();
        let reporter = self.reporter.clone();
        let command = spec.shell_command();
        let outcome = tokio::spawn(async move {
            debug!("Running shell fallback: {}", command.join(" "));
            let outcome = match shell.exec(&command).await {
                Ok(output) if output.success() => GestureOutcome::Completed,
                Ok(output) => GestureOutcome::Failed(format!(
                    "exit status {}{}",
                    output.status,
                    stderr_suffix(&output.stderr)
                )),
                Err(e) => GestureOutcome::Failed(e.to_string()),
            };
            match &outcome {
                GestureOutcome::Completed => {
                    reporter.success(format!("{label} simulated via shell")).await;
                    reporter.toast(&format!("Shell {label} simulated"));
                }
                other => {
                    let reason = match other {
                        GestureOutcome::Failed(reason) => reason.as_str(),
                        _ => "cancelled",
                    };
                    reporter
                        .error(format!("{label} failed via shell: {reason}"))
                        .await;
                    reporter.toast(&format!(
                        "Simulating {label} failed: enable the gesture engine"
                    ));
                }
            }
            outcome
        });
        GestureDispatch {
            strategy: Strategy::Shell,
            gesture: spec,
            outcome,
        }
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swipe_geometry_follows_display() {
        let spec = GestureSpec::swipe_up(
            DisplaySize {
                width: 1080,
                height: 2400,
            },
            SWIPE_DURATION,
        );
        assert_eq!(spec.start, Point::new(540, 1920));
        assert_eq!(spec.end, Point::new(540, 480));
        assert_eq!(
            spec.shell_command().join(" "),
            "input swipe 540 1920 540 480 300"
        );
    }

    #[test]
    fn tap_is_a_zero_length_stroke() {
        let spec = GestureSpec::tap(Point::new(10, 20), TAP_DURATION);
        assert!(spec.is_tap());
        assert_eq!(spec.duration, Duration::from_millis(50));
        assert_eq!(spec.shell_command().join(" "), "input tap 10 20");
    }

    #[test]
    fn flat_display_still_swipes() {
        let spec = GestureSpec::swipe_up(
            DisplaySize {
                width: 1080,
                height: 1,
            },
            SWIPE_DURATION,
        );
        assert_eq!(spec.start, spec.end);
        assert!(!spec.is_tap());
        assert_eq!(
            spec.shell_command().join(" "),
            "input swipe 540 0 540 0 300"
        );
    }

    #[test]
    fn strategy_follows_engine_availability() {
        assert_eq!(select_strategy(true), Strategy::Engine);
        assert_eq!(select_strategy(false), Strategy::Shell);
    }
}
