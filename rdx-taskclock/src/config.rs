//! Defines all configuration structures for taskclock.
//!
//! These structs are deserialized with `serde` from a TOML file layered with
//! `TASKCLOCK__*` environment overrides, so the schedule, the device channel
//! and the log location can all be changed without rebuilding.
//!
//! ```toml
//! [scheduler]
//! poll_interval_secs = 60
//! timezone = "Asia/Shanghai"
//!
//! [[triggers]]
//! title = "8:30 task"
//! at = ["08:30"]
//! steps = [
//!     { action = "wake" },
//!     { action = "delay", millis = 1000 },
//!     { action = "swipe_up" },
//! ]
//!
//! [shell]
//! program = "adb"
//! args = ["-s", "emulator-5554", "shell"]
//! ```

use crate::clock::TimeOfDay;
use crate::components::sequence::{ActionSequence, Step};
use crate::components::trigger::{ScheduledTrigger, TimeOfDaySet};
use crate::drivers::gesture::{DisplaySize, GestureTiming};
use crate::logstore::MAX_LOGS;
use anyhow::Context;
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskclockConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// The time-of-day triggers the poll loop checks.
    #[serde(default = "default_triggers")]
    pub triggers: Vec<TriggerConfig>,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub wake: WakeConfig,

    #[serde(default)]
    pub gesture: GestureConfig,

    #[serde(default)]
    pub shell: ShellConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between two clock checks.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// IANA timezone the `HH:MM` triggers are read in (e.g. "Europe/Paris").
    /// The host's local timezone when absent.
    #[serde(default)]
    pub timezone: Option<Tz>,
}

/// One time-of-day trigger.
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerConfig {
    pub title: String,
    /// Times of day the trigger fires at.
    pub at: Vec<TimeOfDay>,
    #[serde(default = "default_steps")]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Directory holding `task_logs.json`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Retention bound, clamped to 200.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WakeConfig {
    /// Seconds the wake handle keeps the display on.
    #[serde(default = "default_hold_secs")]
    pub hold_secs: u64,

    /// `package/activity` brought to the foreground on wake.
    #[serde(default)]
    pub host_component: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GestureConfig {
    #[serde(default = "default_swipe_ms")]
    pub swipe_duration_ms: u64,
    #[serde(default = "default_tap_ms")]
    pub tap_duration_ms: u64,
    /// Display size assumed when `wm size` cannot be read.
    #[serde(default = "default_width")]
    pub fallback_width: u32,
    #[serde(default = "default_height")]
    pub fallback_height: u32,
    /// Limit on waiting for the engine to report a dispatched gesture.
    #[serde(default = "default_completion_timeout_ms")]
    pub completion_timeout_ms: u64,
}

/// How device commands are executed.
#[derive(Debug, Clone, Deserialize)]
pub struct ShellConfig {
    #[serde(default = "default_program")]
    pub program: String,
    /// Arguments placed before every command.
    #[serde(default = "default_shell_args")]
    pub args: Vec<String>,
    /// Pass the command as one argument (`su -c "input tap 1 2"`).
    #[serde(default)]
    pub join_words: bool,
    #[serde(default = "default_shell_timeout_secs")]
    pub timeout_secs: u64,
}

impl TaskclockConfig {
    /// Loads the configuration from an optional TOML file plus environment
    /// overrides such as `TASKCLOCK__SCHEDULER__POLL_INTERVAL_SECS=30`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder
            .add_source(
                config::Environment::with_prefix("TASKCLOCK")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.poll_interval_secs)
    }

    /// The configured triggers as scheduler triggers.
    pub fn scheduled_triggers(&self) -> Vec<ScheduledTrigger> {
        self.triggers
            .iter()
            .map(|t| {
                ScheduledTrigger::new(
                    t.title.clone(),
                    TimeOfDaySet::new(t.at.iter().copied()),
                    ActionSequence::from(t.steps.clone()),
                )
            })
            .collect()
    }

    pub fn gesture_timing(&self) -> GestureTiming {
        GestureTiming {
            swipe: Duration::from_millis(self.gesture.swipe_duration_ms),
            tap: Duration::from_millis(self.gesture.tap_duration_ms),
            fallback_display: DisplaySize {
                width: self.gesture.fallback_width,
                height: self.gesture.fallback_height,
            },
            completion_timeout: Duration::from_millis(self.gesture.completion_timeout_ms),
        }
    }
}

// --- Default value functions for serde ---

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_triggers() -> Vec<TriggerConfig> {
    vec![TriggerConfig {
        title: "8:30 task".to_string(),
        at: vec![TimeOfDay::HALF_PAST_EIGHT],
        steps: default_steps(),
    }]
}

fn default_steps() -> Vec<Step> {
    ActionSequence::wake_then_swipe().steps().to_vec()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".taskclock")
}

fn default_max_entries() -> usize {
    MAX_LOGS
}

fn default_hold_secs() -> u64 {
    10
}

fn default_swipe_ms() -> u64 {
    300
}

fn default_tap_ms() -> u64 {
    50
}

fn default_width() -> u32 {
    1080
}

fn default_height() -> u32 {
    2400
}

fn default_completion_timeout_ms() -> u64 {
    5_000
}

fn default_program() -> String {
    "adb".to_string()
}

fn default_shell_args() -> Vec<String> {
    vec!["shell".to_string()]
}

fn default_shell_timeout_secs() -> u64 {
    15
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            timezone: None,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_entries: default_max_entries(),
        }
    }
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            hold_secs: default_hold_secs(),
            host_component: None,
        }
    }
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            swipe_duration_ms: default_swipe_ms(),
            tap_duration_ms: default_tap_ms(),
            fallback_width: default_width(),
            fallback_height: default_height(),
            completion_timeout_ms: default_completion_timeout_ms(),
        }
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_shell_args(),
            join_words: false,
            timeout_secs: default_shell_timeout_secs(),
        }
    }
}

impl Default for TaskclockConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            triggers: default_triggers(),
            log: LogConfig::default(),
            wake: WakeConfig::default(),
            gesture: GestureConfig::default(),
            shell: ShellConfig::default(),
        }
    }
}
