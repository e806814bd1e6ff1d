//! Lifecycle events broadcast by the background scheduler.
//!
//! These complement the durable `LogStore`: the log is for people reading
//! what happened while the screen was off, the event stream is for code
//! (the shell, tests) reacting to the scheduler as it runs.

use crate::clock::TimeOfDay;
use crate::common::{TimerId, TriggerId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// The poll loop began running.
    Started,
    /// The poll loop exited and the scheduler is `Stopped` again.
    Stopped,
    /// A trigger matched the current minute and its sequence was handed to
    /// the orchestrator.
    TriggerFired {
        id: TriggerId,
        title: String,
        minute: TimeOfDay,
    },
    /// A one-shot timer elapsed and its sequence was handed off.
    TimerFired { id: TimerId, title: String },
    TriggerAdded { id: TriggerId },
    TriggerRemoved { id: TriggerId },
}
