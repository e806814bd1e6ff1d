//! Time-of-day triggers and the watcher that decides when they fire.

use super::sequence::ActionSequence;
use crate::clock::TimeOfDay;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Decides whether a wall-clock minute is a firing minute.
pub trait TriggerMatcher: Send + Sync + fmt::Debug {
    fn matches(&self, minute: TimeOfDay) -> bool;

    /// Short human-readable form, e.g. `08:30, 18:00`.
    fn describe(&self) -> String;
}

/// Fires on any of a fixed set of `HH:MM` times.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeOfDaySet(BTreeSet<TimeOfDay>);

impl TimeOfDaySet {
    pub fn new(times: impl IntoIterator<Item = TimeOfDay>) -> Self {
        Self(times.into_iter().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimeOfDay> {
        self.0.iter()
    }
}

impl TriggerMatcher for TimeOfDaySet {
    fn matches(&self, minute: TimeOfDay) -> bool {
        self.0.contains(&minute)
    }

    fn describe(&self) -> String {
        self.0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A configured time-of-day trigger and the script it runs.
#[derive(Debug, Clone)]
pub struct ScheduledTrigger {
    /// Task title every log entry of this trigger is grouped under.
    pub title: String,
    pub matcher: Arc<dyn TriggerMatcher>,
    pub sequence: ActionSequence,
}

impl ScheduledTrigger {
    pub fn new(
        title: impl Into<String>,
        matcher: impl TriggerMatcher + 'static,
        sequence: ActionSequence,
    ) -> Self {
        Self {
            title: title.into(),
            matcher: Arc::new(matcher),
            sequence,
        }
    }

    /// Shorthand for a trigger on a single `HH:MM` time.
    pub fn at(title: impl Into<String>, time: TimeOfDay, sequence: ActionSequence) -> Self {
        Self::new(title, TimeOfDaySet::new([time]), sequence)
    }
}

/// Watches the clock for one trigger.
///
/// Remembers the last minute it fired in, so a poll interval shorter than a
/// minute cannot fire the same trigger twice in that minute. The memory is
/// keyed on the date too: the same `HH:MM` fires again the next day.
#[derive(Debug)]
pub(crate) struct TriggerWatcher {
    pub trigger: ScheduledTrigger,
    last_fired: Option<(NaiveDate, TimeOfDay)>,
}

impl TriggerWatcher {
    pub(crate) fn new(trigger: ScheduledTrigger) -> Self {
        Self {
            trigger,
            last_fired: None,
        }
    }

    /// Returns `true` if the trigger is due at `now` and records the firing.
    pub(crate) fn check_and_mark(&mut self, now: &NaiveDateTime) -> bool {
        let minute = TimeOfDay::of(now);
        let key = (now.date(), minute);
        if self.last_fired == Some(key) || !self.trigger.matcher.matches(minute) {
            return false;
        }
        self.last_fired = Some(key);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(day: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 5, day)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn watcher(time: &str) -> TriggerWatcher {
        TriggerWatcher::new(ScheduledTrigger::at(
            "t",
            time.parse().unwrap(),
            ActionSequence::new(),
        ))
    }

    #[test]
    fn fires_once_per_minute_even_with_fast_polls() {
        let mut w = watcher("08:30");
        assert!(!w.check_and_mark(&at(1, 8, 29, 59)));
        assert!(w.check_and_mark(&at(1, 8, 30, 0)));
        assert!(!w.check_and_mark(&at(1, 8, 30, 20)));
        assert!(!w.check_and_mark(&at(1, 8, 30, 40)));
        assert!(!w.check_and_mark(&at(1, 8, 31, 0)));
    }

    #[test]
    fn fires_again_on_the_next_day() {
        let mut w = watcher("08:30");
        assert!(w.check_and_mark(&at(1, 8, 30, 0)));
        assert!(w.check_and_mark(&at(2, 8, 30, 5)));
    }

    #[test]
    fn set_matches_any_member() {
        let set = TimeOfDaySet::new(["08:30".parse().unwrap(), "18:00".parse().unwrap()]);
        assert!(set.matches("18:00".parse().unwrap()));
        assert!(!set.matches("12:00".parse().unwrap()));
        assert_eq!(set.describe(), "08:30, 18:00");
    }
}
