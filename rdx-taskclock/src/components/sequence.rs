//! Ordered, multi-step device automations.

use crate::common::UserSerial;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One device action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Light the display and get past the lock screen.
    Wake,
    /// Pause before the next step.
    Delay { millis: u64 },
    /// Swipe up across the display.
    SwipeUp,
    /// Tap once at a point.
    Tap { x: i32, y: i32 },
    /// Launch a package inside a given user profile.
    Launch {
        package: String,
        #[serde(default = "primary_serial")]
        user_serial: UserSerial,
    },
}

impl Action {
    /// Name used in log messages.
    pub fn label(&self) -> &'static str {
        match self {
            Action::Wake => "wake",
            Action::Delay { .. } => "delay",
            Action::SwipeUp => "swipeUp",
            Action::Tap { .. } => "tap",
            Action::Launch { .. } => "launch",
        }
    }

    pub fn delay(duration: Duration) -> Self {
        Action::Delay {
            millis: duration.as_millis() as u64,
        }
    }
}

fn primary_serial() -> UserSerial {
    UserSerial::PRIMARY
}

/// An action plus whether its failure stops the rest of the sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub action: Action,
    /// When set, a failure of this step skips every later step.
    #[serde(default)]
    pub required: bool,
}

impl Step {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            required: false,
        }
    }

    pub fn required(action: Action) -> Self {
        Self {
            action,
            required: true,
        }
    }
}

/// A best-effort automation script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionSequence {
    steps: Vec<Step>,
}

impl ActionSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a best-effort step.
    pub fn then(mut self, action: Action) -> Self {
        self.steps.push(Step::new(action));
        self
    }

    /// Appends a step whose failure aborts the remainder.
    pub fn then_required(mut self, action: Action) -> Self {
        self.steps.push(Step::required(action));
        self
    }

    pub fn then_wait(self, duration: Duration) -> Self {
        self.then(Action::delay(duration))
    }

    /// Wake, give the lock screen a second to settle, then swipe up.
    pub fn wake_then_swipe() -> Self {
        Self::new()
            .then(Action::Wake)
            .then_wait(Duration::from_secs(1))
            .then(Action::SwipeUp)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl From<Vec<Step>> for ActionSequence {
    fn from(steps: Vec<Step>) -> Self {
        Self { steps }
    }
}
