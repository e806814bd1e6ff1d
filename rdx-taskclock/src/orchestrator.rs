//! Runs action sequences against the device drivers and logs every step.

use crate::components::sequence::{Action, ActionSequence};
use crate::drivers::gesture::{GestureOutcome, GestureSimulator};
use crate::drivers::launcher::AppLauncher;
use crate::drivers::screen::ScreenWaker;
use crate::error::DriverError;
use crate::logstore::LogStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// The device drivers one orchestrator drives.
#[derive(Clone)]
pub struct Devices {
    pub screen: Arc<ScreenWaker>,
    pub gestures: Arc<GestureSimulator>,
    pub launcher: Arc<AppLauncher>,
}

/// Result of one executed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub action: Action,
    pub result: Result<(), DriverError>,
}

/// Result of a whole sequence run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub title: String,
    pub steps: Vec<StepReport>,
    /// Index of the required step whose failure stopped the run.
    pub aborted_at: Option<usize>,
}

impl RunReport {
    pub fn failures(&self) -> usize {
        self.steps.iter().filter(|s| s.result.is_err()).count()
    }
}

/// Sequences dependent device actions.
///
/// Steps run strictly in order. Each non-delay step produces an info
/// `step started: <action>` entry followed by a success `<action>` or an error
/// `<action>: <reason>` entry, all under the sequence title. A failed step only
/// stops the run when it is marked required.
pub struct Orchestrator {
    devices: Devices,
    log: Arc<LogStore>,
}

impl Orchestrator {
    pub fn new(devices: Devices, log: Arc<LogStore>) -> Self {
        Self { devices, log }
    }

    pub fn devices(&self) -> &Devices {
        &self.devices
    }

    pub fn log(&self) -> &Arc<LogStore> {
        &self.log
    }

    pub async fn run(&self, title: &str, sequence: &ActionSequence) -> RunReport {
        info!("Running '{}' ({} steps)", title, sequence.len());
        let mut report = RunReport {
            title: title.to_string(),
            steps: Vec::with_capacity(sequence.len()),
            aborted_at: None,
        };

        for (index, step) in sequence.steps().iter().enumerate() {
            if let Action::Delay { millis } = step.action {
                debug!("'{}' waiting {}ms", title, millis);
                tokio::time::sleep(Duration::from_millis(millis)).await;
                report.steps.push(StepReport {
                    action: step.action.clone(),
                    result: Ok(()),
                });
                continue;
            }

            let label = step.action.label();
            self.log
                .info(format!("step started: {label}"), Some(title))
                .await;
            let result = self.execute(&step.action).await;
            match &result {
                Ok(()) => self.log.success(label, Some(title)).await,
                Err(e) => self.log.error(format!("{label}: {e}"), Some(title)).await,
            }
            let failed = result.is_err();
            report.steps.push(StepReport {
                action: step.action.clone(),
                result,
            });

            if failed && step.required {
                self.log
                    .error(
                        format!("required step {label} failed, remaining steps skipped"),
                        Some(title),
                    )
                    .await;
                report.aborted_at = Some(index);
                break;
            }
        }
        report
    }

    async fn execute(&self, action: &Action) -> Result<(), DriverError> {
        match action {
            Action::Wake => self.devices.screen.wake().await.outcome(),
            Action::Delay { .. } => Ok(()),
            Action::SwipeUp => gesture_result(self.devices.gestures.swipe_up().await.outcome().await),
            Action::Tap { x, y } => {
                gesture_result(self.devices.gestures.tap(*x, *y).await.outcome().await)
            }
            Action::Launch {
                package,
                user_serial,
            } => self.devices.launcher.launch(package, *user_serial).await,
        }
    }
}

fn gesture_result(outcome: GestureOutcome) -> Result<(), DriverError> {
    match outcome {
        GestureOutcome::Completed => Ok(()),
        GestureOutcome::Cancelled => Err(DriverError::ResourceUnavailable(
            "gesture was cancelled".to_string(),
        )),
        GestureOutcome::Failed(reason) => Err(DriverError::ResourceUnavailable(reason)),
    }
}
