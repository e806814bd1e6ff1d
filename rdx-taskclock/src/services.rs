//! Wires a configuration into a running set of services.
//!
//! Both binaries go through [`Services::build`], so the daemon and the shell
//! drive the device the same way.

use crate::clock::SystemClock;
use crate::config::TaskclockConfig;
use crate::drivers::gesture::{EngineSlot, GestureSimulator};
use crate::drivers::launcher::AppLauncher;
use crate::drivers::screen::ScreenWaker;
use crate::drivers::shell::{ProcessShell, ShellChannel, ShellDevice};
use crate::drivers::Reporter;
use crate::logstore::{FileBackend, LogStore};
use crate::notify::Notifier;
use crate::orchestrator::{Devices, Orchestrator};
use crate::scheduler::BackgroundScheduler;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Everything one process needs to run scheduled sequences.
#[derive(Clone)]
pub struct Services {
    pub log: Arc<LogStore>,
    pub scheduler: BackgroundScheduler,
    /// Attach a gesture engine here to stop falling back to shell input.
    pub engine_slot: Arc<EngineSlot>,
    pub shell: Arc<dyn ShellChannel>,
}

impl Services {
    /// Builds the services with a file-backed log under `log.data_dir`.
    pub async fn build(config: &TaskclockConfig, notifier: Arc<dyn Notifier>) -> Self {
        let backend = Arc::new(FileBackend::new(config.log.data_dir.clone()));
        let log = Arc::new(LogStore::with_capacity(backend, config.log.max_entries));
        Self::build_with_log(config, notifier, log).await
    }

    /// Builds the services around an existing log store.
    pub async fn build_with_log(
        config: &TaskclockConfig,
        notifier: Arc<dyn Notifier>,
        log: Arc<LogStore>,
    ) -> Self {
        let shell: Arc<dyn ShellChannel> = Arc::new(
            ProcessShell::new(config.shell.program.clone(), config.shell.args.clone())
                .join_words(config.shell.join_words)
                .timeout(Duration::from_secs(config.shell.timeout_secs)),
        );
        let device = ShellDevice::new(shell.clone(), config.wake.host_component.clone());
        let engine_slot = Arc::new(EngineSlot::new());

        let devices = Devices {
            screen: Arc::new(ScreenWaker::new(
                Box::new(device.clone()),
                Reporter::new(log.clone(), notifier.clone(), "screen waker"),
                Duration::from_secs(config.wake.hold_secs),
            )),
            gestures: Arc::new(GestureSimulator::new(
                engine_slot.clone(),
                shell.clone(),
                Box::new(device.clone()),
                Reporter::new(log.clone(), notifier.clone(), "gesture"),
                config.gesture_timing(),
            )),
            launcher: Arc::new(AppLauncher::new(
                Box::new(device),
                Reporter::new(log.clone(), notifier, "app launcher"),
            )),
        };

        let orchestrator = Arc::new(Orchestrator::new(devices, log.clone()));
        let clock = Arc::new(SystemClock::new(config.scheduler.timezone));
        let scheduler = BackgroundScheduler::new(orchestrator, clock, config.poll_interval());
        for trigger in config.scheduled_triggers() {
            scheduler.add_trigger(trigger).await;
        }
        info!(
            "Services ready, {} trigger(s), device shell '{}'",
            config.triggers.len(),
            config.shell.program
        );

        Self {
            log,
            scheduler,
            engine_slot,
            shell,
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        self.scheduler.orchestrator()
    }
}
