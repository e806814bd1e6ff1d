use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use taskclock::prelude::*;
use taskclock::ENGINE_NAME;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // 2. Load the configuration from the optional path argument.
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = TaskclockConfig::load(config_path.as_deref())?;

    // 3. Wire the services.
    let services = Services::build(&config, Arc::new(TracingNotifier)).await;

    // 4. Spawn listeners for the scheduler's event stream and the log.
    spawn_event_listeners(&services).await;

    // 5. Run until Ctrl+C.
    services.scheduler.start().await?;
    info!("{} daemon running. Press Ctrl+C to stop.", ENGINE_NAME);
    tokio::signal::ctrl_c().await?;
    info!("Ctrl+C received, shutting down.");
    services.scheduler.stop().await;

    Ok(())
}

/// Mirrors scheduler events and new log entries into the diagnostic log.
async fn spawn_event_listeners(services: &Services) {
    let mut event_rx = services.scheduler.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = event_rx.recv().await {
            info!("[SCHEDULER] => {:?}", event);
        }
    });

    // Dropping the subscription leaves the listener registered.
    services
        .log
        .subscribe(|logs| {
            if let Some(latest) = logs.first() {
                let title = latest.task_title.as_deref().unwrap_or("-");
                match latest.kind {
                    LogKind::Error | LogKind::Warning => {
                        warn!("[LOG] {:?} {} | {}", latest.kind, title, latest.message)
                    }
                    _ => info!("[LOG] {:?} {} | {}", latest.kind, title, latest.message),
                }
            }
        })
        .await;
}
