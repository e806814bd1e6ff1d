use anyhow::Result;
use chrono::{Local, TimeZone};
use colored::Colorize;
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use taskclock::prelude::*;
use taskclock::{ENGINE_NAME, VERSION as LIB_VERSION};
use tracing::info;
use tracing_subscriber::EnvFilter;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct CommandHighlighter;

impl Highlighter for CommandHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            let colored_command = command.yellow().bold();
            let colored_rest = rest.yellow();
            Cow::Owned(format!("{} {}", colored_command, colored_rest))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }
    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    // Embedded at compile time from the crate root.
    const LOGO_TEXT: &str = include_str!("../logo.log");
    println!("{}", LOGO_TEXT.cyan());

    let version_string = format!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );
    let rule = "-".repeat(79);

    println!("{}", rule.dimmed());
    println!("{}", version_string);
    println!(
        "{}",
        "\n    This software is provided 'as is', without warranty of any kind.\n    Distributed under the MIT OR Apache-2.0 license. Use at your own risk.\n"
            .dimmed()
    );
    println!("{}", rule.dimmed());
}

struct ShellArgs {
    config: Option<PathBuf>,
    in_memory: bool,
}

fn parse_args() -> ShellArgs {
    let mut args = ShellArgs {
        config: None,
        in_memory: false,
    };
    for arg in env::args_os().skip(1) {
        if arg == "--memory" {
            args.in_memory = true;
        } else {
            args.config = Some(PathBuf::from(arg));
        }
    }
    args
}

/// Prints scheduler events and toasts as they arrive.
fn spawn_event_listeners(
    scheduler: &BackgroundScheduler,
    mut toasts: tokio::sync::mpsc::UnboundedReceiver<String>,
) {
    let mut event_rx = scheduler.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = event_rx.recv().await {
            println!("\n<-- [SCHEDULER] {:?}", event);
        }
    });

    tokio::spawn(async move {
        while let Some(message) = toasts.recv().await {
            println!("\n<-- [TOAST] {}", message.green());
        }
    });
}

fn print_entry(entry: &LogEntry) {
    let when = Local
        .timestamp_millis_opt(entry.timestamp)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| entry.timestamp.to_string());
    let kind = match entry.kind {
        LogKind::Info => "info".normal(),
        LogKind::Success => "success".green(),
        LogKind::Warning => "warning".yellow(),
        LogKind::Error => "error".red(),
    };
    let title = entry.task_title.as_deref().unwrap_or("-");
    println!("  {} [{:>7}] {:<14} {}", when.dimmed(), kind, title.cyan(), entry.message);
}

fn print_help() {
    println!("Available commands:");
    println!("  start                 - Starts the background scheduler.");
    println!("  stop                  - Stops the background scheduler.");
    println!("  status                - Shows scheduler state and poll interval.");
    println!("  wake                  - Wakes the screen and dismisses the lock screen.");
    println!("  swipe                 - Swipes up once.");
    println!("  tap <X> <Y>           - Taps once at the given point.");
    println!("  engine                - Shows which gesture strategy is in use.");
    println!("  apps                  - Lists launchable apps across all profiles.");
    println!("  launch <PKG> <SERIAL> - Launches a package in the given profile.");
    println!("  logs [N]              - Shows the newest N log entries (default 20).");
    println!("  clear                 - Clears the event log.");
    println!("  once <SECS>           - Runs the wake-and-swipe sequence once in SECS seconds.");
    println!("  cancel <HANDLE>       - Cancels a pending one-shot timer.");
    println!("  triggers              - Lists the registered time-of-day triggers.");
    println!("  exit                  - Quits the shell.");
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let args = parse_args();
    let config = TaskclockConfig::load(args.config.as_deref())?;
    let (notifier, toasts) = ChannelNotifier::channel();
    let notifier: Arc<dyn Notifier> = Arc::new(notifier);
    let services = if args.in_memory {
        Services::build_with_log(&config, notifier, Arc::new(LogStore::in_memory())).await
    } else {
        Services::build(&config, notifier).await
    };
    let scheduler = services.scheduler.clone();
    let devices = services.orchestrator().devices().clone();

    spawn_event_listeners(&scheduler, toasts);
    info!("{} services ready", ENGINE_NAME);

    // The shell's state management variables.
    let mut pending_timers: HashMap<usize, TimerId> = HashMap::new();
    let mut next_handle: usize = 0;

    let mut rl = Editor::new()?;
    rl.set_helper(Some(CommandHighlighter));

    println!(
        "{} shell ready. Type 'start' to run the scheduler, 'help' for commands or 'exit' to quit.",
        ENGINE_NAME.cyan()
    );

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        let readline = rl.readline(&prompt);
        match readline {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let args = line.split_whitespace().collect::<Vec<_>>();

                let Some(command) = args.first() else {
                    continue;
                };
                match *command {
                    "start" => match scheduler.start().await {
                        Ok(()) => println!("--> Scheduler {:?}.", scheduler.state()),
                        Err(e) => println!("--> Error: {}", e),
                    },
                    "stop" => {
                        scheduler.stop().await;
                        println!("--> Scheduler {:?}.", scheduler.state());
                    }
                    "status" => {
                        println!("Scheduler: {:?}", scheduler.state());
                        println!("  poll interval    {:?}", scheduler.poll_interval());
                        println!("  triggers         {}", scheduler.triggers().await.len());
                        println!("  pending timers   {}", scheduler.pending_timers());
                        println!("  log entries      {}", services.log.list().await.len());
                    }
                    "wake" => {
                        let report = devices.screen.wake().await;
                        println!("  foreground   {:?}", report.foreground);
                        println!("  wake lock    {:?}", report.wake_lock);
                        println!("  unlock       {:?}", report.unlock);
                    }
                    "swipe" => {
                        let dispatch = devices.gestures.swipe_up().await;
                        println!("--> Swipe sent via {}.", dispatch.strategy);
                        println!("--> Outcome: {:?}", dispatch.outcome().await);
                    }
                    "tap" => {
                        let point = args
                            .get(1)
                            .zip(args.get(2))
                            .and_then(|(x, y)| Some((x.parse::<i32>().ok()?, y.parse::<i32>().ok()?)));
                        match point {
                            Some((x, y)) => {
                                let dispatch = devices.gestures.tap(x, y).await;
                                println!("--> Tap sent via {}.", dispatch.strategy);
                                println!("--> Outcome: {:?}", dispatch.outcome().await);
                            }
                            None => println!("Usage: tap <X> <Y>"),
                        }
                    }
                    "engine" => {
                        if devices.gestures.is_engine_available() {
                            println!("--> Gesture engine attached, gestures go through it.");
                        } else {
                            println!("--> No gesture engine attached, gestures fall back to shell input.");
                        }
                    }
                    "apps" => match devices.launcher.list_installed_apps().await {
                        Ok(apps) => {
                            println!("Installed apps ({}):", apps.len());
                            for app in apps {
                                println!(
                                    "  [{}] {:<40} {}",
                                    app.identity.user_serial, app.identity.package_name, app.label
                                );
                            }
                        }
                        Err(e) => println!("--> Error: {}", e),
                    },
                    "launch" => {
                        let target = args.get(1).zip(args.get(2).and_then(|s| s.parse::<u64>().ok()));
                        match target {
                            Some((package, serial)) => {
                                match devices.launcher.launch(package, UserSerial(serial)).await {
                                    Ok(()) => println!("--> Launched {} for user {}.", package, serial),
                                    Err(e) => println!("--> Error: {}", e),
                                }
                            }
                            None => println!("Usage: launch <PKG> <SERIAL>"),
                        }
                    }
                    "logs" => {
                        let limit = match args.get(1) {
                            Some(n) => match n.parse::<usize>() {
                                Ok(n) => n,
                                Err(_) => {
                                    println!("Error: '{}' is not a valid count.", n);
                                    continue;
                                }
                            },
                            None => 20,
                        };
                        let logs = services.log.list().await;
                        if logs.is_empty() {
                            println!("--> The log is empty.");
                        }
                        for entry in logs.iter().take(limit) {
                            print_entry(entry);
                        }
                    }
                    "clear" => {
                        services.log.clear().await;
                        println!("--> Log cleared.");
                    }
                    "once" => match args.get(1).map(|s| s.parse::<u64>()) {
                        Some(Ok(seconds)) => {
                            let timer_id = scheduler.schedule_once(
                                Duration::from_secs(seconds),
                                "manual run",
                                ActionSequence::wake_then_swipe(),
                            );
                            let handle = next_handle;
                            pending_timers.insert(handle, timer_id);
                            next_handle += 1;
                            println!("--> Wake-and-swipe scheduled in {}s with handle: #{}", seconds, handle);
                        }
                        Some(Err(_)) => println!("Error: '{}' is not a valid number of seconds.", args[1]),
                        None => println!("Usage: once <SECS>"),
                    },
                    "cancel" => match args.get(1).and_then(|s| s.parse::<usize>().ok()) {
                        Some(handle) => match pending_timers.remove(&handle) {
                            Some(timer_id) if scheduler.cancel_once(timer_id) => {
                                println!("--> Timer #{} cancelled.", handle)
                            }
                            Some(_) => println!("--> Timer #{} already fired.", handle),
                            None => println!("Error: Invalid handle #{}.", handle),
                        },
                        None => println!("Usage: cancel <HANDLE>"),
                    },
                    "triggers" => {
                        println!("Registered triggers:");
                        for (id, trigger) in scheduler.triggers().await {
                            println!(
                                "  {:?} '{}' at {} ({} steps)",
                                id,
                                trigger.title,
                                trigger.matcher.describe(),
                                trigger.sequence.len()
                            );
                        }
                    }
                    "help" => print_help(),
                    "exit" => break,
                    _ => println!("Unknown command: '{}'. Type 'help'.", line),
                }
            }
            Err(_) => {
                println!("Exiting taskshell...");
                break;
            }
        }
    }

    scheduler.stop().await;
    Ok(())
}
