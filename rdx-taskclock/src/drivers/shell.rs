//! The privileged shell channel and the device host built on top of it.
//!
//! [`ProcessShell`] runs device commands through a configurable launcher
//! (`adb -s SERIAL shell`, `su -c`, or nothing when running on the device).
//! [`ShellDevice`] implements the driver seams with stock Android shell
//! tools: `wm`, `pm`, `cmd package`, `am`, `input` and `svc`.
//!
//! Shell tools address profiles by user id. `ShellDevice` uses the user id as
//! the profile serial.

use super::gesture::{DisplayInfo, DisplaySize};
use super::launcher::{is_component_name, is_package_name, LaunchableActivity, ProfileCatalog};
use super::screen::{WakeHandle, WakeHost};
use crate::common::UserSerial;
use crate::error::DriverError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Captured result of one shell command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShellOutput {
    /// Exit status, `-1` when the process was killed by a signal.
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Executes a command on the device with elevated privileges.
#[async_trait]
pub trait ShellChannel: Send + Sync {
    async fn exec(&self, command: &[String]) -> Result<ShellOutput, DriverError>;
}

/// Runs commands as local child processes behind a fixed launcher prefix.
#[derive(Debug, Clone)]
pub struct ProcessShell {
    program: String,
    prefix: Vec<String>,
    join_words: bool,
    timeout: Duration,
}

impl ProcessShell {
    /// `program prefix... words...`, e.g. `adb -s emulator-5554 shell input tap 1 2`.
    pub fn new(program: impl Into<String>, prefix: Vec<String>) -> Self {
        Self {
            program: program.into(),
            prefix,
            join_words: false,
            timeout: Duration::from_secs(15),
        }
    }

    /// Passes the command as one space-joined argument, as `su -c` expects.
    pub fn join_words(mut self, join: bool) -> Self {
        self.join_words = join;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ShellChannel for ProcessShell {
    async fn exec(&self, command: &[String]) -> Result<ShellOutput, DriverError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.prefix).kill_on_drop(true);
        if self.join_words {
            cmd.arg(command.join(" "));
        } else {
            cmd.args(command);
        }
        debug!("shell: {} {} {}", self.program, self.prefix.join(" "), command.join(" "));

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                DriverError::TransientIo(format!(
                    "'{}' timed out after {}s",
                    command.join(" "),
                    self.timeout.as_secs()
                ))
            })??;

        Ok(ShellOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Device host implemented with stock shell tools.
#[derive(Clone)]
pub struct ShellDevice {
    shell: Arc<dyn ShellChannel>,
    host_component: Option<String>,
}

impl ShellDevice {
    /// `host_component` is the `package/activity` brought to the foreground on
    /// wake. Without it the foreground step reports `ResourceUnavailable`.
    pub fn new(shell: Arc<dyn ShellChannel>, host_component: Option<String>) -> Self {
        Self {
            shell,
            host_component,
        }
    }

    async fn run(&self, words: &[&str]) -> Result<ShellOutput, DriverError> {
        let command: Vec<String> = words.iter().map(|w| w.to_string()).collect();
        let output = self.shell.exec(&command).await?;
        check(output, &command.join(" "))
    }
}

#[async_trait]
impl DisplayInfo for ShellDevice {
    async fn display_size(&self) -> Result<DisplaySize, DriverError> {
        let output = self.run(&["wm", "size"]).await?;
        parse_wm_size(&output.stdout).ok_or_else(|| {
            DriverError::ResourceUnavailable(format!(
                "unrecognised 'wm size' output: {}",
                output.stdout.trim()
            ))
        })
    }
}

#[async_trait]
impl ProfileCatalog for ShellDevice {
    async fn profiles(&self) -> Result<Vec<UserSerial>, DriverError> {
        let output = self.run(&["pm", "list", "users"]).await?;
        Ok(parse_user_list(&output.stdout))
    }

    async fn launchable_activities(
        &self,
        profile: UserSerial,
        package: Option<&str>,
    ) -> Result<Vec<LaunchableActivity>, DriverError> {
        let user = profile.to_string();
        let mut words = vec![
            "cmd",
            "package",
            "query-activities",
            "--brief",
            "--user",
            user.as_str(),
            "-a",
            "android.intent.action.MAIN",
            "-c",
            "android.intent.category.LAUNCHER",
        ];
        if let Some(package) = package {
            if !is_package_name(package) {
                return Err(DriverError::TargetNotFound(format!(
                    "'{package}' is not a valid package name"
                )));
            }
            words.push(package);
        }
        let output = self.run(&words).await?;
        Ok(parse_activity_components(&output.stdout))
    }

    async fn start_activity(&self, profile: UserSerial, component: &str) -> Result<(), DriverError> {
        if !is_component_name(component) {
            return Err(DriverError::TargetNotFound(format!(
                "'{component}' is not a valid component name"
            )));
        }
        let user = profile.to_string();
        let output = self
            .run(&["am", "start", "--user", user.as_str(), "-n", component])
            .await?;
        // `am start` reports resolution errors on stdout with a zero exit code.
        if let Some(line) = output
            .stdout
            .lines()
            .chain(output.stderr.lines())
            .find(|line| line.trim_start().starts_with("Error"))
        {
            return Err(DriverError::TargetNotFound(line.trim().to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl WakeHost for ShellDevice {
    async fn bring_to_foreground(&self) -> Result<(), DriverError> {
        let component = self.host_component.as_deref().ok_or_else(|| {
            DriverError::ResourceUnavailable("no host component configured".to_string())
        })?;
        if !is_component_name(component) {
            return Err(DriverError::ResourceUnavailable(format!(
                "host component '{component}' is not a valid component name"
            )));
        }
        self.run(&["am", "start", "--activity-reorder-to-front", "-n", component])
            .await
            .map(|_| ())
    }

    async fn acquire_wake(&self, hold: Duration) -> Result<Box<dyn WakeHandle>, DriverError> {
        self.run(&["input", "keyevent", "KEYCODE_WAKEUP"]).await?;
        self.run(&["svc", "power", "stayon", "true"]).await?;

        let held = Arc::new(AtomicBool::new(true));
        let timer = {
            let device = self.clone();
            let held = held.clone();
            tokio::spawn(async move {
                tokio::time::sleep(hold).await;
                if held.swap(false, Ordering::SeqCst) {
                    if let Err(e) = device.run(&["svc", "power", "stayon", "false"]).await {
                        warn!("Timed wake release failed: {}", e);
                    }
                }
            })
        };
        Ok(Box::new(ShellWakeHandle {
            device: self.clone(),
            held,
            timer: Some(timer),
        }))
    }

    async fn unlock(&self) -> Result<(), DriverError> {
        self.run(&["wm", "dismiss-keyguard"]).await.map(|_| ())
    }
}

/// `svc power stayon` held until released or until the hold timer fires.
struct ShellWakeHandle {
    device: ShellDevice,
    held: Arc<AtomicBool>,
    timer: Option<JoinHandle<()>>,
}

#[async_trait]
impl WakeHandle for ShellWakeHandle {
    fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }

    async fn release(&mut self) -> Result<(), DriverError> {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        if self.held.swap(false, Ordering::SeqCst) {
            self.device
                .run(&["svc", "power", "stayon", "false"])
                .await?;
        }
        Ok(())
    }
}

fn check(output: ShellOutput, what: &str) -> Result<ShellOutput, DriverError> {
    let denied = |text: &str| text.contains("SecurityException") || text.contains("Permission denial");
    if denied(&output.stderr) || denied(&output.stdout) {
        return Err(DriverError::PermissionDenied(format!("'{what}' was refused")));
    }
    if !output.success() {
        return Err(DriverError::TransientIo(format!(
            "'{}' exited with status {}: {}",
            what,
            output.status,
            output.stderr.trim()
        )));
    }
    Ok(output)
}

/// Parses `wm size`. An override size wins over the physical size.
pub fn parse_wm_size(output: &str) -> Option<DisplaySize> {
    let mut physical = None;
    let mut overridden = None;
    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let Some((w, h)) = value.trim().split_once('x') else {
            continue;
        };
        let (Ok(width), Ok(height)) = (w.trim().parse(), h.trim().parse()) else {
            continue;
        };
        let size = DisplaySize { width, height };
        match key.trim() {
            "Physical size" => physical = Some(size),
            "Override size" => overridden = Some(size),
            _ => {}
        }
    }
    overridden.or(physical)
}

/// Parses `pm list users`, e.g. `\tUserInfo{10:Work profile:1030} running`.
pub fn parse_user_list(output: &str) -> Vec<UserSerial> {
    let mut serials: Vec<UserSerial> = output
        .lines()
        .filter_map(|line| {
            let rest = line.split_once("UserInfo{")?.1;
            let id = rest.split(':').next()?;
            id.trim().parse().ok().map(UserSerial)
        })
        .collect();
    serials.sort();
    serials.dedup();
    serials
}

/// Extracts `package/class` component lines from `query-activities --brief`.
pub fn parse_activity_components(output: &str) -> Vec<LaunchableActivity> {
    let mut activities: Vec<LaunchableActivity> = Vec::new();
    for line in output.lines().map(str::trim) {
        if line.is_empty() || line.contains(char::is_whitespace) || line.contains('=') {
            continue;
        }
        let Some((package, _)) = line.split_once('/') else {
            continue;
        };
        if !is_component_name(line) {
            continue;
        }
        if activities.iter().any(|a| a.component == line) {
            continue;
        }
        activities.push(LaunchableActivity {
            package_name: package.to_string(),
            label: package.to_string(),
            component: line.to_string(),
        });
    }
    activities
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wm_size_prefers_override() {
        let out = "Physical size: 1080x2400\nOverride size: 720x1600\n";
        assert_eq!(
            parse_wm_size(out),
            Some(DisplaySize {
                width: 720,
                height: 1600
            })
        );
        assert_eq!(
            parse_wm_size("Physical size: 1440x3200"),
            Some(DisplaySize {
                width: 1440,
                height: 3200
            })
        );
        assert_eq!(parse_wm_size("cmd: Can't find service: window"), None);
    }

    #[test]
    fn user_list_yields_sorted_serials() {
        let out = "Users:\n\tUserInfo{10:Work profile:1030} running\n\tUserInfo{0:Owner:c13} running\n";
        assert_eq!(parse_user_list(out), vec![UserSerial(0), UserSerial(10)]);
    }

    #[test]
    fn activity_components_skip_metadata_lines() {
        let out = "priority=0 preferredOrder=0 match=0x108000\n\
                   com.android.settings/.Settings\n\
                   com.example.app/com.example.app.MainActivity\n\
                   com.android.settings/.Settings\n";
        let activities = parse_activity_components(out);
        assert_eq!(activities.len(), 2);
        assert_eq!(activities[0].package_name, "com.android.settings");
        assert_eq!(activities[1].component, "com.example.app/com.example.app.MainActivity");
    }

    #[test]
    fn refusal_maps_to_permission_denied() {
        let output = ShellOutput {
            status: 255,
            stdout: String::new(),
            stderr: "java.lang.SecurityException: Injecting input events requires".into(),
        };
        assert!(matches!(
            check(output, "input tap 1 1"),
            Err(DriverError::PermissionDenied(_))
        ));
    }
}
