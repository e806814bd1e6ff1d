//! Enumerates and launches apps across every user profile on the device.

use super::Reporter;
use crate::common::UserSerial;
use crate::error::DriverError;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

/// Appended to labels of apps installed in a non-primary profile.
pub const PROFILE_LABEL_SUFFIX: &str = " (secondary profile)";

/// Package names are dotted identifiers: ASCII letters, digits, `_` and `.`.
pub fn is_package_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// `package/class`, where the class may be relative (`.Main`) or nested (`Outer$Inner`).
pub fn is_component_name(component: &str) -> bool {
    match component.split_once('/') {
        Some((package, class)) => {
            is_package_name(package)
                && !class.is_empty()
                && class
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$'))
        }
        None => false,
    }
}

/// The unique key of an installed app instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AppIdentity {
    pub package_name: String,
    pub user_serial: UserSerial,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledApp {
    #[serde(flatten)]
    pub identity: AppIdentity,
    pub label: String,
}

/// A launcher-visible activity inside one profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchableActivity {
    pub package_name: String,
    pub label: String,
    /// `package/class` component name.
    pub component: String,
}

/// Platform view of user profiles and their launchable activities.
#[async_trait]
pub trait ProfileCatalog: Send + Sync {
    /// Serials of every profile known to the platform, primary first.
    async fn profiles(&self) -> Result<Vec<UserSerial>, DriverError>;

    /// Launchable activities visible to `profile`, optionally narrowed to one
    /// package.
    async fn launchable_activities(
        &self,
        profile: UserSerial,
        package: Option<&str>,
    ) -> Result<Vec<LaunchableActivity>, DriverError>;

    /// Starts the main activity `component` inside `profile`.
    async fn start_activity(&self, profile: UserSerial, component: &str) -> Result<(), DriverError>;
}

/// Application launcher driver.
pub struct AppLauncher {
    catalog: Box<dyn ProfileCatalog>,
    reporter: Reporter,
}

impl AppLauncher {
    pub fn new(catalog: Box<dyn ProfileCatalog>, reporter: Reporter) -> Self {
        Self { catalog, reporter }
    }

    /// Lists every launchable app in every profile.
    ///
    /// A profile whose activities cannot be read is skipped with a warning;
    /// failing to read the profile list itself is an error.
    pub async fn list_installed_apps(&self) -> Result<Vec<InstalledApp>, DriverError> {
        let profiles = match self.catalog.profiles().await {
            Ok(profiles) => profiles,
            Err(e) => {
                self.reporter.error(format!("listing profiles failed: {e}")).await;
                return Err(e);
            }
        };

        let mut apps = Vec::new();
        for serial in profiles {
            let activities = match self.catalog.launchable_activities(serial, None).await {
                Ok(activities) => activities,
                Err(e) => {
                    warn!("Skipping profile {}: {}", serial, e);
                    self.reporter
                        .warning(format!("apps of profile {serial} unavailable: {e}"))
                        .await;
                    continue;
                }
            };
            debug!("Profile {} has {} launchable activities", serial, activities.len());
            apps.extend(activities.into_iter().map(|activity| InstalledApp {
                label: profile_label(&activity.label, serial),
                identity: AppIdentity {
                    package_name: activity.package_name,
                    user_serial: serial,
                },
            }));
        }
        Ok(apps)
    }

    /// Launches `package` inside the profile with serial `user_serial`.
    ///
    /// Never falls back to another profile: an unknown serial or a package
    /// without a launchable activity in that profile is reported and nothing
    /// is started.
    pub async fn launch(&self, package: &str, user_serial: UserSerial) -> Result<(), DriverError> {
        let result = self.try_launch(package, user_serial).await;
        match &result {
            Ok(()) => {
                self.reporter
                    .success(format!("launched {package} for user {user_serial}"))
                    .await
            }
            Err(DriverError::TargetNotFound(what)) => {
                self.reporter.error(format!("launch of {package} skipped: {what}")).await;
                self.reporter.toast(&format!("Cannot launch {package}: {what}"));
            }
            Err(e) => {
                self.reporter.error(format!("launch of {package} failed: {e}")).await;
                self.reporter.toast(&format!("Launch failed: {e}"));
            }
        }
        result
    }

    async fn try_launch(&self, package: &str, user_serial: UserSerial) -> Result<(), DriverError> {
        if !is_package_name(package) {
            return Err(DriverError::TargetNotFound(format!(
                "'{package}' is not a valid package name"
            )));
        }
        let profiles = self.catalog.profiles().await?;
        if !profiles.contains(&user_serial) {
            return Err(DriverError::TargetNotFound(format!(
                "no user profile with serial {user_serial}"
            )));
        }
        let activities = self
            .catalog
            .launchable_activities(user_serial, Some(package))
            .await?;
        let activity = activities
            .into_iter()
            .find(|activity| activity.package_name == package)
            .ok_or_else(|| {
                DriverError::TargetNotFound(format!(
                    "{package} has no launchable activity for user {user_serial}"
                ))
            })?;
        self.catalog
            .start_activity(user_serial, &activity.component)
            .await
    }
}

fn profile_label(label: &str, serial: UserSerial) -> String {
    if serial.is_primary() {
        label.to_string()
    } else {
        format!("{label}{PROFILE_LABEL_SUFFIX}")
    }
}
