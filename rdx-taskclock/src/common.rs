//! Contains common, primitive types shared across the crate.
//!
//! This module defines the key types used to identify registered triggers,
//! log subscribers, and one-shot timers, plus the user-profile serial used by
//! the application launcher. Using distinct types keeps a trigger handle from
//! being passed where a subscriber handle is expected.

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::fmt;

new_key_type! {
    /// Uniquely and safely identifies a trigger registered with the scheduler.
    ///
    /// Keys are never reused, so a stale `TriggerId` kept by the shell after
    /// removal cannot accidentally address a newer trigger.
    pub struct TriggerId;

    /// Identifies a callback registered with the `LogStore`.
    pub struct SubscriberId;

    /// Identifies a pending one-shot timer created with `schedule_once`.
    pub struct TimerId;
}

/// Serial number of a user profile on the device.
///
/// Serial `0` is the primary user. Work profiles and secondary users get their
/// own serial and their own installed-app instance space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserSerial(pub u64);

impl UserSerial {
    pub const PRIMARY: UserSerial = UserSerial(0);

    pub fn is_primary(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for UserSerial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
