//! On-time versus late classification.

use chrono::{NaiveTime, TimeDelta, Timelike};
use serde::{Deserialize, Serialize};

use rollcall_core::config::AttendanceDefaults;

use super::DirectoryError;
use crate::storage::{AttendanceStatus, TenantSettings};

const TIME_FORMATS: [&str; 2] = ["%H:%M:%S", "%H:%M"];

/// Longest accepted grace window: a whole day.
pub const MAX_GRACE_MINUTES: i64 = 24 * 60;

/// Opening time plus a grace window, in terminal local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendancePolicy {
    pub opening_time: NaiveTime,
    pub grace_minutes: i64,
}

impl AttendancePolicy {
    pub fn new(opening_time: &str, grace_minutes: i64) -> Result<Self, DirectoryError> {
        if !(0..=MAX_GRACE_MINUTES).contains(&grace_minutes) {
            return Err(DirectoryError::InvalidSetting(format!(
                "grace minutes must be between 0 and {MAX_GRACE_MINUTES}, got {grace_minutes}"
            )));
        }
        Ok(Self {
            opening_time: parse_time(opening_time)?,
            grace_minutes,
        })
    }

    pub fn from_defaults(defaults: &AttendanceDefaults) -> Result<Self, DirectoryError> {
        Self::new(&defaults.opening_time, defaults.grace_minutes)
    }

    pub fn from_settings(settings: &TenantSettings) -> Result<Self, DirectoryError> {
        Self::new(&settings.opening_time, settings.grace_minutes)
    }

    /// Present up to and including opening + grace, late afterwards.
    pub fn status_for(&self, check_in: NaiveTime) -> AttendanceStatus {
        // A grace that does not fit a time delta covers the whole day.
        let Some(grace) = TimeDelta::try_minutes(self.grace_minutes) else {
            return AttendanceStatus::Present;
        };
        let (deadline, wrapped) = self.opening_time.overflowing_add_signed(grace);
        // A window running past midnight covers the rest of the day.
        if wrapped != 0 || check_in <= deadline {
            AttendanceStatus::Present
        } else {
            AttendanceStatus::Late
        }
    }

    /// `HH:MM`, or `HH:MM:SS` when the opening time carries seconds.
    pub fn opening_time_text(&self) -> String {
        let format = if self.opening_time.second() == 0 {
            "%H:%M"
        } else {
            "%H:%M:%S"
        };
        self.opening_time.format(format).to_string()
    }
}

fn parse_time(raw: &str) -> Result<NaiveTime, DirectoryError> {
    let raw = raw.trim();
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| DirectoryError::InvalidSetting(format!("invalid opening time: {raw}")))
}
