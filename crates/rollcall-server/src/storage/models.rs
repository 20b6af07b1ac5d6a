//! Data models for Rollcall storage.

use rollcall_core::wire::CommandType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Device {
    pub id: i64,
    pub serial_number: String,
    pub name: String,
    pub tenant_id: String,
    pub is_active: bool,
    pub is_online: bool,
    pub last_seen: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Queued command row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Command {
    pub id: i64,
    pub device_id: i64,
    pub command_type: String,
    pub command: String,
    pub priority: i64,
    pub status: String,
    pub created_at: i64,
    pub sent_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub error_message: Option<String>,
}

impl Command {
    pub fn status(&self) -> Option<CommandStatus> {
        self.status.parse().ok()
    }

    pub fn kind(&self) -> Option<CommandType> {
        self.command_type.parse().ok()
    }
}

/// Person (and PIN) targeted by a command.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CommandPerson {
    pub command_id: i64,
    pub person_id: i64,
    pub pin: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PersonDeviceMapping {
    pub device_id: i64,
    pub person_id: i64,
    pub pin: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SyncStatus {
    pub device_id: i64,
    pub person_id: i64,
    pub status: String,
    pub pin: Option<i64>,
    pub retry_count: i64,
    pub last_attempt_at: Option<i64>,
    pub last_error: Option<String>,
    pub updated_at: i64,
}

impl SyncStatus {
    pub fn state(&self) -> Option<SyncState> {
        self.status.parse().ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AttendanceRecord {
    pub id: i64,
    pub tenant_id: String,
    pub person_id: i64,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM:SS`, absent for manual absent/leave entries.
    pub check_in_time: Option<String>,
    pub status: String,
    /// `None` for manual entries.
    pub device_id: Option<i64>,
    pub notes: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Person {
    pub id: i64,
    pub tenant_id: String,
    pub name: String,
    pub card_id: Option<String>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TenantSettings {
    pub tenant_id: String,
    pub opening_time: String,
    pub grace_minutes: i64,
    pub updated_at: i64,
}

/// Lifecycle of a queued command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    Sent,
    Completed,
    Failed,
}

impl CommandStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Last known reconciliation state of one person on one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    NotSynced,
    Pending,
    Sent,
    Synced,
    Failed,
    Deleted,
}

impl SyncState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotSynced => "not_synced",
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Synced => "synced",
            Self::Failed => "failed",
            Self::Deleted => "deleted",
        }
    }

    /// States counted as "on the device, or on its way there".
    pub const fn counts_as_enrolled(&self) -> bool {
        matches!(self, Self::Pending | Self::Sent | Self::Synced)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
    Leave,
}

impl AttendanceStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Late => "late",
            Self::Absent => "absent",
            Self::Leave => "leave",
        }
    }
}

macro_rules! impl_text_enum {
    ($ty:ty, $what:literal, [$($variant:ident),+ $(,)?]) => {
        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(
                    if s == Self::$variant.as_str() {
                        return Ok(Self::$variant);
                    }
                )+
                Err(format!(concat!("unknown ", $what, ": {}"), s))
            }
        }
    };
}

impl_text_enum!(CommandStatus, "command status", [Pending, Sent, Completed, Failed]);
impl_text_enum!(
    SyncState,
    "sync state",
    [NotSynced, Pending, Sent, Synced, Failed, Deleted]
);
impl_text_enum!(AttendanceStatus, "attendance status", [Present, Late, Absent, Leave]);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn text_enums_round_trip() {
        assert_eq!("not_synced".parse::<SyncState>().unwrap(), SyncState::NotSynced);
        assert_eq!("late".parse::<AttendanceStatus>().unwrap(), AttendanceStatus::Late);
        assert_eq!(CommandStatus::Sent.to_string(), "sent");
        assert!("bogus".parse::<CommandStatus>().is_err());
    }

    #[test]
    fn only_live_states_count_as_enrolled() {
        assert!(SyncState::Pending.counts_as_enrolled());
        assert!(SyncState::Sent.counts_as_enrolled());
        assert!(SyncState::Synced.counts_as_enrolled());
        assert!(!SyncState::Failed.counts_as_enrolled());
        assert!(!SyncState::Deleted.counts_as_enrolled());
        assert!(!SyncState::NotSynced.counts_as_enrolled());
    }
}
