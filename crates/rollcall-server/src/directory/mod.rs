//! Contracts with the systems around the attendance core.
//!
//! The core never reaches into the person directory, tenant settings,
//! notification delivery or device registry directly; it calls them through
//! these traits. [`SqliteDirectory`] backs all of them with the server's own
//! database, [`LogNotifier`] stands in for a delivery channel.

pub mod notify;
pub mod policy;
pub mod sqlite;

use async_trait::async_trait;

pub use notify::LogNotifier;
pub use policy::AttendancePolicy;
pub use sqlite::SqliteDirectory;

use crate::storage::{AttendanceRecord, DatabaseError, Device, Person};

/// Read access to the people a tenant manages.
#[async_trait]
pub trait PersonDirectory: Send + Sync {
    /// Active person of `tenant_id` holding `card`.
    async fn find_by_card(&self, tenant_id: &str, card: &str)
    -> Result<Option<Person>, DirectoryError>;

    /// Active person `person_id`, only if it belongs to `tenant_id`.
    async fn find_by_id(&self, tenant_id: &str, person_id: i64)
    -> Result<Option<Person>, DirectoryError>;

    /// Everyone who should be enrolled on the tenant's terminals.
    async fn list_enrollable(&self, tenant_id: &str) -> Result<Vec<Person>, DirectoryError>;
}

/// Per-tenant attendance configuration.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn attendance_policy(&self, tenant_id: &str) -> Result<AttendancePolicy, DirectoryError>;

    async fn set_attendance_policy(
        &self,
        tenant_id: &str,
        policy: &AttendancePolicy,
    ) -> Result<(), DirectoryError>;
}

/// Fire-and-forget delivery of attendance events.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn attendance_recorded(&self, record: &AttendanceRecord) -> Result<(), DirectoryError>;
}

/// Maps the serial number a terminal presents to a registered device.
#[async_trait]
pub trait DeviceResolver: Send + Sync {
    async fn resolve(&self, serial_number: &str) -> Result<Option<Device>, DirectoryError>;
}

/// Collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),
}
