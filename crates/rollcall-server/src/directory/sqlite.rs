//! Collaborator implementations over the server's own database.

use async_trait::async_trait;

use super::{
    AttendancePolicy, DeviceResolver, DirectoryError, PersonDirectory, SettingsStore,
};
use crate::storage::{Device, Person, RollcallDatabase};

/// Person mirror, tenant settings and device registry in `SQLite`.
#[derive(Clone)]
pub struct SqliteDirectory {
    db: RollcallDatabase,
    /// Policy of tenants that never saved their own.
    default_policy: AttendancePolicy,
}

impl SqliteDirectory {
    pub const fn new(db: RollcallDatabase, default_policy: AttendancePolicy) -> Self {
        Self { db, default_policy }
    }
}

#[async_trait]
impl PersonDirectory for SqliteDirectory {
    async fn find_by_card(
        &self,
        tenant_id: &str,
        card: &str,
    ) -> Result<Option<Person>, DirectoryError> {
        Ok(self.db.find_person_by_card(tenant_id, card).await?)
    }

    async fn find_by_id(
        &self,
        tenant_id: &str,
        person_id: i64,
    ) -> Result<Option<Person>, DirectoryError> {
        let person = self.db.get_person(person_id).await?;
        Ok(person.filter(|p| p.is_active && p.tenant_id == tenant_id))
    }

    async fn list_enrollable(&self, tenant_id: &str) -> Result<Vec<Person>, DirectoryError> {
        Ok(self.db.list_enrollable_persons(tenant_id).await?)
    }
}

#[async_trait]
impl SettingsStore for SqliteDirectory {
    async fn attendance_policy(&self, tenant_id: &str) -> Result<AttendancePolicy, DirectoryError> {
        match self.db.get_tenant_settings(tenant_id).await? {
            Some(settings) => AttendancePolicy::from_settings(&settings),
            None => Ok(self.default_policy),
        }
    }

    async fn set_attendance_policy(
        &self,
        tenant_id: &str,
        policy: &AttendancePolicy,
    ) -> Result<(), DirectoryError> {
        self.db
            .set_tenant_settings(tenant_id, &policy.opening_time_text(), policy.grace_minutes)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DeviceResolver for SqliteDirectory {
    async fn resolve(&self, serial_number: &str) -> Result<Option<Device>, DirectoryError> {
        Ok(self.db.get_device_by_serial(serial_number).await?)
    }
}
