//! Device registry queries.

use rollcall_core::db::unix_timestamp;

use super::db::{DatabaseError, RollcallDatabase};
use super::models::Device;

impl RollcallDatabase {
    /// Register a terminal. Serial numbers are unique across tenants.
    pub async fn create_device(
        &self,
        serial_number: &str,
        name: &str,
        tenant_id: &str,
    ) -> Result<Device, DatabaseError> {
        let now = unix_timestamp();

        let device = sqlx::query_as::<_, Device>(
            r"
            INSERT INTO devices (serial_number, name, tenant_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING *
            ",
        )
        .bind(serial_number)
        .bind(name)
        .bind(tenant_id)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool())
        .await?;

        Ok(device)
    }

    /// Get a device by ID.
    pub async fn get_device(&self, id: i64) -> Result<Device, DatabaseError> {
        sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Device {id}")))
    }

    /// Look a device up by the serial number it presents on every poll.
    pub async fn get_device_by_serial(
        &self,
        serial_number: &str,
    ) -> Result<Option<Device>, DatabaseError> {
        let device = sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE serial_number = ?")
            .bind(serial_number)
            .fetch_optional(self.pool())
            .await?;

        Ok(device)
    }

    /// List a tenant's devices, active and inactive.
    pub async fn list_devices(&self, tenant_id: &str) -> Result<Vec<Device>, DatabaseError> {
        let devices = sqlx::query_as::<_, Device>(
            "SELECT * FROM devices WHERE tenant_id = ? ORDER BY id ASC",
        )
        .bind(tenant_id)
        .fetch_all(self.pool())
        .await?;

        Ok(devices)
    }

    /// Every active device across tenants.
    pub async fn list_active_devices(&self) -> Result<Vec<Device>, DatabaseError> {
        let devices =
            sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE is_active = 1 ORDER BY id ASC")
                .fetch_all(self.pool())
                .await?;

        Ok(devices)
    }

    /// Active devices of one tenant.
    pub async fn list_active_tenant_devices(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<Device>, DatabaseError> {
        let devices = sqlx::query_as::<_, Device>(
            "SELECT * FROM devices WHERE tenant_id = ? AND is_active = 1 ORDER BY id ASC",
        )
        .bind(tenant_id)
        .fetch_all(self.pool())
        .await?;

        Ok(devices)
    }

    /// Revoke a device. The row stays for history.
    pub async fn deactivate_device(&self, id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE devices SET is_active = 0, is_online = 0, updated_at = ? WHERE id = ? AND is_active = 1",
        )
        .bind(unix_timestamp())
        .bind(id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record that a device just polled.
    pub async fn mark_device_seen(&self, id: i64) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE devices SET last_seen = ?, is_online = 1 WHERE id = ?")
            .bind(unix_timestamp())
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    /// Flip devices silent since before `cutoff` to offline.
    pub async fn mark_silent_devices_offline(&self, cutoff: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE devices SET is_online = 0 WHERE is_online = 1 AND (last_seen IS NULL OR last_seen < ?)",
        )
        .bind(cutoff)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected())
    }
}
