//! PIN mapping, device lock and sync status queries.

use rollcall_core::db::unix_timestamp;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use super::db::{DatabaseError, RollcallDatabase};
use super::models::{PersonDeviceMapping, SyncState, SyncStatus};

/// Take the device-scoped allocation lock for the rest of the transaction.
///
/// Must be the first statement of the transaction: the write takes the
/// database write lock before any read, so concurrent allocators for the
/// same device queue here and see each other's committed PINs. Released by
/// commit or rollback.
pub async fn acquire_device_lock(
    conn: &mut SqliteConnection,
    device_id: i64,
) -> Result<(), DatabaseError> {
    sqlx::query(
        r"
        INSERT INTO device_locks (device_id, generation) VALUES (?, 1)
        ON CONFLICT (device_id) DO UPDATE SET generation = generation + 1
        ",
    )
    .bind(device_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn get_mapping(
    conn: &mut SqliteConnection,
    device_id: i64,
    person_id: i64,
) -> Result<Option<PersonDeviceMapping>, DatabaseError> {
    let mapping = sqlx::query_as::<_, PersonDeviceMapping>(
        "SELECT * FROM person_device_mappings WHERE device_id = ? AND person_id = ?",
    )
    .bind(device_id)
    .bind(person_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(mapping)
}

pub async fn get_mapping_by_pin(
    conn: &mut SqliteConnection,
    device_id: i64,
    pin: i64,
) -> Result<Option<PersonDeviceMapping>, DatabaseError> {
    let mapping = sqlx::query_as::<_, PersonDeviceMapping>(
        "SELECT * FROM person_device_mappings WHERE device_id = ? AND pin = ?",
    )
    .bind(device_id)
    .bind(pin)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(mapping)
}

/// Highest PIN in use on a device, `0` when none.
pub async fn max_pin(conn: &mut SqliteConnection, device_id: i64) -> Result<i64, DatabaseError> {
    let max: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(pin), 0) FROM person_device_mappings WHERE device_id = ?",
    )
    .bind(device_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(max)
}

pub async fn insert_mapping(
    conn: &mut SqliteConnection,
    device_id: i64,
    person_id: i64,
    pin: i64,
) -> Result<PersonDeviceMapping, DatabaseError> {
    let mapping = sqlx::query_as::<_, PersonDeviceMapping>(
        r"
        INSERT INTO person_device_mappings (device_id, person_id, pin, created_at)
        VALUES (?, ?, ?, ?)
        RETURNING *
        ",
    )
    .bind(device_id)
    .bind(person_id)
    .bind(pin)
    .bind(unix_timestamp())
    .fetch_one(&mut *conn)
    .await?;

    Ok(mapping)
}

/// Insert several `(person_id, pin)` mappings in one statement.
pub async fn insert_mappings(
    conn: &mut SqliteConnection,
    device_id: i64,
    mappings: &[(i64, i64)],
) -> Result<(), DatabaseError> {
    if mappings.is_empty() {
        return Ok(());
    }

    let now = unix_timestamp();
    let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
        "INSERT INTO person_device_mappings (device_id, person_id, pin, created_at) ",
    );
    builder.push_values(mappings, |mut row, (person_id, pin)| {
        row.push_bind(device_id)
            .push_bind(*person_id)
            .push_bind(*pin)
            .push_bind(now);
    });
    builder.build().execute(&mut *conn).await?;

    Ok(())
}

pub async fn delete_mapping(
    conn: &mut SqliteConnection,
    device_id: i64,
    person_id: i64,
) -> Result<bool, DatabaseError> {
    let result =
        sqlx::query("DELETE FROM person_device_mappings WHERE device_id = ? AND person_id = ?")
            .bind(device_id)
            .bind(person_id)
            .execute(&mut *conn)
            .await?;

    Ok(result.rows_affected() > 0)
}

/// How a sync status row should change.
#[derive(Debug, Clone, Copy)]
pub struct SyncUpdate<'a> {
    pub state: SyncState,
    /// Keeps the stored PIN when `None`.
    pub pin: Option<i64>,
    pub error: Option<&'a str>,
    /// Counts this write as a delivery attempt (stamps `last_attempt_at`).
    pub attempt: bool,
}

impl SyncUpdate<'_> {
    pub const fn attempt(state: SyncState, pin: Option<i64>) -> Self {
        Self {
            state,
            pin,
            error: None,
            attempt: true,
        }
    }
}

/// Upsert the sync status of one person on one device. The retry counter is
/// left alone; see [`RollcallDatabase::bump_sync_retry`].
pub async fn set_sync_status(
    conn: &mut SqliteConnection,
    device_id: i64,
    person_id: i64,
    update: &SyncUpdate<'_>,
) -> Result<(), DatabaseError> {
    let now = unix_timestamp();
    let attempted_at = update.attempt.then_some(now);

    sqlx::query(
        r"
        INSERT INTO device_sync_status
            (device_id, person_id, status, pin, retry_count, last_attempt_at, last_error, updated_at)
        VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?7)
        ON CONFLICT (device_id, person_id) DO UPDATE SET
            status = excluded.status,
            pin = COALESCE(excluded.pin, device_sync_status.pin),
            last_attempt_at = COALESCE(excluded.last_attempt_at, device_sync_status.last_attempt_at),
            last_error = excluded.last_error,
            updated_at = excluded.updated_at
        ",
    )
    .bind(device_id)
    .bind(person_id)
    .bind(update.state.as_str())
    .bind(update.pin)
    .bind(attempted_at)
    .bind(update.error)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

impl RollcallDatabase {
    /// All PIN mappings of a device, by PIN.
    pub async fn list_mappings(
        &self,
        device_id: i64,
    ) -> Result<Vec<PersonDeviceMapping>, DatabaseError> {
        let mappings = sqlx::query_as::<_, PersonDeviceMapping>(
            "SELECT * FROM person_device_mappings WHERE device_id = ? ORDER BY pin ASC",
        )
        .bind(device_id)
        .fetch_all(self.pool())
        .await?;

        Ok(mappings)
    }

    /// Resolve a terminal-local PIN to its mapping.
    pub async fn find_mapping_by_pin(
        &self,
        device_id: i64,
        pin: i64,
    ) -> Result<Option<PersonDeviceMapping>, DatabaseError> {
        let mut conn = self.pool().acquire().await?;
        get_mapping_by_pin(&mut conn, device_id, pin).await
    }

    /// Devices a person currently holds a PIN on.
    pub async fn list_person_mappings(
        &self,
        person_id: i64,
    ) -> Result<Vec<PersonDeviceMapping>, DatabaseError> {
        let mappings = sqlx::query_as::<_, PersonDeviceMapping>(
            "SELECT * FROM person_device_mappings WHERE person_id = ? ORDER BY device_id ASC",
        )
        .bind(person_id)
        .fetch_all(self.pool())
        .await?;

        Ok(mappings)
    }

    /// Every sync status row of a device.
    pub async fn list_sync_status(&self, device_id: i64) -> Result<Vec<SyncStatus>, DatabaseError> {
        let rows = sqlx::query_as::<_, SyncStatus>(
            "SELECT * FROM device_sync_status WHERE device_id = ? ORDER BY person_id ASC",
        )
        .bind(device_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }

    pub async fn get_sync_status(
        &self,
        device_id: i64,
        person_id: i64,
    ) -> Result<Option<SyncStatus>, DatabaseError> {
        let row = sqlx::query_as::<_, SyncStatus>(
            "SELECT * FROM device_sync_status WHERE device_id = ? AND person_id = ?",
        )
        .bind(device_id)
        .bind(person_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row)
    }

    /// Count one more re-drive of a failed row.
    pub async fn bump_sync_retry(&self, device_id: i64, person_id: i64) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE device_sync_status SET retry_count = retry_count + 1 WHERE device_id = ? AND person_id = ?",
        )
        .bind(device_id)
        .bind(person_id)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Upsert a sync status row outside of any larger transaction.
    pub async fn update_sync_status(
        &self,
        device_id: i64,
        person_id: i64,
        update: &SyncUpdate<'_>,
    ) -> Result<(), DatabaseError> {
        let mut conn = self.pool().acquire().await?;
        set_sync_status(&mut conn, device_id, person_id, update).await
    }
}
