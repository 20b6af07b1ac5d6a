//! `SQLite` database for the Rollcall server.

pub use rollcall_core::db::DatabaseError;

rollcall_core::define_database!(RollcallDatabase, "Rollcall database migrations complete");

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_in_memory_runs_migrations() {
        let db = RollcallDatabase::open_in_memory().await.unwrap();
        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE '\\_%' ESCAPE '\\' ORDER BY name",
        )
        .fetch_all(db.pool())
        .await
        .unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        for expected in [
            "attendance_records",
            "command_persons",
            "device_commands",
            "device_locks",
            "device_sync_status",
            "devices",
            "person_device_mappings",
            "persons",
            "tenant_settings",
        ] {
            assert!(names.contains(&expected), "missing table {expected}");
        }
    }
}
