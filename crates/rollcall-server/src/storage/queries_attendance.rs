//! Attendance record queries.

use rollcall_core::db::unix_timestamp;

use super::db::{DatabaseError, RollcallDatabase};
use super::models::{AttendanceRecord, AttendanceStatus};

/// Fields of an attendance record about to be written.
#[derive(Debug, Clone)]
pub struct NewAttendance<'a> {
    pub tenant_id: &'a str,
    pub person_id: i64,
    /// `YYYY-MM-DD`
    pub date: &'a str,
    /// `HH:MM:SS`
    pub check_in_time: Option<&'a str>,
    pub status: AttendanceStatus,
    pub device_id: Option<i64>,
    pub notes: Option<&'a str>,
}

impl RollcallDatabase {
    /// Insert the first record of a person's day.
    ///
    /// Returns `None` when the person already has a record for that date; the
    /// existing row is left untouched.
    pub async fn insert_attendance(
        &self,
        record: &NewAttendance<'_>,
    ) -> Result<Option<AttendanceRecord>, DatabaseError> {
        let inserted = sqlx::query_as::<_, AttendanceRecord>(
            r"
            INSERT INTO attendance_records
                (tenant_id, person_id, date, check_in_time, status, device_id, notes, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (tenant_id, person_id, date) DO NOTHING
            RETURNING *
            ",
        )
        .bind(record.tenant_id)
        .bind(record.person_id)
        .bind(record.date)
        .bind(record.check_in_time)
        .bind(record.status.as_str())
        .bind(record.device_id)
        .bind(record.notes)
        .bind(unix_timestamp())
        .fetch_optional(self.pool())
        .await?;

        Ok(inserted)
    }

    /// Write a manual entry, replacing whatever the person had that day.
    pub async fn upsert_attendance(
        &self,
        record: &NewAttendance<'_>,
    ) -> Result<AttendanceRecord, DatabaseError> {
        let row = sqlx::query_as::<_, AttendanceRecord>(
            r"
            INSERT INTO attendance_records
                (tenant_id, person_id, date, check_in_time, status, device_id, notes, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (tenant_id, person_id, date) DO UPDATE SET
                check_in_time = excluded.check_in_time,
                status = excluded.status,
                device_id = excluded.device_id,
                notes = excluded.notes
            RETURNING *
            ",
        )
        .bind(record.tenant_id)
        .bind(record.person_id)
        .bind(record.date)
        .bind(record.check_in_time)
        .bind(record.status.as_str())
        .bind(record.device_id)
        .bind(record.notes)
        .bind(unix_timestamp())
        .fetch_one(self.pool())
        .await?;

        Ok(row)
    }

    pub async fn get_attendance(
        &self,
        tenant_id: &str,
        person_id: i64,
        date: &str,
    ) -> Result<Option<AttendanceRecord>, DatabaseError> {
        let row = sqlx::query_as::<_, AttendanceRecord>(
            "SELECT * FROM attendance_records WHERE tenant_id = ? AND person_id = ? AND date = ?",
        )
        .bind(tenant_id)
        .bind(person_id)
        .bind(date)
        .fetch_optional(self.pool())
        .await?;

        Ok(row)
    }

    /// A tenant's records for one date, by check-in time.
    pub async fn list_attendance_by_date(
        &self,
        tenant_id: &str,
        date: &str,
    ) -> Result<Vec<AttendanceRecord>, DatabaseError> {
        let rows = sqlx::query_as::<_, AttendanceRecord>(
            r"
            SELECT * FROM attendance_records
            WHERE tenant_id = ? AND date = ?
            ORDER BY check_in_time IS NULL, check_in_time ASC, person_id ASC
            ",
        )
        .bind(tenant_id)
        .bind(date)
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }
}
