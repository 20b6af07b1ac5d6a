use async_trait::async_trait;
use tracing::info;

use super::{DirectoryError, Notifier};
use crate::storage::AttendanceRecord;

/// Notifier that only writes the event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn attendance_recorded(&self, record: &AttendanceRecord) -> Result<(), DirectoryError> {
        info!(
            tenant_id = %record.tenant_id,
            person_id = record.person_id,
            date = %record.date,
            check_in_time = record.check_in_time.as_deref().unwrap_or("-"),
            status = %record.status,
            "Attendance recorded"
        );
        Ok(())
    }
}
