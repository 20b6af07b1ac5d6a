//! Attendance ingestion.
//!
//! Turns raw `/cdata` upload bodies into attendance records: one record per
//! person per day, first scan wins, status from the tenant's policy.

use std::sync::Arc;

use chrono::NaiveDateTime;
use rollcall_core::wire::{self, ScanEvent};
use tracing::{debug, info, instrument, warn};

use crate::directory::{AttendancePolicy, DirectoryError, Notifier, PersonDirectory, SettingsStore};
use crate::storage::{
    DatabaseError, Device, NewAttendance, RollcallDatabase, SyncState, SyncUpdate,
    acquire_device_lock, get_mapping, get_mapping_by_pin, insert_mapping, set_sync_status,
};

/// Counters for one attendance upload.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub recorded: usize,
    pub duplicates: usize,
    /// Scans whose PIN matched no person.
    pub unresolved: usize,
    pub malformed: usize,
    /// Scans that hit a storage error and were dropped.
    pub failed: usize,
    pub operation_logs: usize,
}

/// Counters for one user-table upload.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AdoptReport {
    pub seen: usize,
    pub adopted: usize,
    pub already_known: usize,
    pub unknown: usize,
}

/// What happened when linking a terminal PIN to a person.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkOutcome {
    Created,
    /// The PIN already belongs to this person.
    Existing,
    /// The PIN belongs to someone else by now.
    PinTaken { holder: i64 },
    /// The person is on the terminal under a different PIN.
    PersonMapped { pin: i64 },
}

pub struct AttendanceIngestor {
    db: RollcallDatabase,
    directory: Arc<dyn PersonDirectory>,
    settings: Arc<dyn SettingsStore>,
    notifier: Arc<dyn Notifier>,
}

impl AttendanceIngestor {
    pub fn new(
        db: RollcallDatabase,
        directory: Arc<dyn PersonDirectory>,
        settings: Arc<dyn SettingsStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            db,
            directory,
            settings,
            notifier,
        }
    }

    /// Ingest an `ATTLOG` body. Individual bad lines never fail the upload.
    #[instrument(skip(self, device, body), fields(device_id = device.id))]
    pub async fn ingest(&self, device: &Device, body: &str) -> Result<IngestReport, IngestError> {
        let batch = wire::parse_attendance(body);
        let mut report = IngestReport {
            malformed: batch.malformed.len(),
            operation_logs: batch.operation_logs,
            ..IngestReport::default()
        };
        for bad in &batch.malformed {
            debug!(line = bad.line_no, error = %bad.error, "Malformed attendance line skipped");
        }
        if batch.events.is_empty() {
            return Ok(report);
        }

        let policy = self.settings.attendance_policy(&device.tenant_id).await?;

        for event in &batch.events {
            match self.record_scan(device, &policy, event).await {
                Ok(Scan::Recorded) => report.recorded += 1,
                Ok(Scan::Duplicate) => report.duplicates += 1,
                Ok(Scan::Unresolved) => {
                    report.unresolved += 1;
                    warn!(pin = %event.pin, "Scan for unknown PIN dropped");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(pin = %event.pin, error = %e, "Failed to record scan");
                }
            }
        }

        info!(
            recorded = report.recorded,
            duplicates = report.duplicates,
            unresolved = report.unresolved,
            malformed = report.malformed,
            failed = report.failed,
            "Attendance upload ingested"
        );
        Ok(report)
    }

    async fn record_scan(
        &self,
        device: &Device,
        policy: &AttendancePolicy,
        event: &ScanEvent,
    ) -> Result<Scan, IngestError> {
        let Some(person_id) = self.resolve_pin(device, &event.pin).await? else {
            return Ok(Scan::Unresolved);
        };

        let (date, time) = split_timestamp(event.timestamp);
        let inserted = self
            .db
            .insert_attendance(&NewAttendance {
                tenant_id: &device.tenant_id,
                person_id,
                date: &date,
                check_in_time: Some(&time),
                status: policy.status_for(event.timestamp.time()),
                device_id: Some(device.id),
                notes: None,
            })
            .await?;

        let Some(record) = inserted else {
            debug!(person_id, %date, "Repeat scan of the day ignored");
            return Ok(Scan::Duplicate);
        };

        if let Err(e) = self.notifier.attendance_recorded(&record).await {
            warn!(person_id, error = %e, "Attendance notification failed");
        }
        Ok(Scan::Recorded)
    }

    /// Resolve a terminal PIN to a person of the device's tenant.
    ///
    /// Falls back to reading the PIN as a person id, for terminals enrolled
    /// by hand with ids as PINs; the mapping is then created on the fly.
    async fn resolve_pin(&self, device: &Device, raw_pin: &str) -> Result<Option<i64>, IngestError> {
        let Ok(pin) = raw_pin.trim().parse::<i64>() else {
            return Ok(None);
        };

        if let Some(mapping) = self.db.find_mapping_by_pin(device.id, pin).await? {
            return Ok(Some(mapping.person_id));
        }

        let Some(person) = self.directory.find_by_id(&device.tenant_id, pin).await? else {
            return Ok(None);
        };

        match self.link(device.id, person.id, pin).await? {
            LinkOutcome::Created => {
                info!(device_id = device.id, person_id = person.id, pin, "Mapping adopted from scan");
                Ok(Some(person.id))
            }
            LinkOutcome::Existing => Ok(Some(person.id)),
            LinkOutcome::PinTaken { holder } => Ok(Some(holder)),
            LinkOutcome::PersonMapped { pin: mapped } => {
                debug!(person_id = person.id, pin, mapped, "Person already mapped under another PIN");
                Ok(Some(person.id))
            }
        }
    }

    /// Adopt users reported in an `OPERLOG`/`USERINFO` upload: a terminal
    /// user the server has no mapping for is linked to the person holding
    /// the same card.
    #[instrument(skip(self, device, body), fields(device_id = device.id))]
    pub async fn adopt_users(&self, device: &Device, body: &str) -> Result<AdoptReport, IngestError> {
        let users = wire::parse_user_records(body);
        let mut report = AdoptReport {
            seen: users.len(),
            ..AdoptReport::default()
        };

        for user in &users {
            if self.db.find_mapping_by_pin(device.id, user.pin).await?.is_some() {
                report.already_known += 1;
                continue;
            }
            let Some(card) = user.card.as_deref() else {
                report.unknown += 1;
                continue;
            };
            let Some(person) = self.directory.find_by_card(&device.tenant_id, card).await? else {
                report.unknown += 1;
                continue;
            };

            match self.link(device.id, person.id, user.pin).await? {
                LinkOutcome::Created => report.adopted += 1,
                LinkOutcome::Existing | LinkOutcome::PersonMapped { .. } => report.already_known += 1,
                LinkOutcome::PinTaken { .. } => report.unknown += 1,
            }
        }

        if report.adopted > 0 {
            info!(adopted = report.adopted, seen = report.seen, "Terminal users adopted");
        }
        Ok(report)
    }

    /// Create a `(device, person) -> pin` mapping under the device lock and
    /// mark the person synced, since the terminal already holds the user.
    async fn link(&self, device_id: i64, person_id: i64, pin: i64) -> Result<LinkOutcome, DatabaseError> {
        let mut tx = self.db.pool().begin().await?;
        acquire_device_lock(&mut tx, device_id).await?;

        if let Some(holder) = get_mapping_by_pin(&mut tx, device_id, pin).await? {
            tx.rollback().await?;
            return Ok(if holder.person_id == person_id {
                LinkOutcome::Existing
            } else {
                LinkOutcome::PinTaken {
                    holder: holder.person_id,
                }
            });
        }
        if let Some(mapping) = get_mapping(&mut tx, device_id, person_id).await? {
            tx.rollback().await?;
            return Ok(LinkOutcome::PersonMapped { pin: mapping.pin });
        }

        insert_mapping(&mut tx, device_id, person_id, pin).await?;
        set_sync_status(
            &mut tx,
            device_id,
            person_id,
            &SyncUpdate {
                state: SyncState::Synced,
                pin: Some(pin),
                error: None,
                attempt: false,
            },
        )
        .await?;
        tx.commit().await?;
        Ok(LinkOutcome::Created)
    }
}

enum Scan {
    Recorded,
    Duplicate,
    Unresolved,
}

fn split_timestamp(ts: NaiveDateTime) -> (String, String) {
    (
        ts.date().format("%Y-%m-%d").to_string(),
        ts.time().format("%H:%M:%S").to_string(),
    )
}

/// Ingestion errors.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}
