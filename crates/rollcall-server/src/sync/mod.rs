//! Enrollment reconciliation.
//!
//! Compares who should be on each terminal (active, card-bearing persons of
//! the device's tenant) with what the sync status table says is there or on
//! its way, and queues the enroll and removal commands that close the gap.
//! Failed deliveries are re-driven a bounded number of times.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use rollcall_core::config::SyncConfig;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::allocator::{AllocError, EnrollTarget, PinAllocator};
use crate::directory::{DirectoryError, PersonDirectory};
use crate::storage::{DatabaseError, Device, RollcallDatabase, SyncState, SyncStatus, SyncUpdate};

/// What one device reconciliation did.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ReconcileReport {
    pub device_id: i64,
    /// Persons newly queued for enrollment.
    pub enrolled: usize,
    /// Persons queued for removal.
    pub removed: usize,
    /// Failed rows re-driven this run.
    pub retried: usize,
    /// Failed rows left alone because they ran out of retries.
    pub exhausted: usize,
    /// Commands queued in total.
    pub commands: usize,
}

impl ReconcileReport {
    const fn is_noop(&self) -> bool {
        self.commands == 0 && self.exhausted == 0
    }
}

pub struct SyncService {
    db: RollcallDatabase,
    allocator: PinAllocator,
    directory: Arc<dyn PersonDirectory>,
    config: SyncConfig,
}

impl SyncService {
    pub fn new(
        db: RollcallDatabase,
        allocator: PinAllocator,
        directory: Arc<dyn PersonDirectory>,
        config: SyncConfig,
    ) -> Self {
        Self {
            db,
            allocator,
            directory,
            config,
        }
    }

    /// Reconcile every active device. A failing device is logged and
    /// skipped so one bad terminal cannot stall the rest.
    pub async fn run_once(&self) -> Result<Vec<ReconcileReport>, SyncError> {
        let devices = self.db.list_active_devices().await?;
        let mut reports = Vec::with_capacity(devices.len());

        for device in &devices {
            match self.reconcile_device(device).await {
                Ok(report) => reports.push(report),
                Err(e) => warn!(device_id = device.id, error = %e, "Device reconciliation failed"),
            }
        }

        let commands: usize = reports.iter().map(|r| r.commands).sum();
        info!(devices = devices.len(), commands, "Reconciliation pass complete");
        Ok(reports)
    }

    #[instrument(skip(self, device), fields(device_id = device.id, tenant_id = %device.tenant_id))]
    pub async fn reconcile_device(&self, device: &Device) -> Result<ReconcileReport, SyncError> {
        let expected: HashMap<i64, EnrollTarget> = self
            .directory
            .list_enrollable(&device.tenant_id)
            .await?
            .iter()
            .filter_map(EnrollTarget::from_person)
            .map(|t| (t.person_id, t))
            .collect();
        let rows = self.db.list_sync_status(device.id).await?;

        let actual: HashSet<i64> = rows
            .iter()
            .filter(|r| r.state().is_some_and(|s| s.counts_as_enrolled()))
            .map(|r| r.person_id)
            .collect();
        let failed: Vec<&SyncStatus> = rows
            .iter()
            .filter(|r| r.state() == Some(SyncState::Failed))
            .collect();
        let failed_ids: HashSet<i64> = failed.iter().map(|r| r.person_id).collect();

        let mut report = ReconcileReport {
            device_id: device.id,
            ..ReconcileReport::default()
        };

        let mut missing: Vec<EnrollTarget> = expected
            .values()
            .filter(|t| !actual.contains(&t.person_id) && !failed_ids.contains(&t.person_id))
            .cloned()
            .collect();
        missing.sort_by_key(|t| t.person_id);
        for chunk in missing.chunks(self.config.batch_size.max(1)) {
            if let [single] = chunk {
                self.allocator.allocate(device.id, single).await?;
            } else {
                self.allocator.allocate_batch(device.id, chunk).await?;
            }
            report.enrolled += chunk.len();
            report.commands += 1;
        }

        let mut extra: Vec<&SyncStatus> = rows
            .iter()
            .filter(|r| actual.contains(&r.person_id) && !expected.contains_key(&r.person_id))
            .collect();
        extra.sort_by_key(|r| r.person_id);
        for row in extra {
            if self.remove(device.id, row).await? {
                report.commands += 1;
            }
            report.removed += 1;
        }

        for row in failed {
            if row.retry_count >= self.config.max_retries {
                report.exhausted += 1;
                continue;
            }
            let queued = match expected.get(&row.person_id) {
                Some(target) => {
                    self.allocator.allocate(device.id, target).await?;
                    true
                }
                None => self.remove(device.id, row).await?,
            };
            self.db.bump_sync_retry(device.id, row.person_id).await?;
            report.retried += 1;
            report.commands += usize::from(queued);
        }

        if report.is_noop() {
            debug!("Device already in sync");
        } else {
            info!(
                enrolled = report.enrolled,
                removed = report.removed,
                retried = report.retried,
                exhausted = report.exhausted,
                commands = report.commands,
                "Device reconciled"
            );
        }
        Ok(report)
    }

    /// Take a person off one device. Returns whether a command was queued.
    async fn remove(&self, device_id: i64, row: &SyncStatus) -> Result<bool, SyncError> {
        match self.allocator.deallocate(device_id, row.person_id).await {
            Ok(_) => Ok(true),
            Err(AllocError::NotMapped { .. }) => match row.pin {
                Some(pin) => match self.allocator.remove_unmapped(device_id, row.person_id, pin).await {
                    Ok(_) => Ok(true),
                    Err(AllocError::Conflict(reason)) => {
                        warn!(device_id, person_id = row.person_id, %reason, "Removal skipped");
                        self.mark_deleted(device_id, row.person_id).await?;
                        Ok(false)
                    }
                    Err(e) => Err(e.into()),
                },
                None => {
                    // Nothing was ever delivered under a known PIN.
                    self.mark_deleted(device_id, row.person_id).await?;
                    Ok(false)
                }
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn mark_deleted(&self, device_id: i64, person_id: i64) -> Result<(), DatabaseError> {
        self.db
            .update_sync_status(
                device_id,
                person_id,
                &SyncUpdate::attempt(SyncState::Deleted, None),
            )
            .await
    }

    /// Person created or updated: push the current record to every active
    /// terminal of the tenant. A person without a card is taken off instead.
    #[instrument(skip(self))]
    pub async fn enroll_person(&self, tenant_id: &str, person_id: i64) -> Result<usize, SyncError> {
        let person = self
            .directory
            .find_by_id(tenant_id, person_id)
            .await?
            .ok_or(SyncError::PersonNotFound(person_id))?;
        let Some(target) = EnrollTarget::from_person(&person) else {
            debug!("Person has no card, removing from terminals");
            return self.remove_person(tenant_id, person_id).await;
        };

        let devices = self.db.list_active_tenant_devices(tenant_id).await?;
        for device in &devices {
            self.allocator.allocate(device.id, &target).await?;
        }
        info!(devices = devices.len(), "Person enrollment queued");
        Ok(devices.len())
    }

    /// Person deactivated or deleted: release their PIN on every terminal
    /// of the tenant that holds one.
    #[instrument(skip(self))]
    pub async fn remove_person(&self, tenant_id: &str, person_id: i64) -> Result<usize, SyncError> {
        let devices = self.db.list_active_tenant_devices(tenant_id).await?;
        let mut queued = 0;
        for device in &devices {
            match self.allocator.deallocate(device.id, person_id).await {
                Ok(_) => queued += 1,
                Err(AllocError::NotMapped { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        info!(commands = queued, "Person removal queued");
        Ok(queued)
    }

    /// Run [`Self::run_once`] every `interval_secs`, first immediately when
    /// `run_on_start` is set.
    pub fn spawn_scheduler(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(self.config.interval_secs.max(1)));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            if !self.config.run_on_start {
                interval.tick().await;
            }
            loop {
                interval.tick().await;
                if let Err(e) = self.run_once().await {
                    warn!(error = %e, "Reconciliation pass failed");
                }
            }
        })
    }
}

/// Reconciliation errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Person {0} not found")]
    PersonNotFound(i64),

    #[error(transparent)]
    Alloc(#[from] AllocError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests;
