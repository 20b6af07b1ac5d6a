//! Terminal-local PIN assignment.
//!
//! Every allocation runs in one transaction that starts by taking the
//! device's lock row, so concurrent allocators for the same terminal are
//! serialized by the database and `max(pin) + 1` never hands out a PIN twice.
//! The enroll or removal command is queued in the same transaction, so a
//! mapping never exists without the command that delivers it.

use std::collections::HashSet;

use rollcall_core::wire::{CommandPayload, UserRecord};
use sqlx::SqliteConnection;
use tracing::{debug, info, instrument, warn};

use crate::queue::PRIORITY_NORMAL;
use crate::storage::{
    Command, DatabaseError, Person, RollcallDatabase, SyncState, SyncUpdate, acquire_device_lock,
    attach_command_persons, delete_mapping, get_mapping, get_mapping_by_pin, insert_command, insert_mapping,
    insert_mappings, max_pin, set_sync_status,
};

/// A person to put on a terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollTarget {
    pub person_id: i64,
    pub name: String,
    pub card: String,
}

impl EnrollTarget {
    pub fn new(person_id: i64, name: impl Into<String>, card: impl Into<String>) -> Self {
        Self {
            person_id,
            name: name.into(),
            card: card.into(),
        }
    }

    /// `None` for persons without a card, who cannot be enrolled.
    pub fn from_person(person: &Person) -> Option<Self> {
        let card = person.card_id.as_deref().filter(|c| !c.is_empty())?;
        Some(Self::new(person.id, person.name.clone(), card))
    }

    fn record(&self, pin: i64) -> UserRecord {
        UserRecord::new(pin, &self.name, &self.card)
    }
}

#[derive(Debug, Clone)]
pub struct Allocation {
    pub person_id: i64,
    pub pin: i64,
    /// The person already held this PIN on the device.
    pub reused: bool,
    pub command: Command,
}

#[derive(Debug, Clone)]
pub struct BatchAllocation {
    /// `(person_id, pin)` in target order.
    pub assignments: Vec<(i64, i64)>,
    /// PINs handed out by this call, ascending.
    pub new_pins: Vec<i64>,
    pub command: Command,
}

#[derive(Debug, Clone)]
pub struct Deallocation {
    pub person_id: i64,
    pub pin: i64,
    pub command: Command,
}

/// Collision-free PIN allocation per device.
#[derive(Clone)]
pub struct PinAllocator {
    db: RollcallDatabase,
}

impl PinAllocator {
    pub const fn new(db: RollcallDatabase) -> Self {
        Self { db }
    }

    /// Give `target` a PIN on `device_id` (reusing one it already holds) and
    /// queue its enroll command.
    #[instrument(skip(self, target), fields(person_id = target.person_id))]
    pub async fn allocate(
        &self,
        device_id: i64,
        target: &EnrollTarget,
    ) -> Result<Allocation, AllocError> {
        match self.try_allocate(device_id, target).await {
            Err(DatabaseError::Conflict(reason)) => {
                // Another caller mapped the same person between our read and
                // insert; the second attempt sees that mapping and reuses it.
                debug!(device_id, %reason, "Allocation conflict, retrying once");
                self.try_allocate(device_id, target)
                    .await
                    .map_err(AllocError::from_retry)
            }
            other => other.map_err(AllocError::from),
        }
    }

    async fn try_allocate(
        &self,
        device_id: i64,
        target: &EnrollTarget,
    ) -> Result<Allocation, DatabaseError> {
        let mut tx = self.db.pool().begin().await?;
        acquire_device_lock(&mut tx, device_id).await?;

        let existing = get_mapping(&mut tx, device_id, target.person_id).await?;
        let (pin, reused) = match existing {
            Some(mapping) => (mapping.pin, true),
            None => {
                let pin = max_pin(&mut tx, device_id).await? + 1;
                insert_mapping(&mut tx, device_id, target.person_id, pin).await?;
                (pin, false)
            }
        };

        let command = queue_enroll(
            &mut tx,
            device_id,
            CommandPayload::Enroll(target.record(pin)),
            &[(target.person_id, pin)],
        )
        .await?;
        tx.commit().await?;

        info!(device_id, person_id = target.person_id, pin, reused, "PIN allocated");
        Ok(Allocation {
            person_id: target.person_id,
            pin,
            reused,
            command,
        })
    }

    /// Allocate PINs for many persons under one lock and deliver them in a
    /// single batch command. Persons already mapped keep their PIN; the rest
    /// get contiguous PINs above the device's current maximum.
    #[instrument(skip(self, targets), fields(count = targets.len()))]
    pub async fn allocate_batch(
        &self,
        device_id: i64,
        targets: &[EnrollTarget],
    ) -> Result<BatchAllocation, AllocError> {
        let mut seen = HashSet::new();
        let targets: Vec<&EnrollTarget> =
            targets.iter().filter(|t| seen.insert(t.person_id)).collect();
        if targets.is_empty() {
            return Err(AllocError::EmptyBatch);
        }

        let mut tx = self.db.pool().begin().await.map_err(DatabaseError::from)?;
        acquire_device_lock(&mut tx, device_id).await?;

        let mut next_pin = max_pin(&mut tx, device_id).await? + 1;
        let mut assignments = Vec::with_capacity(targets.len());
        let mut fresh = Vec::new();
        for target in &targets {
            let pin = match get_mapping(&mut tx, device_id, target.person_id).await? {
                Some(mapping) => mapping.pin,
                None => {
                    let pin = next_pin;
                    next_pin += 1;
                    fresh.push((target.person_id, pin));
                    pin
                }
            };
            assignments.push((target.person_id, pin));
        }
        insert_mappings(&mut tx, device_id, &fresh).await?;

        let records = targets
            .iter()
            .zip(&assignments)
            .map(|(target, (_, pin))| target.record(*pin))
            .collect();
        let command = queue_enroll(
            &mut tx,
            device_id,
            CommandPayload::enroll_all(records),
            &assignments,
        )
        .await?;
        tx.commit().await.map_err(DatabaseError::from)?;

        let new_pins: Vec<i64> = fresh.iter().map(|(_, pin)| *pin).collect();
        info!(
            device_id,
            command_id = command.id,
            persons = assignments.len(),
            new = new_pins.len(),
            "Batch PINs allocated"
        );
        Ok(BatchAllocation {
            assignments,
            new_pins,
            command,
        })
    }

    /// Drop a person's PIN on a device and queue its removal.
    #[instrument(skip(self))]
    pub async fn deallocate(
        &self,
        device_id: i64,
        person_id: i64,
    ) -> Result<Deallocation, AllocError> {
        let mut tx = self.db.pool().begin().await.map_err(DatabaseError::from)?;
        acquire_device_lock(&mut tx, device_id).await?;

        let Some(mapping) = get_mapping(&mut tx, device_id, person_id).await? else {
            tx.rollback().await.map_err(DatabaseError::from)?;
            return Err(AllocError::NotMapped {
                device_id,
                person_id,
            });
        };

        delete_mapping(&mut tx, device_id, person_id).await?;
        let command = queue_removal(&mut tx, device_id, person_id, mapping.pin).await?;
        tx.commit().await.map_err(DatabaseError::from)?;

        info!(device_id, person_id, pin = mapping.pin, "PIN released");
        Ok(Deallocation {
            person_id,
            pin: mapping.pin,
            command,
        })
    }

    /// Queue removal of a PIN the server no longer maps, as remembered by
    /// the person's sync status.
    pub async fn remove_unmapped(
        &self,
        device_id: i64,
        person_id: i64,
        pin: i64,
    ) -> Result<Command, AllocError> {
        let mut tx = self.db.pool().begin().await.map_err(DatabaseError::from)?;
        acquire_device_lock(&mut tx, device_id).await?;

        if let Some(holder) = get_mapping_by_pin(&mut tx, device_id, pin).await?
            && holder.person_id != person_id
        {
            // The PIN was handed to someone else since; deleting it would
            // take that person off the terminal.
            tx.rollback().await.map_err(DatabaseError::from)?;
            warn!(device_id, person_id, pin, holder = holder.person_id, "PIN reused, removal skipped");
            return Err(AllocError::Conflict(format!(
                "PIN {pin} on device {device_id} now belongs to person {}",
                holder.person_id
            )));
        }

        let command = queue_removal(&mut tx, device_id, person_id, pin).await?;
        tx.commit().await.map_err(DatabaseError::from)?;
        Ok(command)
    }
}

async fn queue_enroll(
    conn: &mut SqliteConnection,
    device_id: i64,
    payload: CommandPayload,
    persons: &[(i64, i64)],
) -> Result<Command, DatabaseError> {
    let command = insert_command(conn, device_id, &payload, PRIORITY_NORMAL).await?;
    attach_command_persons(conn, command.id, persons).await?;
    for (person_id, pin) in persons {
        set_sync_status(
            conn,
            device_id,
            *person_id,
            &SyncUpdate::attempt(SyncState::Pending, Some(*pin)),
        )
        .await?;
    }
    Ok(command)
}

async fn queue_removal(
    conn: &mut SqliteConnection,
    device_id: i64,
    person_id: i64,
    pin: i64,
) -> Result<Command, DatabaseError> {
    let command =
        insert_command(conn, device_id, &CommandPayload::Remove { pin }, PRIORITY_NORMAL).await?;
    attach_command_persons(conn, command.id, &[(person_id, pin)]).await?;
    set_sync_status(
        conn,
        device_id,
        person_id,
        &SyncUpdate::attempt(SyncState::Deleted, Some(pin)),
    )
    .await?;
    Ok(command)
}

/// PIN allocation errors.
#[derive(Debug, thiserror::Error)]
pub enum AllocError {
    #[error("Person {person_id} has no PIN on device {device_id}")]
    NotMapped { device_id: i64, person_id: i64 },

    #[error("PIN conflict: {0}")]
    Conflict(String),

    #[error("Batch allocation needs at least one person")]
    EmptyBatch,

    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),
}

impl AllocError {
    fn from_retry(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Conflict(reason) => Self::Conflict(reason),
            other => Self::Storage(other),
        }
    }
}
