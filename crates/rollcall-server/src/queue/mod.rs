//! Per-device command queue.
//!
//! Commands are rows in `device_commands`. A terminal drains its queue one
//! command per poll; the command's own id, embedded in the wire string,
//! correlates the later confirmation.

use rollcall_core::db::unix_timestamp;
use rollcall_core::wire::{CommandPayload, Confirmation, UserRecord};
use tracing::{debug, info, warn};

use crate::storage::{
    Command, CommandStatus, DatabaseError, RollcallDatabase, insert_command,
};

/// Priority of routine commands.
pub const PRIORITY_NORMAL: i64 = 0;

/// Priority of operator commands that should jump the queue.
pub const PRIORITY_HIGH: i64 = 10;

/// Result of folding one device confirmation into the queue.
#[derive(Debug, Clone)]
pub enum ConfirmOutcome {
    Completed(Command),
    Failed(Command),
    /// Unknown id, another device's command, or already terminal.
    Ignored,
}

/// Command queue operations on top of the database.
#[derive(Clone)]
pub struct CommandQueue {
    db: RollcallDatabase,
}

impl CommandQueue {
    pub const fn new(db: RollcallDatabase) -> Self {
        Self { db }
    }

    pub const fn db(&self) -> &RollcallDatabase {
        &self.db
    }

    /// Queue one command for a device.
    pub async fn enqueue(
        &self,
        device_id: i64,
        payload: &CommandPayload,
        priority: i64,
    ) -> Result<Command, QueueError> {
        let mut tx = self.db.pool().begin().await.map_err(DatabaseError::from)?;
        let command = insert_command(&mut tx, device_id, payload, priority).await?;
        tx.commit().await.map_err(DatabaseError::from)?;

        info!(
            device_id,
            command_id = command.id,
            command_type = %command.command_type,
            priority,
            "Command queued"
        );
        Ok(command)
    }

    /// Queue a single command carrying every user record, one per line. A
    /// lone record goes out as a plain enroll.
    pub async fn enqueue_batch(
        &self,
        device_id: i64,
        users: Vec<UserRecord>,
    ) -> Result<Command, QueueError> {
        if users.is_empty() {
            return Err(QueueError::EmptyBatch);
        }
        self.enqueue(device_id, &CommandPayload::enroll_all(users), PRIORITY_NORMAL)
            .await
    }

    /// Hand the next command to a polling device, at most once.
    pub async fn claim_next(&self, device_id: i64) -> Result<Option<Command>, QueueError> {
        let claimed = self.db.claim_next_command(device_id).await?;
        if let Some(command) = &claimed {
            debug!(device_id, command_id = command.id, "Command claimed");
        }
        Ok(claimed)
    }

    /// Apply a device's result for one command.
    pub async fn confirm(
        &self,
        device_id: i64,
        confirmation: &Confirmation,
    ) -> Result<ConfirmOutcome, QueueError> {
        let (outcome, error) = if confirmation.succeeded() {
            (CommandStatus::Completed, None)
        } else {
            (CommandStatus::Failed, Some(failure_message(confirmation)))
        };

        let finished = self
            .db
            .finish_command(device_id, confirmation.command_id, outcome, error.as_deref())
            .await?;

        let Some(command) = finished else {
            warn!(
                device_id,
                command_id = confirmation.command_id,
                return_code = confirmation.return_code,
                "Confirmation for unknown, foreign or finished command ignored"
            );
            return Ok(ConfirmOutcome::Ignored);
        };

        if confirmation.succeeded() {
            info!(device_id, command_id = command.id, "Command completed");
            Ok(ConfirmOutcome::Completed(command))
        } else {
            warn!(
                device_id,
                command_id = command.id,
                return_code = confirmation.return_code,
                "Command failed on device"
            );
            Ok(ConfirmOutcome::Failed(command))
        }
    }

    pub async fn list(
        &self,
        device_id: i64,
        status: Option<CommandStatus>,
        limit: u32,
    ) -> Result<Vec<Command>, QueueError> {
        Ok(self.db.list_commands(device_id, status, limit).await?)
    }

    /// `sent` commands still unconfirmed after `older_than_secs`.
    pub async fn stale(
        &self,
        device_id: Option<i64>,
        older_than_secs: i64,
    ) -> Result<Vec<Command>, QueueError> {
        let cutoff = unix_timestamp() - older_than_secs;
        Ok(self.db.list_stale_sent_commands(device_id, cutoff).await?)
    }
}

fn failure_message(confirmation: &Confirmation) -> String {
    match &confirmation.command_name {
        Some(name) => format!("{name} returned {}", confirmation.return_code),
        None => format!("device returned {}", confirmation.return_code),
    }
}

/// Command queue errors.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),

    #[error("Batch command needs at least one user record")]
    EmptyBatch,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use rollcall_core::wire::{self, CommandType, parse_confirmation};

    async fn setup() -> (CommandQueue, i64) {
        let db = RollcallDatabase::open_in_memory().await.unwrap();
        let device = db.create_device("SN-001", "Hall", "school-1").await.unwrap();
        (CommandQueue::new(db), device.id)
    }

    #[tokio::test]
    async fn batch_is_one_command_with_one_line_per_user() {
        let (queue, device_id) = setup().await;
        let users = vec![
            UserRecord::new(1, "Ann", "C1"),
            UserRecord::new(2, "Bob", "C2"),
            UserRecord::new(3, "Cy", "C3"),
        ];

        let cmd = queue.enqueue_batch(device_id, users.clone()).await.unwrap();
        assert_eq!(cmd.command.lines().count(), 3);

        let decoded = wire::decode(&cmd.command).unwrap();
        assert_eq!(decoded.id, cmd.id);
        assert_eq!(decoded.payload, CommandPayload::BatchEnroll(users));
        assert_eq!(queue.list(device_id, None, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn batch_of_one_goes_out_as_enroll() {
        let (queue, device_id) = setup().await;
        let user = UserRecord::new(4, "Dee", "C4");

        let cmd = queue.enqueue_batch(device_id, vec![user.clone()]).await.unwrap();
        assert_eq!(cmd.kind(), Some(CommandType::Enroll));
        assert_eq!(
            wire::decode(&cmd.command).unwrap().payload,
            CommandPayload::Enroll(user)
        );
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let (queue, device_id) = setup().await;
        assert!(matches!(
            queue.enqueue_batch(device_id, Vec::new()).await,
            Err(QueueError::EmptyBatch)
        ));
    }

    #[tokio::test]
    async fn confirm_zero_completes() {
        let (queue, device_id) = setup().await;
        let cmd = queue
            .enqueue(device_id, &CommandPayload::Restart, PRIORITY_NORMAL)
            .await
            .unwrap();
        queue.claim_next(device_id).await.unwrap().unwrap();

        let line = format!("ID={}&Return=0&CMD=REBOOT", cmd.id);
        let outcome = queue
            .confirm(device_id, &parse_confirmation(&line).unwrap())
            .await
            .unwrap();
        let ConfirmOutcome::Completed(done) = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(done.status(), Some(CommandStatus::Completed));
    }

    #[tokio::test]
    async fn confirm_nonzero_fails_with_message() {
        let (queue, device_id) = setup().await;
        let cmd = queue
            .enqueue(device_id, &CommandPayload::ClearLogs, PRIORITY_NORMAL)
            .await
            .unwrap();
        queue.claim_next(device_id).await.unwrap();

        let line = format!("ID={}&Return=-1002&CMD=CLEAR", cmd.id);
        let outcome = queue
            .confirm(device_id, &parse_confirmation(&line).unwrap())
            .await
            .unwrap();
        let ConfirmOutcome::Failed(failed) = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(failed.error_message.as_deref(), Some("CLEAR returned -1002"));
    }

    #[tokio::test]
    async fn confirm_unknown_id_is_a_no_op() {
        let (queue, device_id) = setup().await;
        let cmd = queue
            .enqueue(device_id, &CommandPayload::GetTime, PRIORITY_NORMAL)
            .await
            .unwrap();

        let outcome = queue
            .confirm(device_id, &parse_confirmation("ID=424242&Return=0").unwrap())
            .await
            .unwrap();
        assert!(matches!(outcome, ConfirmOutcome::Ignored));
        assert_eq!(
            queue.db().get_command(cmd.id).await.unwrap().status(),
            Some(CommandStatus::Pending)
        );
    }

    #[tokio::test]
    async fn stale_lists_only_old_sent_commands() {
        let (queue, device_id) = setup().await;
        queue
            .enqueue(device_id, &CommandPayload::Restart, PRIORITY_HIGH)
            .await
            .unwrap();
        queue.claim_next(device_id).await.unwrap();

        assert!(queue.stale(Some(device_id), 3600).await.unwrap().is_empty());
        assert_eq!(queue.stale(None, -60).await.unwrap().len(), 1);
    }
}
