//! Command queue queries.
//!
//! The queue lives only in `device_commands`; claiming is a single
//! conditional `UPDATE .. RETURNING`, so exclusivity holds across any number
//! of server processes sharing the database.

use rollcall_core::db::unix_timestamp;
use rollcall_core::wire::{self, CommandPayload, CommandType};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use super::db::{DatabaseError, RollcallDatabase};
use super::models::{Command, CommandPerson, CommandStatus};

/// Reserve a row id, render the command string with it, store the string.
///
/// Run inside a transaction: the placeholder row (empty `command`) must never
/// be visible to a claiming poll.
pub async fn insert_command(
    conn: &mut SqliteConnection,
    device_id: i64,
    payload: &CommandPayload,
    priority: i64,
) -> Result<Command, DatabaseError> {
    let id: i64 = sqlx::query_scalar(
        r"
        INSERT INTO device_commands (device_id, command_type, command, priority, status, created_at)
        VALUES (?, ?, '', ?, 'pending', ?)
        RETURNING id
        ",
    )
    .bind(device_id)
    .bind(payload.command_type().as_str())
    .bind(priority)
    .bind(unix_timestamp())
    .fetch_one(&mut *conn)
    .await?;

    let command = sqlx::query_as::<_, Command>(
        "UPDATE device_commands SET command = ? WHERE id = ? RETURNING *",
    )
    .bind(wire::encode(id, payload))
    .bind(id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(command)
}

/// Record which persons a command acts on, as `(person_id, pin)` pairs.
pub async fn attach_command_persons(
    conn: &mut SqliteConnection,
    command_id: i64,
    persons: &[(i64, i64)],
) -> Result<(), DatabaseError> {
    if persons.is_empty() {
        return Ok(());
    }

    let mut builder: QueryBuilder<'_, Sqlite> =
        QueryBuilder::new("INSERT INTO command_persons (command_id, person_id, pin) ");
    builder.push_values(persons, |mut row, (person_id, pin)| {
        row.push_bind(command_id).push_bind(*person_id).push_bind(*pin);
    });
    builder.build().execute(&mut *conn).await?;

    Ok(())
}

impl RollcallDatabase {
    /// Atomically take the next pending command of a device and mark it sent.
    ///
    /// Order is priority descending, then insertion order. Enrollment rows
    /// of the persons it carries move from `pending` to `sent`.
    pub async fn claim_next_command(
        &self,
        device_id: i64,
    ) -> Result<Option<Command>, DatabaseError> {
        let now = unix_timestamp();
        let mut tx = self.pool().begin().await?;

        let claimed = sqlx::query_as::<_, Command>(
            r"
            UPDATE device_commands
            SET status = 'sent', sent_at = ?
            WHERE id = (
                SELECT id FROM device_commands
                WHERE device_id = ? AND status = 'pending' AND command <> ''
                ORDER BY priority DESC, id ASC
                LIMIT 1
            )
            AND status = 'pending'
            RETURNING *
            ",
        )
        .bind(now)
        .bind(device_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(command) = &claimed
            && command.kind().is_some_and(|k| k.is_enrollment())
        {
            sqlx::query(
                r"
                UPDATE device_sync_status
                SET status = 'sent', updated_at = ?
                WHERE device_id = ? AND status = 'pending'
                  AND person_id IN (SELECT person_id FROM command_persons WHERE command_id = ?)
                ",
            )
            .bind(now)
            .bind(device_id)
            .bind(command.id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(claimed)
    }

    /// Move a non-terminal command of `device_id` to `completed` or `failed`
    /// and fold the outcome into the sync status of its persons.
    ///
    /// Returns `None` when the id is unknown, belongs to another device, or
    /// the command already reached a terminal state.
    pub async fn finish_command(
        &self,
        device_id: i64,
        command_id: i64,
        outcome: CommandStatus,
        error_message: Option<&str>,
    ) -> Result<Option<Command>, DatabaseError> {
        debug_assert!(outcome.is_terminal());
        let now = unix_timestamp();
        let mut tx = self.pool().begin().await?;

        let finished = sqlx::query_as::<_, Command>(
            r"
            UPDATE device_commands
            SET status = ?, completed_at = ?, error_message = ?
            WHERE id = ? AND device_id = ? AND status IN ('pending', 'sent')
            RETURNING *
            ",
        )
        .bind(outcome.as_str())
        .bind(now)
        .bind(error_message)
        .bind(command_id)
        .bind(device_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(command) = finished else {
            tx.rollback().await?;
            return Ok(None);
        };

        let enrollment = command.kind().is_some_and(|k| k.is_enrollment());
        let removal = command.kind() == Some(CommandType::Remove);
        match outcome {
            CommandStatus::Completed if enrollment => {
                sqlx::query(
                    r"
                    UPDATE device_sync_status
                    SET status = 'synced', retry_count = 0, last_error = NULL, updated_at = ?1
                    WHERE device_id = ?2 AND status <> 'deleted'
                      AND person_id IN (SELECT person_id FROM command_persons WHERE command_id = ?3)
                    ",
                )
                .bind(now)
                .bind(device_id)
                .bind(command.id)
                .execute(&mut *tx)
                .await?;
            }
            CommandStatus::Failed if enrollment || removal => {
                // A failed enrollment never overrides a later removal decision;
                // a failed removal only applies to rows still marked deleted.
                let guard = if removal {
                    "status = 'deleted'"
                } else {
                    "status <> 'deleted'"
                };
                sqlx::query(&format!(
                    r"
                    UPDATE device_sync_status
                    SET status = 'failed', last_error = ?1, updated_at = ?2
                    WHERE device_id = ?3 AND {guard}
                      AND person_id IN (SELECT person_id FROM command_persons WHERE command_id = ?4)
                    "
                ))
                .bind(error_message)
                .bind(now)
                .bind(device_id)
                .bind(command.id)
                .execute(&mut *tx)
                .await?;
            }
            _ => {}
        }

        tx.commit().await?;
        Ok(Some(command))
    }

    /// Get a command by ID.
    pub async fn get_command(&self, id: i64) -> Result<Command, DatabaseError> {
        sqlx::query_as::<_, Command>("SELECT * FROM device_commands WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Command {id}")))
    }

    /// Commands of a device, newest first.
    pub async fn list_commands(
        &self,
        device_id: i64,
        status: Option<CommandStatus>,
        limit: u32,
    ) -> Result<Vec<Command>, DatabaseError> {
        let commands = if let Some(status) = status {
            sqlx::query_as::<_, Command>(
                "SELECT * FROM device_commands WHERE device_id = ? AND status = ? ORDER BY id DESC LIMIT ?",
            )
            .bind(device_id)
            .bind(status.as_str())
            .bind(limit)
            .fetch_all(self.pool())
            .await?
        } else {
            sqlx::query_as::<_, Command>(
                "SELECT * FROM device_commands WHERE device_id = ? ORDER BY id DESC LIMIT ?",
            )
            .bind(device_id)
            .bind(limit)
            .fetch_all(self.pool())
            .await?
        };

        Ok(commands)
    }

    /// `sent` commands never confirmed, sent before `cutoff`.
    pub async fn list_stale_sent_commands(
        &self,
        device_id: Option<i64>,
        cutoff: i64,
    ) -> Result<Vec<Command>, DatabaseError> {
        let commands = sqlx::query_as::<_, Command>(
            r"
            SELECT * FROM device_commands
            WHERE status = 'sent' AND sent_at < ?1 AND (?2 IS NULL OR device_id = ?2)
            ORDER BY sent_at ASC
            ",
        )
        .bind(cutoff)
        .bind(device_id)
        .fetch_all(self.pool())
        .await?;

        Ok(commands)
    }

    /// Count a device's commands in one status.
    pub async fn count_commands(
        &self,
        device_id: i64,
        status: CommandStatus,
    ) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM device_commands WHERE device_id = ? AND status = ?",
        )
        .bind(device_id)
        .bind(status.as_str())
        .fetch_one(self.pool())
        .await?;

        Ok(row.0)
    }

    /// Persons a command targets.
    pub async fn get_command_persons(
        &self,
        command_id: i64,
    ) -> Result<Vec<CommandPerson>, DatabaseError> {
        let persons = sqlx::query_as::<_, CommandPerson>(
            "SELECT * FROM command_persons WHERE command_id = ? ORDER BY pin ASC",
        )
        .bind(command_id)
        .fetch_all(self.pool())
        .await?;

        Ok(persons)
    }
}
