use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::NaiveDateTime;
use rollcall_core::wire::{CommandPayload, CommandType, TIME_FORMAT};
use serde::Deserialize;
use tracing::info;

use super::{AdminError, Tenant};
use crate::app::AppState;
use crate::queue::{PRIORITY_HIGH, PRIORITY_NORMAL};
use crate::storage::{Command, CommandStatus, Device, SyncStatus};
use crate::sync::ReconcileReport;

const DEFAULT_COMMAND_LIMIT: u32 = 100;

#[derive(Debug, Deserialize)]
pub struct RegisterDevice {
    serial_number: String,
    name: String,
}

pub async fn register(
    State(state): State<AppState>,
    tenant: Tenant,
    Json(req): Json<RegisterDevice>,
) -> Result<(StatusCode, Json<Device>), AdminError> {
    let serial = req.serial_number.trim();
    if serial.is_empty() {
        return Err(AdminError::BadRequest("serial_number is required".into()));
    }

    let device = state
        .db
        .create_device(serial, req.name.trim(), &tenant.0)
        .await
        .map_err(|e| {
            if e.is_conflict() {
                AdminError::Conflict(format!("serial number {serial} is already registered"))
            } else {
                e.into()
            }
        })?;

    info!(device_id = device.id, serial = %device.serial_number, tenant_id = %tenant.0, "Device registered");
    Ok((StatusCode::CREATED, Json(device)))
}

pub async fn list(
    State(state): State<AppState>,
    tenant: Tenant,
) -> Result<Json<Vec<Device>>, AdminError> {
    Ok(Json(state.db.list_devices(&tenant.0).await?))
}

pub async fn get(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<i64>,
) -> Result<Json<Device>, AdminError> {
    Ok(Json(tenant.device(&state, id).await?))
}

pub async fn deactivate(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<i64>,
) -> Result<StatusCode, AdminError> {
    tenant.device(&state, id).await?;
    if state.db.deactivate_device(id).await? {
        info!(device_id = id, "Device deactivated");
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct CommandFilter {
    status: Option<String>,
    limit: Option<u32>,
}

pub async fn list_commands(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<i64>,
    Query(filter): Query<CommandFilter>,
) -> Result<Json<Vec<Command>>, AdminError> {
    tenant.device(&state, id).await?;
    let status = filter
        .status
        .as_deref()
        .map(str::parse::<CommandStatus>)
        .transpose()
        .map_err(AdminError::BadRequest)?;
    let limit = filter.limit.unwrap_or(DEFAULT_COMMAND_LIMIT);
    Ok(Json(state.queue.list(id, status, limit).await?))
}

pub async fn stale_commands(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Command>>, AdminError> {
    tenant.device(&state, id).await?;
    Ok(Json(state.queue.stale(Some(id), state.stale_command_secs).await?))
}

/// Operator command. Enrollment commands are owned by the sync service and
/// cannot be queued by hand.
#[derive(Debug, Deserialize)]
pub struct NewCommand {
    #[serde(rename = "type")]
    kind: CommandType,
    /// `YYYY-MM-DD HH:MM:SS`, required for `set_time`.
    time: Option<String>,
}

pub async fn enqueue_command(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<i64>,
    Json(req): Json<NewCommand>,
) -> Result<(StatusCode, Json<Command>), AdminError> {
    let device = tenant.device(&state, id).await?;
    if !device.is_active {
        return Err(AdminError::Conflict(format!("device {id} is deactivated")));
    }

    let (payload, priority) = match req.kind {
        CommandType::Restart => (CommandPayload::Restart, PRIORITY_HIGH),
        CommandType::ClearLogs => (CommandPayload::ClearLogs, PRIORITY_NORMAL),
        CommandType::GetTime => (CommandPayload::GetTime, PRIORITY_NORMAL),
        CommandType::SetTime => {
            let raw = req
                .time
                .as_deref()
                .ok_or_else(|| AdminError::BadRequest("time is required for set_time".into()))?;
            let time = NaiveDateTime::parse_from_str(raw.trim(), TIME_FORMAT)
                .map_err(|_| AdminError::BadRequest(format!("invalid time: {raw}")))?;
            (CommandPayload::SetTime(time), PRIORITY_HIGH)
        }
        CommandType::Enroll | CommandType::Remove | CommandType::BatchEnroll => {
            return Err(AdminError::BadRequest(format!(
                "{} commands are issued by enrollment sync",
                req.kind
            )));
        }
    };

    let command = state.queue.enqueue(id, &payload, priority).await?;
    Ok((StatusCode::CREATED, Json(command)))
}

pub async fn sync_status(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<i64>,
) -> Result<Json<Vec<SyncStatus>>, AdminError> {
    tenant.device(&state, id).await?;
    Ok(Json(state.db.list_sync_status(id).await?))
}

pub async fn reconcile(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<i64>,
) -> Result<Json<ReconcileReport>, AdminError> {
    let device = tenant.device(&state, id).await?;
    if !device.is_active {
        return Err(AdminError::Conflict(format!("device {id} is deactivated")));
    }
    Ok(Json(state.sync.reconcile_device(&device).await?))
}
