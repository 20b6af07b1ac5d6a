use axum::Extension;
use axum::body::Bytes;
use axum::extract::State;
use axum::extract::rejection::BytesRejection;
use rollcall_core::wire::{self, ACK};
use tracing::{debug, info, warn};

use super::DeviceContext;
use super::query::WireQuery;
use crate::app::AppState;
use crate::storage::Device;

/// Upload tables a terminal may push to `/cdata`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Table {
    Attendance,
    Users,
    Other,
}

impl Table {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::to_ascii_uppercase).as_deref() {
            None | Some("ATTLOG") => Self::Attendance,
            Some("OPERLOG" | "USERINFO") => Self::Users,
            Some(_) => Self::Other,
        }
    }
}

/// `GET /cdata`: the handshake block when asked for options, else an ack.
pub async fn cdata_get(
    State(state): State<AppState>,
    Extension(ctx): Extension<DeviceContext>,
    query: WireQuery,
) -> String {
    if query.get("options").is_some_and(|o| o.eq_ignore_ascii_case("all")) {
        info!(
            device_id = ctx.device.id,
            serial = %ctx.device.serial_number,
            "Handshake"
        );
        return wire::render_handshake(&ctx.device.serial_number, &state.protocol);
    }
    ACK.to_string()
}

/// `POST /cdata`: attendance or user-table upload. Always acknowledged.
pub async fn cdata_post(
    State(state): State<AppState>,
    Extension(ctx): Extension<DeviceContext>,
    query: WireQuery,
    body: Result<Bytes, BytesRejection>,
) -> &'static str {
    let device = &ctx.device;
    let Some(body) = readable(device, body) else {
        return ACK;
    };
    let body = String::from_utf8_lossy(&body);

    match Table::parse(query.get("table")) {
        Table::Attendance => {
            if let Err(e) = state.ingestor.ingest(device, &body).await {
                warn!(device_id = device.id, error = %e, "Attendance upload not ingested");
            }
        }
        Table::Users => match state.ingestor.adopt_users(device, &body).await {
            Ok(report) => debug!(device_id = device.id, ?report, "User table processed"),
            Err(e) => warn!(device_id = device.id, error = %e, "User table not processed"),
        },
        Table::Other => {
            debug!(
                device_id = device.id,
                table = query.get("table").unwrap_or_default(),
                stamp = query.get("Stamp").unwrap_or_default(),
                bytes = body.len(),
                "Upload of unhandled table acknowledged"
            );
        }
    }
    ACK
}

/// `GET /getrequest`: hand out at most one queued command.
pub async fn get_request(
    State(state): State<AppState>,
    Extension(ctx): Extension<DeviceContext>,
) -> String {
    match state.queue.claim_next(ctx.device.id).await {
        Ok(Some(command)) => {
            info!(
                device_id = ctx.device.id,
                command_id = command.id,
                command_type = %command.command_type,
                "Command delivered"
            );
            command.command
        }
        Ok(None) => ACK.to_string(),
        Err(e) => {
            warn!(device_id = ctx.device.id, error = %e, "Command claim failed");
            ACK.to_string()
        }
    }
}

/// `POST /devicecmd`: results of previously delivered commands.
pub async fn device_cmd(
    State(state): State<AppState>,
    Extension(ctx): Extension<DeviceContext>,
    body: Result<Bytes, BytesRejection>,
) -> &'static str {
    let Some(body) = readable(&ctx.device, body) else {
        return ACK;
    };
    let body = String::from_utf8_lossy(&body);
    let (confirmations, errors) = wire::parse_confirmations(&body);
    for error in &errors {
        warn!(device_id = ctx.device.id, %error, "Unreadable confirmation line");
    }

    for confirmation in &confirmations {
        if let Err(e) = state.queue.confirm(ctx.device.id, confirmation).await {
            warn!(
                device_id = ctx.device.id,
                command_id = confirmation.command_id,
                error = %e,
                "Confirmation not applied"
            );
        }
    }
    ACK
}

/// The request body, or `None` after logging why it could not be read.
/// Terminals resend unacknowledged uploads forever, so an unreadable body
/// is still answered with the ack.
fn readable(device: &Device, body: Result<Bytes, BytesRejection>) -> Option<Bytes> {
    match body {
        Ok(body) => Some(body),
        Err(e) => {
            warn!(
                device_id = device.id,
                status = %e.status(),
                error = %e.body_text(),
                "Upload body dropped"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_are_case_insensitive() {
        assert_eq!(Table::parse(None), Table::Attendance);
        assert_eq!(Table::parse(Some("attlog")), Table::Attendance);
        assert_eq!(Table::parse(Some("OPERLOG")), Table::Users);
        assert_eq!(Table::parse(Some("userinfo")), Table::Users);
        assert_eq!(Table::parse(Some("ATTPHOTO")), Table::Other);
    }
}
