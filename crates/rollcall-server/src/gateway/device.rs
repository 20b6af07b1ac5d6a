//! Device resolution for the wire endpoints.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use rollcall_core::wire::ACK;
use tracing::{debug, warn};

use super::query::WireQuery;
use crate::app::AppState;
use crate::storage::Device;

/// The registered terminal behind the current request.
#[derive(Debug, Clone)]
pub struct DeviceContext {
    pub device: Device,
}

/// Resolve `SN=` to an active device and attach it as [`DeviceContext`].
///
/// Unknown and revoked terminals get 401. A storage failure still answers
/// with the ack so the terminal does not retry in a tight loop.
pub async fn resolve_device(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let query = WireQuery::from_uri(req.uri());
    let Some(serial) = query.serial().map(str::to_string) else {
        debug!(uri = %req.uri(), "Request without serial number rejected");
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let device = match state.resolver.resolve(&serial).await {
        Ok(Some(device)) if device.is_active => device,
        Ok(Some(_)) => {
            warn!(serial = %serial, "Request from deactivated device rejected");
            return StatusCode::UNAUTHORIZED.into_response();
        }
        Ok(None) => {
            warn!(serial = %serial, "Request from unregistered device rejected");
            return StatusCode::UNAUTHORIZED.into_response();
        }
        Err(e) => {
            warn!(serial = %serial, error = %e, "Device lookup failed");
            return ACK.into_response();
        }
    };

    if let Err(e) = state.db.mark_device_seen(device.id).await {
        warn!(device_id = device.id, error = %e, "Failed to record device presence");
    }

    req.extensions_mut().insert(DeviceContext { device });
    next.run(req).await
}
