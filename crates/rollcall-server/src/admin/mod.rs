//! JSON administration API.
//!
//! Authentication happens upstream; the authenticated tenant arrives in the
//! `x-tenant-id` header and scopes every request. Resources of other tenants
//! answer 403 (devices) or 404 (unknown ids).

mod attendance;
mod devices;
mod error;
mod persons;

use axum::Router;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::routing::{get, post, put};

pub use error::AdminError;

use crate::app::AppState;
use crate::storage::Device;

/// Header carrying the caller's tenant.
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Tenant of the calling administrator.
#[derive(Debug, Clone)]
pub struct Tenant(pub String);

impl<S: Send + Sync> FromRequestParts<S> for Tenant {
    type Rejection = AdminError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Self(v.to_string()))
            .ok_or(AdminError::Unauthenticated)
    }
}

impl Tenant {
    /// Load a device, refusing ones owned by another tenant.
    async fn device(&self, state: &AppState, id: i64) -> Result<Device, AdminError> {
        let device = state.db.get_device(id).await?;
        if device.tenant_id != self.0 {
            return Err(AdminError::Forbidden(format!(
                "device {id} belongs to another tenant"
            )));
        }
        Ok(device)
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/devices", get(devices::list).post(devices::register))
        .route("/devices/{id}", get(devices::get).delete(devices::deactivate))
        .route(
            "/devices/{id}/commands",
            get(devices::list_commands).post(devices::enqueue_command),
        )
        .route("/devices/{id}/commands/stale", get(devices::stale_commands))
        .route("/devices/{id}/sync-status", get(devices::sync_status))
        .route("/devices/{id}/sync", post(devices::reconcile))
        .route("/persons/{id}", put(persons::upsert).delete(persons::remove))
        .route(
            "/settings/attendance",
            get(attendance::get_policy).put(attendance::set_policy),
        )
        .route("/attendance", get(attendance::list).put(attendance::manual_entry))
}
