//! Terminal-facing poll protocol.
//!
//! Terminals cannot be reached; they poll. Each poll is independent:
//! - `GET /cdata?options=all` fetches the handshake block
//! - `POST /cdata?table=..` uploads scans or user records
//! - `GET /getrequest` takes at most one queued command
//! - `POST /devicecmd` reports command results
//!
//! Every route answers plain text and never a server error; protocol noise
//! is logged and acknowledged.

mod device;
mod handlers;
mod query;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};

pub use device::DeviceContext;

use crate::app::AppState;

/// Wire routes, served at the root and under `/iclock`.
pub fn routes(state: AppState) -> Router<AppState> {
    let body_limit = state.protocol.max_body_bytes;
    let wire = Router::new()
        .route("/cdata", get(handlers::cdata_get).post(handlers::cdata_post))
        .route("/getrequest", get(handlers::get_request))
        .route("/devicecmd", post(handlers::device_cmd))
        .route_layer(from_fn_with_state(state, device::resolve_device))
        .layer(DefaultBodyLimit::max(body_limit));

    Router::new().merge(wire.clone()).nest("/iclock", wire)
}
