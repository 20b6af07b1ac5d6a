use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use crate::allocator::AllocError;
use crate::directory::DirectoryError;
use crate::queue::QueueError;
use crate::storage::DatabaseError;
use crate::sync::SyncError;

/// Admin API errors, rendered as `{"error": ..}` with a matching status.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("missing tenant")]
    Unauthenticated,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(msg) => {
                error!(error = %msg, "Admin request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<DatabaseError> for AdminError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::Conflict(msg) => Self::Conflict(msg),
            DatabaseError::NotFound(what) => Self::NotFound(format!("{what} not found")),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<QueueError> for AdminError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::Storage(db) => db.into(),
            QueueError::EmptyBatch => Self::BadRequest(e.to_string()),
        }
    }
}

impl From<DirectoryError> for AdminError {
    fn from(e: DirectoryError) -> Self {
        match e {
            DirectoryError::Storage(db) => db.into(),
            DirectoryError::InvalidSetting(msg) => Self::BadRequest(msg),
            DirectoryError::Delivery(msg) => Self::Internal(msg),
        }
    }
}

impl From<AllocError> for AdminError {
    fn from(e: AllocError) -> Self {
        match e {
            AllocError::NotMapped { .. } => Self::NotFound(e.to_string()),
            AllocError::Conflict(msg) => Self::Conflict(msg),
            AllocError::EmptyBatch => Self::BadRequest(e.to_string()),
            AllocError::Storage(db) => db.into(),
        }
    }
}

impl From<SyncError> for AdminError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::PersonNotFound(_) => Self::NotFound(e.to_string()),
            SyncError::Alloc(e) => e.into(),
            SyncError::Directory(e) => e.into(),
            SyncError::Storage(e) => e.into(),
        }
    }
}
