//! Shared application state and the top-level router.

use std::sync::Arc;

use axum::Router;
use rollcall_core::Config;
use rollcall_core::config::ProtocolConfig;
use tower_http::trace::TraceLayer;

use crate::admin;
use crate::allocator::PinAllocator;
use crate::directory::{
    AttendancePolicy, DeviceResolver, DirectoryError, LogNotifier, Notifier, SettingsStore,
    SqliteDirectory,
};
use crate::gateway;
use crate::ingest::AttendanceIngestor;
use crate::queue::CommandQueue;
use crate::storage::RollcallDatabase;
use crate::sync::SyncService;

/// Everything a request handler may need. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub db: RollcallDatabase,
    pub queue: CommandQueue,
    pub ingestor: Arc<AttendanceIngestor>,
    pub sync: Arc<SyncService>,
    pub resolver: Arc<dyn DeviceResolver>,
    pub settings: Arc<dyn SettingsStore>,
    pub protocol: Arc<ProtocolConfig>,
    /// Age after which an unconfirmed `sent` command counts as stale.
    pub stale_command_secs: i64,
}

impl AppState {
    /// Wire the services together over `db` with the built-in collaborators.
    pub fn new(db: RollcallDatabase, config: &Config) -> Result<Self, DirectoryError> {
        Self::with_notifier(db, config, Arc::new(LogNotifier))
    }

    pub fn with_notifier(
        db: RollcallDatabase,
        config: &Config,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, DirectoryError> {
        let default_policy = AttendancePolicy::from_defaults(&config.attendance)?;
        let directory = Arc::new(SqliteDirectory::new(db.clone(), default_policy));

        let ingestor = AttendanceIngestor::new(
            db.clone(),
            directory.clone(),
            directory.clone(),
            notifier,
        );
        let sync = SyncService::new(
            db.clone(),
            PinAllocator::new(db.clone()),
            directory.clone(),
            config.sync.clone(),
        );

        Ok(Self {
            queue: CommandQueue::new(db.clone()),
            db,
            ingestor: Arc::new(ingestor),
            sync: Arc::new(sync),
            resolver: directory.clone(),
            settings: directory,
            protocol: Arc::new(config.protocol.clone()),
            stale_command_secs: config.server.stale_command_secs,
        })
    }
}

/// Device protocol at `/` and `/iclock`, admin API at `/api`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(gateway::routes(state.clone()))
        .nest("/api", admin::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
