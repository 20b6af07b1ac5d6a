//! Rollcall Server
//!
//! HTTP gateway for attendance terminals plus the admin API and background
//! reconciliation.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rollcall_core::config::{self, load_config};
use rollcall_core::tracing_init::{LogFormat, init_tracing};
use tracing::info;

use rollcall_server::app::{AppState, build_router};
use rollcall_server::presence::PresenceMonitor;
use rollcall_server::storage::RollcallDatabase;

#[derive(Parser, Debug)]
#[command(name = "rollcall-server")]
#[command(
    version,
    about = "Rollcall server - attendance terminal gateway and enrollment sync"
)]
struct Args {
    /// Path to a JSON settings file.
    #[arg(long, env = "ROLLCALL_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on. Overrides the settings file.
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Path to SQLite database file.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format: pretty, compact or json.
    #[arg(long)]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }
    if let Some(path) = args.db_path {
        config.server.database_path = Some(path);
    }
    if let Some(level) = args.log_level {
        config.server.log_level = level;
    }
    if let Some(format) = args.log_format {
        config.server.log_format = format;
    }

    init_tracing(&config.server.log_level, config.server.log_format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.server.addr,
        "Starting rollcall-server"
    );

    let db_path = config
        .server
        .database_path
        .clone()
        .or_else(config::database_path)
        .ok_or_else(|| anyhow::anyhow!("Cannot determine database path"))?;
    info!(path = %db_path.display(), "Opening rollcall database");
    let db = RollcallDatabase::open(
        &db_path,
        config.server.max_connections,
        Duration::from_secs(config.server.busy_timeout_secs),
    )
    .await?;

    let state = AppState::new(db.clone(), &config)?;

    let _sync_task = Arc::clone(&state.sync).spawn_scheduler();
    let _presence_task = PresenceMonitor::new(
        db,
        state.queue.clone(),
        config.server.offline_after_secs,
        config.server.stale_command_secs,
    )
    .spawn(Duration::from_secs(config.server.presence_sweep_secs));

    let listener = tokio::net::TcpListener::bind(config.server.addr).await?;
    info!(addr = %config.server.addr, "Rollcall server listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received shutdown signal");
        })
        .await?;

    info!("Rollcall stopped");
    Ok(())
}
