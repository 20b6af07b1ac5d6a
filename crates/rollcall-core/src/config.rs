//! Configuration resolution for Rollcall.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Config file (`--config`, or `~/.config/rollcall/settings.json`)
//! 3. Environment variables (`ROLLCALL_*`)
//! 4. CLI arguments (applied by the binary, highest priority)

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::tracing_init::LogFormat;

/// Complete Rollcall configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub attendance: AttendanceDefaults,
}

/// Process-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub database_path: Option<PathBuf>,
    pub max_connections: u32,
    /// How long a writer waits on the `SQLite` write lock (seconds).
    pub busy_timeout_secs: u64,
    pub log_level: String,
    pub log_format: LogFormat,
    /// A device not heard from for this long is marked offline (seconds).
    pub offline_after_secs: i64,
    /// Interval of the presence sweep (seconds).
    pub presence_sweep_secs: u64,
    /// A `sent` command without confirmation for this long is reported stale.
    pub stale_command_secs: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            database_path: None,
            max_connections: 5,
            busy_timeout_secs: 5,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            offline_after_secs: 300,
            presence_sweep_secs: 60,
            stale_command_secs: 3600,
        }
    }
}

/// Values advertised to terminals in the handshake block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Server identity reported as `ServerVer`.
    pub server_version: String,
    /// Seconds between command polls.
    pub delay_secs: u32,
    /// Seconds to wait before retrying after a network error.
    pub error_delay_secs: u32,
    /// Minutes between scheduled batch uploads.
    pub trans_interval_mins: u32,
    /// Fixed upload windows, `HH:MM` entries joined by `;`.
    pub trans_times: String,
    /// Hours offset the terminal should assume.
    pub timezone: i32,
    /// Push each scan as it happens instead of waiting for a window.
    pub realtime: bool,
    /// Largest upload body read from a terminal. Larger bodies are
    /// acknowledged and dropped.
    pub max_body_bytes: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            server_version: format!("rollcall/{}", env!("CARGO_PKG_VERSION")),
            delay_secs: 30,
            error_delay_secs: 60,
            trans_interval_mins: 1,
            trans_times: "00:00;14:05".to_string(),
            timezone: 0,
            realtime: true,
            max_body_bytes: 32 * 1024 * 1024,
        }
    }
}

/// Reconciliation job settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub interval_secs: u64,
    pub run_on_start: bool,
    /// Failed enrollments are re-driven until this many attempts.
    pub max_retries: i64,
    /// Upper bound of user records in one batch enroll command.
    pub batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: 2 * 60 * 60,
            run_on_start: true,
            max_retries: 3,
            batch_size: 50,
        }
    }
}

/// Attendance policy used for tenants without their own settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttendanceDefaults {
    /// `HH:MM` or `HH:MM:SS`.
    pub opening_time: String,
    pub grace_minutes: i64,
}

impl Default for AttendanceDefaults {
    fn default() -> Self {
        Self {
            opening_time: "08:00".to_string(),
            grace_minutes: 15,
        }
    }
}

/// Load configuration with hierarchical resolution.
///
/// An explicit `path` must exist; the global file is optional.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(p) => load_config_file(p)?,
        None => match global_config_path() {
            Some(global) if global.exists() => load_config_file(&global)?,
            _ => Config::default(),
        },
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs_config_home().map(|p| p.join("rollcall").join("settings.json"))
}

/// Default location of the server database.
pub fn database_path() -> Option<PathBuf> {
    std::env::var("XDG_DATA_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join(".local").join("share"))
        })
        .map(|p| p.join("rollcall").join("rollcall.db"))
}

fn dirs_config_home() -> Option<PathBuf> {
    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn apply_env_overrides(config: &mut Config) {
    if let Some(addr) = env_parse("ROLLCALL_ADDR") {
        config.server.addr = addr;
    }
    if let Ok(val) = std::env::var("ROLLCALL_DB_PATH") {
        config.server.database_path = Some(PathBuf::from(val));
    }
    if let Ok(val) = std::env::var("ROLLCALL_LOG_LEVEL") {
        config.server.log_level = val;
    }
    if let Some(format) = env_parse("ROLLCALL_LOG_FORMAT") {
        config.server.log_format = format;
    }
    if let Some(n) = env_parse("ROLLCALL_SYNC_INTERVAL_SECS") {
        config.sync.interval_secs = n;
    }
    if let Some(n) = env_parse("ROLLCALL_SYNC_MAX_RETRIES") {
        config.sync.max_retries = n;
    }
    if let Some(n) = env_parse("ROLLCALL_POLL_DELAY_SECS") {
        config.protocol.delay_secs = n;
    }
    if let Some(n) = env_parse("ROLLCALL_TIMEZONE") {
        config.protocol.timezone = n;
    }
}
