//! `SQLite` storage for the Rollcall server.
//!
//! Provides persistence for devices, the per-device command queue, PIN
//! mappings, sync status, attendance records, and the local person/settings
//! mirror. Functions taking a `&mut SqliteConnection` are meant to run inside
//! a caller's transaction.

mod db;
mod models;
mod queries_attendance;
mod queries_commands;
mod queries_devices;
mod queries_directory;
mod queries_enrollment;


pub use db::{DatabaseError, RollcallDatabase};
pub use models::*;
pub use queries_attendance::NewAttendance;
pub use queries_commands::{attach_command_persons, insert_command};
pub use queries_enrollment::{
    SyncUpdate, acquire_device_lock, delete_mapping, get_mapping, get_mapping_by_pin,
    insert_mapping, insert_mappings, max_pin, set_sync_status,
};
