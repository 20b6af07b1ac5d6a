//! Rollcall Server Library
//!
//! Gateway and back office for poll-only attendance terminals:
//! - SQLite storage for devices, the command queue, PIN mappings and attendance
//! - Per-device command queue with the terminal command encoder
//! - PIN allocation and enrollment reconciliation
//! - Attendance ingestion from terminal uploads
//! - The terminal HTTP protocol and a JSON admin API

pub mod admin;
pub mod allocator;
pub mod app;
pub mod directory;
pub mod gateway;
pub mod ingest;
pub mod presence;
pub mod queue;
pub mod storage;
pub mod sync;
