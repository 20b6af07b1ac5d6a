//! `Rollcall` Core Library
//!
//! Shared functionality for `Rollcall` components:
//! - Wire codec for the poll-only attendance terminal protocol
//! - Configuration resolution and hierarchy
//! - `SQLite` pool helpers and the shared database error
//! - Common error types

pub mod config;
pub mod db;
pub mod error;
pub mod tracing_init;
pub mod wire;

pub use config::Config;
pub use error::{Error, Result};
