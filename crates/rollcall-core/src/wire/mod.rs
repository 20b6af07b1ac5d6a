//! Wire format of the poll-only attendance terminal protocol.
//!
//! Everything here is pure text processing: command strings the server hands
//! to a terminal, upload bodies the terminal posts back, confirmation bodies,
//! and the handshake block. No I/O.

pub mod command;
pub mod confirm;
pub mod handshake;
pub mod upload;

pub use command::{CommandPayload, CommandType, DecodedCommand, UserRecord, decode, encode};
pub use confirm::{Confirmation, parse_confirmation, parse_confirmations};
pub use handshake::render_handshake;
pub use upload::{DeviceUser, ScanEvent, UploadBatch, parse_attendance, parse_user_records};

/// Literal acknowledgment the terminal expects from every endpoint.
pub const ACK: &str = "OK";

/// Timestamp layout used by terminals in both directions.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors produced while decoding terminal text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("missing `C:<id>:` command prefix")]
    MissingPrefix,

    #[error("invalid command id: {0:?}")]
    InvalidId(String),

    #[error("unknown command body: {0:?}")]
    UnknownCommand(String),

    #[error("missing field {0}")]
    MissingField(&'static str),

    #[error("invalid value for {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },

    #[error("invalid timestamp: {0:?}")]
    InvalidTimestamp(String),

    #[error("expected at least {expected} fields, got {got}")]
    TooFewFields { expected: usize, got: usize },
}

/// Iterate `key=value` pairs of a tab-separated record.
///
/// Segments without `=` are skipped.
pub(crate) fn tab_fields(record: &str) -> impl Iterator<Item = (&str, &str)> {
    record
        .split('\t')
        .filter_map(|seg| seg.split_once('='))
        .map(|(k, v)| (k.trim(), v.trim_end_matches(['\r', '\n'])))
}
