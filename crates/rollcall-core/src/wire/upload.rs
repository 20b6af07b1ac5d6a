//! Upload bodies posted by terminals to `/cdata`.
//!
//! Attendance uploads are newline-separated records with tab-separated
//! positional fields: `PIN`, `timestamp`, then optional event-type,
//! verify-method and work-code. Terminals mix operation-log lines into the
//! same stream; those start with `OPLOG` and are not attendance.
//!
//! User-table uploads carry `USER PIN=..\tName=..\tCard=..` records.

use chrono::NaiveDateTime;

use super::{TIME_FORMAT, WireError, tab_fields};

/// Prefix of operation-log lines interleaved with attendance.
pub const OPLOG_MARKER: &str = "OPLOG";

/// Prefix of user records in user-table uploads.
pub const USER_MARKER: &str = "USER ";

/// One scan as reported by the terminal, in terminal local time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEvent {
    /// Terminal-local PIN as sent; usually numeric but not guaranteed.
    pub pin: String,
    pub timestamp: NaiveDateTime,
    pub event_code: Option<i32>,
    pub verify_code: Option<i32>,
    pub work_code: Option<String>,
}

/// A line that could not be read as a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedLine {
    /// 1-based line number in the upload body.
    pub line_no: usize,
    pub error: WireError,
}

/// Result of splitting an attendance upload.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UploadBatch {
    pub events: Vec<ScanEvent>,
    pub operation_logs: usize,
    pub malformed: Vec<MalformedLine>,
}

/// Parse one attendance line. `Ok(None)` for blank and operation-log lines.
pub fn parse_attendance_line(line: &str) -> Result<Option<ScanEvent>, WireError> {
    let line = line.trim_end_matches('\r');
    if line.trim().is_empty() || line.trim_start().starts_with(OPLOG_MARKER) {
        return Ok(None);
    }

    let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
    if fields.len() < 2 {
        return Err(WireError::TooFewFields {
            expected: 2,
            got: fields.len(),
        });
    }

    let pin = fields[0];
    if pin.is_empty() {
        return Err(WireError::MissingField("PIN"));
    }
    let timestamp = NaiveDateTime::parse_from_str(fields[1], TIME_FORMAT)
        .map_err(|_| WireError::InvalidTimestamp(fields[1].to_string()))?;

    let code = |i: usize| fields.get(i).and_then(|v| v.parse::<i32>().ok());
    let work_code = fields
        .get(4)
        .filter(|v| !v.is_empty())
        .map(|v| (*v).to_string());

    Ok(Some(ScanEvent {
        pin: pin.to_string(),
        timestamp,
        event_code: code(2),
        verify_code: code(3),
        work_code,
    }))
}

/// Split an attendance upload body into scans. Never fails as a whole;
/// unreadable lines are collected in [`UploadBatch::malformed`].
pub fn parse_attendance(body: &str) -> UploadBatch {
    let mut batch = UploadBatch::default();
    for (idx, line) in body.split('\n').enumerate() {
        if line.trim_start().starts_with(OPLOG_MARKER) {
            batch.operation_logs += 1;
            continue;
        }
        match parse_attendance_line(line) {
            Ok(Some(event)) => batch.events.push(event),
            Ok(None) => {}
            Err(error) => batch.malformed.push(MalformedLine {
                line_no: idx + 1,
                error,
            }),
        }
    }
    batch
}

/// A user that already lives on the terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceUser {
    pub pin: i64,
    pub name: String,
    pub card: Option<String>,
}

/// Extract `USER PIN=..` records from a user-table upload; other lines and
/// records without a numeric PIN are skipped.
pub fn parse_user_records(body: &str) -> Vec<DeviceUser> {
    body.lines()
        .filter_map(|line| line.trim_start().strip_prefix(USER_MARKER))
        .filter_map(|record| {
            let mut pin = None;
            let mut name = String::new();
            let mut card = None;
            for (key, value) in tab_fields(record) {
                match key.to_ascii_lowercase().as_str() {
                    "pin" => pin = value.trim().parse::<i64>().ok(),
                    "name" => value.clone_into(&mut name),
                    "card" if !value.trim().is_empty() => card = Some(value.trim().to_string()),
                    _ => {}
                }
            }
            pin.map(|pin| DeviceUser { pin, name, card })
        })
        .collect()
}
