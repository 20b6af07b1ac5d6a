//! Command strings handed to terminals on `/getrequest`.
//!
//! Every rendered command carries its own queue id as `C:<id>:` so the
//! terminal's confirmation can be matched to exactly one queued row. Record
//! fields are tab-separated; terminals reject space-separated fields.

use std::fmt::Write;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{TIME_FORMAT, WireError, tab_fields};

/// Longest display name a terminal stores.
pub const NAME_MAX_LEN: usize = 24;

/// Kind of a queued command, as persisted in `device_commands.command_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    Enroll,
    Remove,
    Restart,
    ClearLogs,
    SetTime,
    GetTime,
    BatchEnroll,
}

impl CommandType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Enroll => "enroll",
            Self::Remove => "remove",
            Self::Restart => "restart",
            Self::ClearLogs => "clear_logs",
            Self::SetTime => "set_time",
            Self::GetTime => "get_time",
            Self::BatchEnroll => "batch_enroll",
        }
    }

    /// Commands that push user records onto the terminal.
    pub const fn is_enrollment(&self) -> bool {
        matches!(self, Self::Enroll | Self::BatchEnroll)
    }
}

impl std::fmt::Display for CommandType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CommandType {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enroll" => Ok(Self::Enroll),
            "remove" => Ok(Self::Remove),
            "restart" => Ok(Self::Restart),
            "clear_logs" => Ok(Self::ClearLogs),
            "set_time" => Ok(Self::SetTime),
            "get_time" => Ok(Self::GetTime),
            "batch_enroll" => Ok(Self::BatchEnroll),
            other => Err(WireError::InvalidField {
                field: "command_type",
                value: other.to_string(),
            }),
        }
    }
}

/// One user entry of the terminal's onboard table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub pin: i64,
    pub name: String,
    pub card: String,
}

impl UserRecord {
    /// Build a record with name and card reduced to what a terminal accepts.
    pub fn new(pin: i64, name: &str, card: &str) -> Self {
        Self {
            pin,
            name: sanitize_name(name),
            card: sanitize_card(card),
        }
    }

    fn write_fields(&self, out: &mut String) {
        let _ = write!(
            out,
            "Pin={}\tName={}\tCard={}\tPrivilege=0",
            self.pin, self.name, self.card
        );
    }
}

/// Content of a command, before the id is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandPayload {
    Enroll(UserRecord),
    Remove { pin: i64 },
    Restart,
    ClearLogs,
    SetTime(NaiveDateTime),
    GetTime,
    /// Several user records under one prefix. Build it through
    /// [`CommandPayload::enroll_all`]: a single record is indistinguishable
    /// from [`CommandPayload::Enroll`] on the wire.
    BatchEnroll(Vec<UserRecord>),
}

impl CommandPayload {
    /// Enrollment payload for `users`, plain [`Self::Enroll`] for a single
    /// record so that the payload survives [`decode`] unchanged.
    pub fn enroll_all(mut users: Vec<UserRecord>) -> Self {
        if users.len() == 1 {
            Self::Enroll(users.remove(0))
        } else {
            Self::BatchEnroll(users)
        }
    }

    pub const fn command_type(&self) -> CommandType {
        match self {
            Self::Enroll(_) => CommandType::Enroll,
            Self::Remove { .. } => CommandType::Remove,
            Self::Restart => CommandType::Restart,
            Self::ClearLogs => CommandType::ClearLogs,
            Self::SetTime(_) => CommandType::SetTime,
            Self::GetTime => CommandType::GetTime,
            Self::BatchEnroll(_) => CommandType::BatchEnroll,
        }
    }
}

/// Keep ASCII alphanumerics and spaces, collapse runs of spaces, cap at
/// [`NAME_MAX_LEN`].
pub fn sanitize_name(raw: &str) -> String {
    let mut out = String::with_capacity(NAME_MAX_LEN);
    for ch in raw.chars() {
        if out.len() == NAME_MAX_LEN {
            break;
        }
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
        } else if (ch == ' ' || ch.is_whitespace()) && !out.is_empty() && !out.ends_with(' ') {
            out.push(' ');
        }
    }
    out.truncate(out.trim_end().len());
    out
}

/// Drop characters that would break the record framing.
pub fn sanitize_card(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_graphic() && *c != '=')
        .collect()
}

/// Render the wire string for a command with the given queue id.
pub fn encode(id: i64, payload: &CommandPayload) -> String {
    let mut out = format!("C:{id}:");
    match payload {
        CommandPayload::Enroll(user) => {
            out.push_str("DATA UPDATE user ");
            user.write_fields(&mut out);
        }
        CommandPayload::BatchEnroll(users) => {
            out.push_str("DATA UPDATE user ");
            for (i, user) in users.iter().enumerate() {
                if i > 0 {
                    out.push('\n');
                }
                user.write_fields(&mut out);
            }
        }
        CommandPayload::Remove { pin } => {
            let _ = write!(out, "DATA DELETE user Pin={pin}");
        }
        CommandPayload::SetTime(at) => {
            let _ = write!(out, "TIME {}", at.format(TIME_FORMAT));
        }
        CommandPayload::Restart => out.push_str("REBOOT"),
        CommandPayload::ClearLogs => out.push_str("CLEAR LOG"),
        CommandPayload::GetTime => out.push_str("INFO"),
    }
    out
}

/// A command string taken apart again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCommand {
    pub id: i64,
    pub payload: CommandPayload,
}

/// Extract only the correlation id of a command string.
pub fn command_id(raw: &str) -> Result<i64, WireError> {
    let rest = raw.strip_prefix("C:").ok_or(WireError::MissingPrefix)?;
    let (id, _) = rest.split_once(':').ok_or(WireError::MissingPrefix)?;
    id.parse()
        .map_err(|_| WireError::InvalidId(id.to_string()))
}

/// Parse a command string produced by [`encode`].
///
/// A `DATA UPDATE user` body with a single record decodes as
/// [`CommandPayload::Enroll`], several records as
/// [`CommandPayload::BatchEnroll`].
pub fn decode(raw: &str) -> Result<DecodedCommand, WireError> {
    let id = command_id(raw)?;
    let body = raw
        .strip_prefix("C:")
        .and_then(|rest| rest.split_once(':'))
        .map(|(_, body)| body)
        .ok_or(WireError::MissingPrefix)?;

    let payload = if let Some(records) = body.strip_prefix("DATA UPDATE user ") {
        let mut users = records
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(decode_user)
            .collect::<Result<Vec<_>, _>>()?;
        match users.len() {
            0 => return Err(WireError::MissingField("Pin")),
            1 => CommandPayload::Enroll(users.remove(0)),
            _ => CommandPayload::BatchEnroll(users),
        }
    } else if let Some(fields) = body.strip_prefix("DATA DELETE user ") {
        CommandPayload::Remove {
            pin: pin_field(fields)?,
        }
    } else if let Some(at) = body.strip_prefix("TIME ") {
        let at = NaiveDateTime::parse_from_str(at.trim(), TIME_FORMAT)
            .map_err(|_| WireError::InvalidTimestamp(at.to_string()))?;
        CommandPayload::SetTime(at)
    } else {
        match body.trim() {
            "REBOOT" => CommandPayload::Restart,
            "CLEAR LOG" => CommandPayload::ClearLogs,
            "INFO" => CommandPayload::GetTime,
            _ => return Err(WireError::UnknownCommand(body.to_string())),
        }
    };

    Ok(DecodedCommand { id, payload })
}

fn pin_field(record: &str) -> Result<i64, WireError> {
    let value = tab_fields(record)
        .find(|(k, _)| k.eq_ignore_ascii_case("pin"))
        .map(|(_, v)| v)
        .ok_or(WireError::MissingField("Pin"))?;
    value.trim().parse().map_err(|_| WireError::InvalidField {
        field: "Pin",
        value: value.to_string(),
    })
}

fn decode_user(record: &str) -> Result<UserRecord, WireError> {
    let pin = pin_field(record)?;
    let mut name = String::new();
    let mut card = String::new();
    for (key, value) in tab_fields(record) {
        if key.eq_ignore_ascii_case("name") {
            value.clone_into(&mut name);
        } else if key.eq_ignore_ascii_case("card") {
            value.clone_into(&mut card);
        }
    }
    Ok(UserRecord { pin, name, card })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    #[test]
    fn enroll_renders_tab_separated_fields() {
        let cmd = encode(
            42,
            &CommandPayload::Enroll(UserRecord::new(7, "Jane Roe", "AB12")),
        );
        assert_eq!(
            cmd,
            "C:42:DATA UPDATE user Pin=7\tName=Jane Roe\tCard=AB12\tPrivilege=0"
        );
        assert!(!cmd.contains("Pin=7 Name"));
    }

    #[test]
    fn single_record_batch_is_a_plain_enroll() {
        let payload = CommandPayload::enroll_all(vec![UserRecord::new(3, "Ann", "C3")]);
        assert_eq!(payload.command_type(), CommandType::Enroll);
        assert_eq!(decode(&encode(9, &payload)).unwrap().payload, payload);

        let pair = CommandPayload::enroll_all(vec![
            UserRecord::new(3, "Ann", "C3"),
            UserRecord::new(4, "Bob", "C4"),
        ]);
        assert_eq!(pair.command_type(), CommandType::BatchEnroll);
        assert_eq!(decode(&encode(10, &pair)).unwrap().payload, pair);
    }

    #[test]
    fn decodes_reference_enroll_string() {
        let decoded =
            decode("C:42:DATA UPDATE user Pin=7\tName=Jane Roe\tCard=AB12\tPrivilege=0").unwrap();
        assert_eq!(decoded.id, 42);
        let CommandPayload::Enroll(user) = decoded.payload else {
            panic!("expected enroll, got {:?}", decoded.payload);
        };
        assert_eq!(user.pin, 7);
        assert_eq!(user.name, "Jane Roe");
        assert_eq!(user.card, "AB12");
    }

    #[test]
    fn remove_and_control_commands() {
        assert_eq!(
            encode(3, &CommandPayload::Remove { pin: 12 }),
            "C:3:DATA DELETE user Pin=12"
        );
        assert_eq!(encode(4, &CommandPayload::Restart), "C:4:REBOOT");
        assert_eq!(encode(5, &CommandPayload::ClearLogs), "C:5:CLEAR LOG");
        assert_eq!(encode(6, &CommandPayload::GetTime), "C:6:INFO");

        let at = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(7, 5, 9)
            .unwrap();
        let cmd = encode(8, &CommandPayload::SetTime(at));
        assert_eq!(cmd, "C:8:TIME 2024-03-01 07:05:09");
        assert_eq!(decode(&cmd).unwrap().payload, CommandPayload::SetTime(at));
        assert_eq!(
            decode("C:3:DATA DELETE user Pin=12").unwrap().payload,
            CommandPayload::Remove { pin: 12 }
        );
    }

    #[test]
    fn batch_puts_each_user_on_its_own_line() {
        let users = vec![
            UserRecord::new(1, "Ann", "C1"),
            UserRecord::new(2, "Bob", "C2"),
            UserRecord::new(3, "Cy", ""),
        ];
        let cmd = encode(9, &CommandPayload::BatchEnroll(users.clone()));
        assert!(cmd.starts_with("C:9:DATA UPDATE user Pin=1\t"));
        assert_eq!(cmd.lines().count(), 3);
        assert_eq!(cmd.lines().nth(1).unwrap(), "Pin=2\tName=Bob\tCard=C2\tPrivilege=0");

        let decoded = decode(&cmd).unwrap();
        assert_eq!(decoded.payload, CommandPayload::BatchEnroll(users));
    }

    #[test]
    fn names_are_cut_to_terminal_limits() {
        assert_eq!(sanitize_name("  Zoë O'Brien-Smith "), "Zo OBrienSmith");
        assert_eq!(
            sanitize_name("Maximilian Alexander Bartholomew"),
            "Maximilian Alexander Bar"
        );
        assert_eq!(sanitize_name("a\tb"), "a b");
        assert_eq!(sanitize_card("AB 12\t="), "AB12");
    }

    #[test]
    fn rejects_malformed_strings() {
        assert_eq!(decode("DATA DELETE user Pin=1"), Err(WireError::MissingPrefix));
        assert_eq!(
            decode("C:abc:REBOOT"),
            Err(WireError::InvalidId("abc".into()))
        );
        assert!(matches!(
            decode("C:1:SHUTDOWN"),
            Err(WireError::UnknownCommand(_))
        ));
        assert_eq!(
            decode("C:1:DATA DELETE user Name=x"),
            Err(WireError::MissingField("Pin"))
        );
        assert_eq!(decode(""), Err(WireError::MissingPrefix));
    }

    #[test]
    fn command_type_strings_round_trip() {
        for ty in [
            CommandType::Enroll,
            CommandType::Remove,
            CommandType::Restart,
            CommandType::ClearLogs,
            CommandType::SetTime,
            CommandType::GetTime,
            CommandType::BatchEnroll,
        ] {
            assert_eq!(ty.as_str().parse::<CommandType>().unwrap(), ty);
        }
    }

    proptest! {
        #[test]
        fn sanitized_names_fit_the_terminal(raw in "\\PC{0,60}") {
            let name = sanitize_name(&raw);
            prop_assert!(name.len() <= NAME_MAX_LEN);
            prop_assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == ' '));
            prop_assert!(!name.starts_with(' ') && !name.ends_with(' '));
        }

        #[test]
        fn any_enroll_decodes_to_its_sanitized_record(
            id in 1i64..1_000_000,
            pin in 1i64..65_535,
            name in "\\PC{0,40}",
            card in "[A-Za-z0-9 =\\t-]{0,16}",
        ) {
            let user = UserRecord::new(pin, &name, &card);
            let decoded = decode(&encode(id, &CommandPayload::Enroll(user.clone()))).unwrap();
            prop_assert_eq!(decoded.id, id);
            prop_assert_eq!(decoded.payload, CommandPayload::Enroll(user));
        }
    }
}
