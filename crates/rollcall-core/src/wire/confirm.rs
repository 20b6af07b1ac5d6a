//! Command confirmations posted to `/devicecmd`.
//!
//! Body: `ID=<n>&Return=<code>[&CMD=<name>]`, one confirmation per line.
//! Firmware versions disagree on key casing, so keys are matched without case.

use super::WireError;

/// Result code terminals use for success.
pub const RETURN_OK: i64 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub command_id: i64,
    pub return_code: i64,
    pub command_name: Option<String>,
}

impl Confirmation {
    pub const fn succeeded(&self) -> bool {
        self.return_code == RETURN_OK
    }
}

/// Parse a single `ID=..&Return=..` line.
pub fn parse_confirmation(line: &str) -> Result<Confirmation, WireError> {
    let mut id = None;
    let mut code = None;
    let mut name = None;

    for pair in line.trim().split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "id" => id = Some(value),
            "return" => code = Some(value),
            "cmd" if !value.is_empty() => name = Some(value.to_string()),
            _ => {}
        }
    }

    let id = id.ok_or(WireError::MissingField("ID"))?;
    let command_id = id
        .parse()
        .map_err(|_| WireError::InvalidId(id.to_string()))?;
    let code = code.ok_or(WireError::MissingField("Return"))?;
    let return_code = code.parse().map_err(|_| WireError::InvalidField {
        field: "Return",
        value: code.to_string(),
    })?;

    Ok(Confirmation {
        command_id,
        return_code,
        command_name: name,
    })
}

/// Parse every non-blank line of a confirmation body, keeping failures apart.
pub fn parse_confirmations(body: &str) -> (Vec<Confirmation>, Vec<WireError>) {
    let mut ok = Vec::new();
    let mut errors = Vec::new();
    for line in body.lines().filter(|l| !l.trim().is_empty()) {
        match parse_confirmation(line) {
            Ok(c) => ok.push(c),
            Err(e) => errors.push(e),
        }
    }
    (ok, errors)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_body() {
        let c = parse_confirmation("ID=42&Return=0&CMD=DATA").unwrap();
        assert_eq!(c.command_id, 42);
        assert!(c.succeeded());
        assert_eq!(c.command_name.as_deref(), Some("DATA"));
    }

    #[test]
    fn keys_are_case_insensitive_and_cmd_optional() {
        let c = parse_confirmation("id=7&RETURN=-1002").unwrap();
        assert_eq!(c.command_id, 7);
        assert_eq!(c.return_code, -1002);
        assert!(!c.succeeded());
        assert_eq!(c.command_name, None);
    }

    #[test]
    fn missing_pieces_are_errors() {
        assert_eq!(
            parse_confirmation("Return=0"),
            Err(WireError::MissingField("ID"))
        );
        assert_eq!(
            parse_confirmation("ID=3"),
            Err(WireError::MissingField("Return"))
        );
        assert_eq!(
            parse_confirmation("ID=x&Return=0"),
            Err(WireError::InvalidId("x".into()))
        );
    }

    #[test]
    fn multi_line_body_keeps_good_lines() {
        let (ok, errors) = parse_confirmations("ID=1&Return=0\r\ngarbage\nID=2&Return=-1\n");
        assert_eq!(ok.len(), 2);
        assert_eq!(ok[1].command_id, 2);
        assert_eq!(errors.len(), 1);
    }
}
