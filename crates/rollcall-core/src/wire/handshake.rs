//! Handshake block returned for `/cdata?options=all`.

use std::fmt::Write;

use crate::config::ProtocolConfig;

/// Upload categories the terminal is asked to push.
const TRANS_FLAG: &str = "TransData AttLog OpLog EnrollUser ChgUser";

/// Render the option block a terminal reads before normal operation.
///
/// Stamps are reported as `None` so a freshly registered terminal uploads
/// its whole buffer once; duplicates are absorbed by ingestion.
pub fn render_handshake(serial: &str, cfg: &ProtocolConfig) -> String {
    let mut out = String::with_capacity(256);
    let _ = writeln!(out, "GET OPTION FROM: {serial}");
    out.push_str("ATTLOGStamp=None\n");
    out.push_str("OPERLOGStamp=None\n");
    out.push_str("ATTPHOTOStamp=None\n");
    let _ = writeln!(out, "ErrorDelay={}", cfg.error_delay_secs);
    let _ = writeln!(out, "Delay={}", cfg.delay_secs);
    let _ = writeln!(out, "TransTimes={}", cfg.trans_times);
    let _ = writeln!(out, "TransInterval={}", cfg.trans_interval_mins);
    let _ = writeln!(out, "TransFlag={TRANS_FLAG}");
    let _ = writeln!(out, "TimeZone={}", cfg.timezone);
    let _ = writeln!(out, "Realtime={}", u8::from(cfg.realtime));
    out.push_str("Encrypt=None\n");
    let _ = write!(out, "ServerVer={}", cfg.server_version);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_starts_with_serial_and_carries_intervals() {
        let cfg = ProtocolConfig {
            delay_secs: 10,
            timezone: 3,
            realtime: false,
            server_version: "rollcall/test".into(),
            ..ProtocolConfig::default()
        };
        let block = render_handshake("CQZ7224460246", &cfg);
        let lines: Vec<&str> = block.lines().collect();
        assert_eq!(lines[0], "GET OPTION FROM: CQZ7224460246");
        assert!(lines.contains(&"Delay=10"));
        assert!(lines.contains(&"TimeZone=3"));
        assert!(lines.contains(&"Realtime=0"));
        assert!(lines.contains(&"TransTimes=00:00;14:05"));
        assert_eq!(*lines.last().unwrap_or(&""), "ServerVer=rollcall/test");
    }
}
